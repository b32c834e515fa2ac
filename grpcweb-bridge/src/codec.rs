//! Message codecs usable as a descriptor's serializer pair.

/// Protobuf messages through prost.
///
/// ```
/// use grpcweb_bridge::codec::prost;
/// use grpcweb_bridge::{CallContext, CallError};
///
/// #[derive(Clone, PartialEq, ::prost::Message)]
/// struct Ping {
///     #[prost(string, tag = "1")]
///     text: String,
/// }
///
/// let method = prost::unary("/ping.Pinger/Ping", |req: Ping, _ctx: CallContext| async move {
///     Ok::<_, CallError>(req)
/// });
/// assert_eq!(method.path(), "/ping.Pinger/Ping");
/// ```
pub mod prost {
    use std::future::Future;

    use ::prost::Message;
    use bytes::Bytes;
    use futures::Stream;

    use crate::context::{CallContext, CallError};
    use crate::error::BoxError;
    use crate::registry::MethodDescriptor;

    pub fn decode<M: Message + Default>(bytes: Bytes) -> Result<M, BoxError> {
        Ok(M::decode(bytes)?)
    }

    pub fn encode<M: Message>(message: &M) -> Result<Bytes, BoxError> {
        Ok(Bytes::from(message.encode_to_vec()))
    }

    /// Unary method with prost request and response messages.
    pub fn unary<Req, Res, H, Fut>(path: impl Into<String>, handler: H) -> MethodDescriptor
    where
        Req: Message + Default + Send + 'static,
        Res: Message + Send + 'static,
        H: Fn(Req, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Res, CallError>> + Send + 'static,
    {
        MethodDescriptor::unary(path, decode::<Req>, encode::<Res>, handler)
    }

    /// Server-streaming method with prost request and response messages.
    pub fn server_streaming<Req, Res, H, St>(
        path: impl Into<String>,
        handler: H,
    ) -> MethodDescriptor
    where
        Req: Message + Default + Send + 'static,
        Res: Message + Send + 'static,
        H: Fn(Req, CallContext) -> St + Send + Sync + 'static,
        St: Stream<Item = Result<Res, CallError>> + Send + 'static,
    {
        MethodDescriptor::server_streaming(path, decode::<Req>, encode::<Res>, handler)
    }

}
