//! Method descriptors and path-based handler lookup.
//!
//! A [`MethodDescriptor`] binds a request path to a deserializer, a serializer
//! and a handler. The message types are erased at construction, so the
//! service only ever moves [`Bytes`] in and out.
//!
//! Descriptors are grouped by [`MethodProvider`]s, and a [`HandlerRegistry`]
//! asks its providers in registration order; the first match wins.
//!
//! ```
//! use bytes::Bytes;
//! use grpcweb_bridge::{BoxError, CallContext, CallError, HandlerRegistry, MethodDescriptor};
//!
//! fn decode(bytes: Bytes) -> Result<String, BoxError> {
//!     Ok(String::from_utf8(bytes.to_vec())?)
//! }
//!
//! fn encode(reply: &String) -> Result<Bytes, BoxError> {
//!     Ok(Bytes::from(reply.clone()))
//! }
//!
//! let echo = MethodDescriptor::unary(
//!     "/echo.Echo/Say",
//!     decode,
//!     encode,
//!     |req: String, _ctx: CallContext| async move { Ok::<_, CallError>(req) },
//! );
//!
//! let mut registry = HandlerRegistry::new();
//! registry.add_provider(move |path: &str| (path == "/echo.Echo/Say").then(|| echo.clone()));
//!
//! assert!(registry.resolve("/echo.Echo/Say").is_some());
//! assert!(registry.resolve("/echo.Echo/Shout").is_none());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt};

use crate::context::{CallContext, CallError};
use crate::error::BoxError;

/// Deserialize, invoke and serialize one unary call.
///
/// The outer error is a deserialization failure.
pub(crate) type UnaryCall = Arc<
    dyn Fn(Bytes, CallContext) -> Result<BoxFuture<'static, Result<Bytes, CallError>>, BoxError>
        + Send
        + Sync,
>;

/// Deserialize and invoke one server-streaming call.
pub(crate) type StreamingCall = Arc<
    dyn Fn(Bytes, CallContext) -> Result<BoxStream<'static, Result<Bytes, CallError>>, BoxError>
        + Send
        + Sync,
>;

/// Streaming shape of a method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodKind {
    Unary,
    ServerStreaming,
    ClientStreaming,
    BidiStreaming,
}

impl MethodKind {
    pub fn request_streaming(self) -> bool {
        matches!(self, MethodKind::ClientStreaming | MethodKind::BidiStreaming)
    }

    pub fn response_streaming(self) -> bool {
        matches!(self, MethodKind::ServerStreaming | MethodKind::BidiStreaming)
    }
}

#[derive(Clone)]
pub(crate) enum MethodHandler {
    Unary(UnaryCall),
    ServerStreaming(StreamingCall),
    /// Request-streaming methods are declared but never invoked.
    None,
}

/// Registration record for one RPC method.
#[derive(Clone)]
pub struct MethodDescriptor {
    path: String,
    kind: MethodKind,
    handler: MethodHandler,
}

impl MethodDescriptor {
    /// Describe a unary method.
    pub fn unary<Req, Res, D, S, H, Fut>(
        path: impl Into<String>,
        deserialize: D,
        serialize: S,
        handler: H,
    ) -> Self
    where
        Req: Send + 'static,
        Res: Send + 'static,
        D: Fn(Bytes) -> Result<Req, BoxError> + Send + Sync + 'static,
        S: Fn(&Res) -> Result<Bytes, BoxError> + Send + Sync + 'static,
        H: Fn(Req, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Res, CallError>> + Send + 'static,
    {
        let serialize = Arc::new(serialize);
        let call: UnaryCall = Arc::new(
            move |bytes: Bytes,
                  ctx: CallContext|
                  -> Result<BoxFuture<'static, Result<Bytes, CallError>>, BoxError> {
                let request = deserialize(bytes)?;
                let response = handler(request, ctx);
                let serialize = Arc::clone(&serialize);
                Ok(async move {
                    let response = response.await?;
                    serialize(&response).map_err(CallError::Serialize)
                }
                .boxed())
            },
        );

        Self {
            path: path.into(),
            kind: MethodKind::Unary,
            handler: MethodHandler::Unary(call),
        }
    }

    /// Describe a server-streaming method.
    ///
    /// The handler returns a lazy stream; each item is pulled only when the
    /// response body asks for it.
    pub fn server_streaming<Req, Res, D, S, H, St>(
        path: impl Into<String>,
        deserialize: D,
        serialize: S,
        handler: H,
    ) -> Self
    where
        Req: Send + 'static,
        Res: Send + 'static,
        D: Fn(Bytes) -> Result<Req, BoxError> + Send + Sync + 'static,
        S: Fn(&Res) -> Result<Bytes, BoxError> + Send + Sync + 'static,
        H: Fn(Req, CallContext) -> St + Send + Sync + 'static,
        St: Stream<Item = Result<Res, CallError>> + Send + 'static,
    {
        let serialize = Arc::new(serialize);
        let call: StreamingCall = Arc::new(
            move |bytes: Bytes,
                  ctx: CallContext|
                  -> Result<BoxStream<'static, Result<Bytes, CallError>>, BoxError> {
                let request = deserialize(bytes)?;
                let serialize = Arc::clone(&serialize);
                Ok(handler(request, ctx)
                    .map(move |item| {
                        item.and_then(|res| serialize(&res).map_err(CallError::Serialize))
                    })
                    .boxed())
            },
        );

        Self {
            path: path.into(),
            kind: MethodKind::ServerStreaming,
            handler: MethodHandler::ServerStreaming(call),
        }
    }

    /// Declare a client-streaming method. Calls to it fail with `UNIMPLEMENTED`.
    pub fn client_streaming(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: MethodKind::ClientStreaming,
            handler: MethodHandler::None,
        }
    }

    /// Declare a bidirectional method. Calls to it fail with `UNIMPLEMENTED`.
    pub fn bidi_streaming(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: MethodKind::BidiStreaming,
            handler: MethodHandler::None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    pub fn request_streaming(&self) -> bool {
        self.kind.request_streaming()
    }

    pub fn response_streaming(&self) -> bool {
        self.kind.response_streaming()
    }

    pub(crate) fn handler(&self) -> &MethodHandler {
        &self.handler
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Resolves request paths to method descriptors.
///
/// Providers only see the path. Routing on headers is not possible.
pub trait MethodProvider: Send + Sync + 'static {
    fn resolve(&self, path: &str) -> Option<MethodDescriptor>;
}

impl<F> MethodProvider for F
where
    F: Fn(&str) -> Option<MethodDescriptor> + Send + Sync + 'static,
{
    fn resolve(&self, path: &str) -> Option<MethodDescriptor> {
        self(path)
    }
}

/// The methods of one named service, keyed by `/{service}/{method}`.
#[derive(Clone, Debug)]
pub struct ServiceDescriptor {
    name: String,
    methods: HashMap<String, MethodDescriptor>,
}

impl ServiceDescriptor {
    /// Create an empty service, e.g. `ServiceDescriptor::new("helloworld.Greeter")`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request path of `method` in this service.
    pub fn method_path(&self, method: &str) -> String {
        format!("/{}/{}", self.name, method)
    }

    /// Add a method. A later method with the same path replaces the earlier one.
    pub fn method(mut self, descriptor: MethodDescriptor) -> Self {
        if !descriptor
            .path()
            .strip_prefix('/')
            .and_then(|rest| rest.strip_prefix(self.name.as_str()))
            .is_some_and(|rest| rest.starts_with('/'))
        {
            tracing::warn!(
                service = %self.name,
                path = %descriptor.path(),
                "method path is outside its service"
            );
        }
        self.methods.insert(descriptor.path.clone(), descriptor);
        self
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.methods.values()
    }
}

impl MethodProvider for ServiceDescriptor {
    fn resolve(&self, path: &str) -> Option<MethodDescriptor> {
        self.methods.get(path).cloned()
    }
}

/// Ordered collection of providers. Populated before serving, read-only after.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    providers: Vec<Arc<dyn MethodProvider>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_provider<P: MethodProvider>(&mut self, provider: P) -> &mut Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Register several providers at once, keeping their order.
    pub fn add_generic_rpc_handlers<I, P>(&mut self, providers: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: MethodProvider,
    {
        for provider in providers {
            self.add_provider(provider);
        }
        self
    }

    /// First descriptor any provider returns for `path`.
    pub fn resolve(&self, path: &str) -> Option<MethodDescriptor> {
        self.providers
            .iter()
            .find_map(|provider| provider.resolve(path))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("providers", &self.providers.len())
            .finish()
    }
}
