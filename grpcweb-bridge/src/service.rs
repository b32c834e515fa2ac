//! The gRPC-Web entry point as a [`tower::Service`].
//!
//! [`GrpcWebService`] answers requests whose path resolves in its
//! [`HandlerRegistry`] and hands everything else to a fallback service,
//! typically an [`axum::Router`]:
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use grpcweb_bridge::{GrpcWebService, HandlerRegistry};
//!
//! let app: Router = Router::new().route("/health", get(|| async { "ok" }));
//! let service = GrpcWebService::new(HandlerRegistry::new())
//!     .decode_chunked(false)
//!     .with_fallback(app);
//! ```
//!
//! Per request, stateless across requests:
//!
//! | path       | method    | result                                   |
//! |------------|-----------|------------------------------------------|
//! | registered | `POST`    | call dispatched                          |
//! | registered | `OPTIONS` | `204` CORS preflight                     |
//! | registered | other     | `400 Bad Request`                        |
//! | unknown    | any       | fallback service (`404` by default)      |
//!
//! Request bodies that cannot be read or framed fail the service call with a
//! [`BridgeError`] instead of producing a gRPC status.

use std::convert::Infallible;
use std::future::{Ready, ready};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use futures::future::BoxFuture;
use grpcweb_bridge_core::{
    GRPC_TIMEOUT_HEADER, metadata_from_headers, parse_timeout, unwrap_message,
};
use http::{HeaderMap, Method, Request, StatusCode};
use tower::{Service, ServiceExt};

use crate::capability::{Capability, Unsupported};
use crate::config::{BridgeConfig, MessageLimits, compute_effective_timeout};
use crate::context::CallContext;
use crate::error::{BoxError, BridgeError};
use crate::registry::{HandlerRegistry, MethodDescriptor, MethodHandler, MethodProvider};
use crate::request::{BodyFraming, body_reader, read_request_body};
use crate::response;

/// Fallback that answers `404 Not Found` with an empty body.
#[derive(Clone, Copy, Debug, Default)]
pub struct NotFound;

impl<B> Service<Request<B>> for NotFound {
    type Response = Response;
    type Error = Infallible;
    type Future = Ready<Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: Request<B>) -> Self::Future {
        ready(Ok(response::empty(StatusCode::NOT_FOUND)))
    }
}

/// Serves registered gRPC methods to gRPC-Web clients.
#[derive(Clone, Debug)]
pub struct GrpcWebService<F = NotFound> {
    registry: Arc<HandlerRegistry>,
    config: Arc<BridgeConfig>,
    fallback: F,
}

impl GrpcWebService<NotFound> {
    /// Serve `registry` with the default [`BridgeConfig`].
    ///
    /// The default reassembles chunked bodies itself. hyper and axum have
    /// already removed chunk framing by the time the body is read, while
    /// keeping the `Transfer-Encoding: chunked` header, so behind them call
    /// [`decode_chunked(false)`](Self::decode_chunked). Otherwise every
    /// chunked request fails with [`ReadError::InvalidChunkSize`].
    ///
    /// [`ReadError::InvalidChunkSize`]: crate::ReadError::InvalidChunkSize
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            config: Arc::new(BridgeConfig::default()),
            fallback: NotFound,
        }
    }
}

impl<F> GrpcWebService<F> {
    /// Service receiving requests for paths no provider resolves.
    pub fn with_fallback<G>(self, fallback: G) -> GrpcWebService<G> {
        GrpcWebService {
            registry: self.registry,
            config: self.config,
            fallback,
        }
    }

    /// Append providers to the registry.
    pub fn add_generic_rpc_handlers<I, P>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: MethodProvider,
    {
        Arc::make_mut(&mut self.registry).add_generic_rpc_handlers(providers);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// See [`BridgeConfig::decode_chunked`].
    pub fn decode_chunked(mut self, decode: bool) -> Self {
        Arc::make_mut(&mut self.config).decode_chunked = decode;
        self
    }

    /// See [`BridgeConfig::fallback_read_size`].
    pub fn fallback_read_size(mut self, size: usize) -> Self {
        Arc::make_mut(&mut self.config).fallback_read_size = size;
        self
    }

    pub fn message_limits(mut self, limits: MessageLimits) -> Self {
        Arc::make_mut(&mut self.config).limits = limits;
        self
    }

    /// Deadline applied to every call, tightened by the client's `grpc-timeout`.
    pub fn server_timeout(mut self, timeout: Duration) -> Self {
        Arc::make_mut(&mut self.config).server_timeout = Some(timeout);
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn get_config(&self) -> &BridgeConfig {
        &self.config
    }

    // The HTTP server owns sockets and process lifecycle.

    pub fn add_insecure_port(&self, _address: &str) -> Result<u16, Unsupported> {
        Unsupported::err(Capability::BindPort)
    }

    pub fn add_secure_port(&self, _address: &str) -> Result<u16, Unsupported> {
        Unsupported::err(Capability::BindPort)
    }

    pub fn start(&self) -> Result<(), Unsupported> {
        Unsupported::err(Capability::Lifecycle)
    }

    pub fn stop(&self, _grace: Option<Duration>) -> Result<(), Unsupported> {
        Unsupported::err(Capability::Lifecycle)
    }
}

impl<F, B> Service<Request<B>> for GrpcWebService<F>
where
    F: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    F::Error: Into<BoxError>,
    F::Future: Send + 'static,
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Response, BoxError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.fallback.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let Some(method) = self.registry.resolve(req.uri().path()) else {
            tracing::debug!(path = %req.uri().path(), "no method registered, using fallback");
            let fallback = self.fallback.clone();
            let fallback = std::mem::replace(&mut self.fallback, fallback);
            let req = req.map(Body::new);
            return Box::pin(async move {
                fallback.oneshot(req).await.map_err(Into::<BoxError>::into)
            });
        };

        match *req.method() {
            Method::POST => {
                let config = Arc::clone(&self.config);
                Box::pin(async move {
                    dispatch(method, req, &config)
                        .await
                        .map_err(BoxError::from)
                })
            }
            Method::OPTIONS => {
                tracing::debug!(path = %method.path(), "cors preflight");
                Box::pin(async { Ok(response::cors_preflight()) })
            }
            _ => Box::pin(async { Ok(response::empty(StatusCode::BAD_REQUEST)) }),
        }
    }
}

/// Run one call: read, unwrap, deserialize, invoke, respond.
async fn dispatch<B>(
    method: MethodDescriptor,
    req: Request<B>,
    config: &BridgeConfig,
) -> Result<Response, BridgeError>
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    if method.request_streaming() {
        tracing::debug!(path = %method.path(), kind = ?method.kind(), "request streaming rejected");
        return Ok(response::unimplemented(
            "request streaming is not supported over gRPC-Web",
        ));
    }

    let (parts, body) = req.into_parts();
    let ctx = create_context(&parts.headers, config);

    let framing = BodyFraming::from_headers(&parts.headers, config.decode_chunked);
    let mut reader = body_reader(body);
    let data = read_request_body(&mut reader, framing, config).await?;
    let frame = unwrap_message(&data)?;

    let response = match method.handler() {
        MethodHandler::Unary(call) => {
            let call = call(frame.payload, ctx.clone()).map_err(BridgeError::Deserialize)?;
            response::unary(ctx, call).await
        }
        MethodHandler::ServerStreaming(call) => {
            let stream = call(frame.payload, ctx.clone()).map_err(BridgeError::Deserialize)?;
            response::server_streaming(ctx, stream).await
        }
        MethodHandler::None => response::unimplemented("method has no implementation"),
    };
    Ok(response)
}

/// Build the call context from request headers.
///
/// A malformed `grpc-timeout` means no client deadline.
fn create_context(headers: &HeaderMap, config: &BridgeConfig) -> CallContext {
    let client_timeout = headers.get(GRPC_TIMEOUT_HEADER).and_then(|value| {
        let parsed = value
            .to_str()
            .map_err(|e| e.to_string())
            .and_then(|text| parse_timeout(text).map_err(|e| e.to_string()));
        match parsed {
            Ok(timeout) => Some(timeout),
            Err(error) => {
                tracing::warn!(value = ?value, %error, "malformed grpc-timeout header, ignoring");
                None
            }
        }
    });

    let (metadata, rejected) = metadata_from_headers(headers);
    for err in rejected {
        tracing::debug!(error = %err, "request header dropped from metadata");
    }

    let timeout = compute_effective_timeout(config.server_timeout, client_timeout);
    CallContext::new(timeout, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::get;
    use futures::StreamExt;
    use grpcweb_bridge_core::{
        Code, Frame, MetadataValue, unpack_trailers, unwrap_messages, wrap_message,
    };
    use http::header::{CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
    use http_body_util::{BodyExt, Full};

    use crate::context::CallError;
    use crate::registry::ServiceDescriptor;
    use crate::response::GRPC_WEB_CONTENT_TYPE;

    fn decode(bytes: Bytes) -> Result<String, BoxError> {
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    fn encode(reply: &String) -> Result<Bytes, BoxError> {
        Ok(Bytes::from(reply.clone()))
    }

    fn text(value: Option<&MetadataValue>) -> String {
        value.and_then(|v| v.as_str()).unwrap_or_default().to_string()
    }

    fn echo_service() -> ServiceDescriptor {
        ServiceDescriptor::new("test.Echo")
            .method(MethodDescriptor::unary(
                "/test.Echo/Say",
                decode,
                encode,
                |req: String, _ctx: CallContext| async move {
                    Ok::<_, CallError>(format!("echo: {req}"))
                },
            ))
            .method(MethodDescriptor::unary(
                "/test.Echo/Whoami",
                decode,
                encode,
                |_req: String, ctx: CallContext| async move {
                    let md = ctx.invocation_metadata();
                    let token = md.get("token-bin").map(|v| v.as_bytes().len()).unwrap_or(0);
                    Ok::<_, CallError>(format!("{} {}", text(md.get("x-user")), token))
                },
            ))
            .method(MethodDescriptor::unary(
                "/test.Echo/Deadline",
                decode,
                encode,
                |_req: String, ctx: CallContext| async move {
                    Ok::<_, CallError>(match ctx.time_remaining() {
                        Some(left) => format!("{}", left.as_secs().min(60)),
                        None => "none".to_string(),
                    })
                },
            ))
            .method(MethodDescriptor::unary(
                "/test.Echo/Fail",
                decode,
                encode,
                |req: String, ctx: CallContext| async move {
                    Err::<String, _>(ctx.abort(Code::InvalidArgument, format!("bad input: {req}")))
                },
            ))
            .method(MethodDescriptor::server_streaming(
                "/test.Echo/Repeat",
                decode,
                encode,
                |req: String, _ctx: CallContext| {
                    futures::stream::iter(
                        (1..=3).map(move |i| Ok::<_, CallError>(format!("{req} {i}"))),
                    )
                },
            ))
            .method(MethodDescriptor::server_streaming(
                "/test.Echo/Slow",
                decode,
                encode,
                |req: String, _ctx: CallContext| {
                    async_stream::stream! {
                        yield Ok::<_, CallError>(req.clone());
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        yield Ok(req);
                    }
                },
            ))
            .method(MethodDescriptor::client_streaming("/test.Echo/Upload"))
            .method(MethodDescriptor::bidi_streaming("/test.Echo/Chat"))
    }

    fn service() -> GrpcWebService {
        let mut registry = HandlerRegistry::new();
        registry.add_provider(echo_service());
        GrpcWebService::new(registry)
    }

    fn grpc_request(path: &str, payload: &[u8]) -> http::request::Builder {
        let body_len = payload.len() + 5;
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(CONTENT_TYPE, GRPC_WEB_CONTENT_TYPE)
            .header(CONTENT_LENGTH, body_len)
    }

    fn framed(payload: &[u8]) -> Full<Bytes> {
        Full::new(wrap_message(false, false, payload))
    }

    async fn call(service: GrpcWebService, req: Request<Full<Bytes>>) -> Response {
        service.oneshot(req).await.unwrap()
    }

    async fn body_frames(response: Response) -> Vec<Frame> {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        unwrap_messages(&body).unwrap()
    }

    #[tokio::test]
    async fn test_unary_call() {
        let req = grpc_request("/test.Echo/Say", b"hi").body(framed(b"hi")).unwrap();
        let response = call(service(), req).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["grpc-status"], "0");
        assert_eq!(response.headers()[CONTENT_TYPE], GRPC_WEB_CONTENT_TYPE);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");

        let frames = body_frames(response).await;
        assert_eq!(frames, vec![Frame::message(Bytes::from_static(b"echo: hi"))]);
    }

    #[tokio::test]
    async fn test_unary_abort() {
        let req = grpc_request("/test.Echo/Fail", b"x").body(framed(b"x")).unwrap();
        let response = call(service(), req).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["grpc-status"], "3");
        assert_eq!(response.headers()["grpc-message"], "bad%20input%3A%20x");
        assert!(body_frames(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_chunked_request() {
        let framed = wrap_message(false, false, b"hello");
        let mut chunked = format!("{:x}\r\n", framed.len()).into_bytes();
        chunked.extend_from_slice(&framed);
        chunked.extend_from_slice(b"\r\n0\r\n\r\n");

        let req = Request::builder()
            .method(Method::POST)
            .uri("/test.Echo/Say")
            .header(TRANSFER_ENCODING, "chunked")
            .body(Full::new(Bytes::from(chunked)))
            .unwrap();
        let response = call(service(), req).await;
        assert_eq!(
            body_frames(response).await[0].payload,
            Bytes::from_static(b"echo: hello")
        );
    }

    #[tokio::test]
    async fn test_dechunked_by_host() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/test.Echo/Say")
            .header(TRANSFER_ENCODING, "chunked")
            .body(framed(b"already decoded"))
            .unwrap();
        let response = call(service().decode_chunked(false), req).await;
        assert_eq!(
            body_frames(response).await[0].payload,
            Bytes::from_static(b"echo: already decoded")
        );
    }

    #[tokio::test]
    async fn test_server_streaming_call() {
        let req = grpc_request("/test.Echo/Repeat", b"go").body(framed(b"go")).unwrap();
        let response = call(service(), req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("grpc-status").is_none());

        let frames = body_frames(response).await;
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0].payload, Bytes::from_static(b"go 1"));
        assert_eq!(frames[2].payload, Bytes::from_static(b"go 3"));
        assert_eq!(
            unpack_trailers(&frames[3].payload).unwrap(),
            vec![("grpc-status".to_string(), "0".to_string())]
        );
    }

    #[tokio::test]
    async fn test_streaming_client_deadline() {
        let req = grpc_request("/test.Echo/Slow", b"s")
            .header("grpc-timeout", "50m")
            .body(framed(b"s"))
            .unwrap();
        let response = call(service(), req).await;

        let frames = body_frames(response).await;
        assert_eq!(frames.len(), 2);
        let trailers = unpack_trailers(&frames[1].payload).unwrap();
        assert_eq!(trailers[0], ("grpc-status".to_string(), "4".to_string()));
        assert_eq!(
            trailers[1],
            (
                "grpc-message".to_string(),
                "request%20timed%20out%20at%20the%20server".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_server_timeout_applies_without_header() {
        let req = grpc_request("/test.Echo/Slow", b"s").body(framed(b"s")).unwrap();
        let response = call(service().server_timeout(Duration::from_millis(50)), req).await;
        let frames = body_frames(response).await;
        assert_eq!(frames.len(), 2);
        assert_eq!(
            unpack_trailers(&frames[1].payload).unwrap()[0].1,
            "4"
        );
    }

    #[tokio::test]
    async fn test_timeout_header_reaches_context() {
        let req = grpc_request("/test.Echo/Deadline", b"")
            .header("grpc-timeout", "30S")
            .body(framed(b""))
            .unwrap();
        let frames = body_frames(call(service(), req).await).await;
        let remaining: u64 = std::str::from_utf8(&frames[0].payload).unwrap().parse().unwrap();
        assert!(remaining <= 30 && remaining >= 28);

        let req = grpc_request("/test.Echo/Deadline", b"")
            .header("grpc-timeout", "soon")
            .body(framed(b""))
            .unwrap();
        let frames = body_frames(call(service(), req).await).await;
        assert_eq!(frames[0].payload, Bytes::from_static(b"none"));
    }

    #[tokio::test]
    async fn test_metadata_from_headers() {
        let req = grpc_request("/test.Echo/Whoami", b"")
            .header("X-User", "alice")
            .header("token-bin", "AQIDBA")
            .body(framed(b""))
            .unwrap();
        let frames = body_frames(call(service(), req).await).await;
        assert_eq!(frames[0].payload, Bytes::from_static(b"alice 4"));
    }

    #[tokio::test]
    async fn test_invalid_binary_metadata_dropped() {
        let req = grpc_request("/test.Echo/Whoami", b"")
            .header("x-user", "bob")
            .header("token-bin", "***")
            .body(framed(b""))
            .unwrap();
        let frames = body_frames(call(service(), req).await).await;
        assert_eq!(frames[0].payload, Bytes::from_static(b"bob 0"));
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/test.Echo/Say")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = call(service(), req).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()["access-control-allow-methods"], "POST, OPTIONS");
        assert!(body_frames(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_other_method_is_bad_request() {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/test.Echo/Say")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = call(service(), req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_path_without_fallback() {
        let req = grpc_request("/test.Echo/Missing", b"").body(framed(b"")).unwrap();
        let response = call(service(), req).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get("grpc-status").is_none());
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_path_uses_fallback() {
        let app: Router = Router::new().route("/health", get(|| async { "ok" }));
        let service = service().with_fallback(app);

        let req = Request::builder()
            .uri("/health")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = service.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"ok"));

        // Registered paths never reach the fallback
        let req = grpc_request("/test.Echo/Say", b"x").body(framed(b"x")).unwrap();
        let response = service.oneshot(req).await.unwrap();
        assert_eq!(response.headers()["grpc-status"], "0");
    }

    #[tokio::test]
    async fn test_request_streaming_is_unimplemented() {
        for path in ["/test.Echo/Upload", "/test.Echo/Chat"] {
            let req = grpc_request(path, b"").body(framed(b"")).unwrap();
            let response = call(service(), req).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(response.headers()["grpc-status"], "12");
        }
    }

    #[tokio::test]
    async fn test_truncated_frame_is_transport_error() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/test.Echo/Say")
            .header(CONTENT_LENGTH, 3)
            .body(Full::new(Bytes::from_static(&[0, 0, 0])))
            .unwrap();
        let err = service().oneshot(req).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BridgeError>(),
            Some(BridgeError::Framing(_))
        ));
    }

    #[tokio::test]
    async fn test_short_body_is_transport_error() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/test.Echo/Say")
            .header(CONTENT_LENGTH, 50)
            .body(framed(b"short"))
            .unwrap();
        let err = service().oneshot(req).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BridgeError>(),
            Some(BridgeError::Read(_))
        ));
    }

    #[tokio::test]
    async fn test_deserialize_failure_is_transport_error() {
        let req = grpc_request("/test.Echo/Say", &[0xff, 0xfe])
            .body(framed(&[0xff, 0xfe]))
            .unwrap();
        let err = service().oneshot(req).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BridgeError>(),
            Some(BridgeError::Deserialize(_))
        ));
    }

    #[tokio::test]
    async fn test_fallback_read_size_without_length() {
        // Only the frame header is read, so the payload comes out empty
        let req = Request::builder()
            .method(Method::POST)
            .uri("/test.Echo/Say")
            .body(framed(b""))
            .unwrap();
        let frames = body_frames(call(service(), req).await).await;
        assert_eq!(frames[0].payload, Bytes::from_static(b"echo: "));
    }

    #[test]
    fn test_lifecycle_is_unsupported() {
        let service = service();
        assert_eq!(
            service.add_insecure_port("[::]:50051").unwrap_err().capability,
            Capability::BindPort
        );
        assert_eq!(
            service.add_secure_port("[::]:50051").unwrap_err().capability,
            Capability::BindPort
        );
        assert_eq!(service.start().unwrap_err().capability, Capability::Lifecycle);
        assert_eq!(
            service.stop(None).unwrap_err().capability,
            Capability::Lifecycle
        );
    }

    #[test]
    fn test_builder_setters() {
        let service = service()
            .fallback_read_size(16)
            .message_limits(MessageLimits::new(1024))
            .decode_chunked(false)
            .add_generic_rpc_handlers([|_: &str| None::<MethodDescriptor>]);
        let config = service.get_config();
        assert_eq!(config.fallback_read_size, 16);
        assert_eq!(config.limits.max_message_size(), Some(1024));
        assert!(!config.decode_chunked);
        assert_eq!(service.registry().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_independent() {
        let service = service();
        let calls = (0..8).map(|i| {
            let payload = format!("n{i}");
            let req = grpc_request("/test.Echo/Say", payload.as_bytes())
                .body(framed(payload.as_bytes()))
                .unwrap();
            service.clone().oneshot(req)
        });
        let results: Vec<_> = futures::stream::iter(calls)
            .buffer_unordered(8)
            .collect()
            .await;
        assert_eq!(results.len(), 8);
        for result in results {
            assert_eq!(result.unwrap().headers()["grpc-status"], "0");
        }
    }
}
