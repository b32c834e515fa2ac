//! Response production for unary and server-streaming calls.
//!
//! Unary calls are fully buffered: the handler result, the status and the
//! trailing metadata are all known before headers go out, so status travels
//! in headers with an exact `content-length`.
//!
//! Streaming calls commit headers after the first value has been pulled. From
//! then on, failures can only be reported through the single trailer frame
//! that closes the body:
//!
//! ```text
//! [message]* [trailer: grpc-status, grpc-message?, trailing metadata*]
//! ```

use std::convert::Infallible;

use axum::body::Body;
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use grpcweb_bridge_core::{
    Code, GRPC_MESSAGE, GRPC_STATUS, Metadata, encode_grpc_message, encode_headers, pack_trailers,
    wrap_message,
};
use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, CONTENT_LENGTH, CONTENT_TYPE,
};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::context::{CallContext, CallError, CallOutcome};

/// Media type of every RPC response.
pub const GRPC_WEB_CONTENT_TYPE: &str = "application/grpc-web+proto";

/// Status message of a streaming call cut off by its deadline.
pub const DEADLINE_MESSAGE: &str = "request timed out at the server";

const HANDLER_FAILED_MESSAGE: &str = "unexpected error in method handler";
const SERIALIZE_FAILED_MESSAGE: &str = "failed to serialize response message";

/// HTTP status for a gRPC status code.
///
/// Only a hint for plain HTTP clients; gRPC-Web clients read `grpc-status`.
pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::Unknown | Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::Unimplemented => StatusCode::NOT_FOUND,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Fixed answer to an `OPTIONS` request on a registered path.
pub fn cors_preflight() -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, HeaderValue::from_static("*"));
    build(StatusCode::NO_CONTENT, headers, Body::empty())
}

/// Empty response with only a status line.
pub fn empty(status: StatusCode) -> Response {
    build(status, HeaderMap::new(), Body::empty())
}

/// Immediate answer for a method this transport cannot serve.
pub(crate) fn unimplemented(message: &str) -> Response {
    let mut headers = rpc_headers();
    headers.insert(CONTENT_LENGTH, HeaderValue::from(0));
    insert_status(&mut headers, Code::Unimplemented, Some(message));
    build(http_status(Code::Unimplemented), headers, Body::empty())
}

/// Buffer a unary call into a single response.
pub(crate) async fn unary(
    ctx: CallContext,
    call: BoxFuture<'static, Result<Bytes, CallError>>,
) -> Response {
    let message = match call.await {
        Ok(payload) => wrap_message(false, false, &payload),
        Err(err) => {
            record_failure(&ctx, err);
            Bytes::new()
        }
    };

    let outcome = ctx.complete();
    // Empty trailing metadata counts as unset.
    let trailer = match &outcome.trailing_metadata {
        Some(metadata) if !metadata.is_empty() => {
            wrap_message(true, false, &pack_trailers(&encode_headers(metadata)))
        }
        _ => Bytes::new(),
    };

    let mut body = BytesMut::with_capacity(message.len() + trailer.len());
    body.extend_from_slice(&message);
    body.extend_from_slice(&trailer);

    let mut headers = rpc_headers();
    headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    insert_status(&mut headers, outcome.code, outcome.details.as_deref());
    if let Some(metadata) = ctx.initial_metadata() {
        append_metadata(&mut headers, &metadata);
    }

    build(
        http_status(outcome.code),
        headers,
        Body::from(body.freeze()),
    )
}

/// Stream a server-streaming call.
///
/// The first value is pulled before headers are built, so a handler that
/// fails right away still gets a matching HTTP status.
pub(crate) async fn server_streaming(
    ctx: CallContext,
    mut stream: BoxStream<'static, Result<Bytes, CallError>>,
) -> Response {
    let first = next_message(&ctx, &mut stream).await;

    let status = match first {
        Some(_) => StatusCode::OK,
        None => http_status(ctx.code()),
    };

    let mut headers = rpc_headers();
    if let Some(metadata) = ctx.initial_metadata() {
        append_metadata(&mut headers, &metadata);
    }

    let frames = async_stream::stream! {
        if let Some(first) = first {
            yield Ok::<_, Infallible>(wrap_message(false, false, &first));
            while let Some(message) = next_message(&ctx, &mut stream).await {
                yield Ok(wrap_message(false, false, &message));
            }
        }
        // Stop the handler before reading its final status.
        drop(stream);
        yield Ok(trailer_frame(&ctx.complete()));
    };

    build(status, headers, Body::from_stream(frames))
}

/// Pull the next serialized message, enforcing the deadline.
///
/// Returns `None` once the call is over: the stream ended, the handler
/// failed or aborted, or the deadline passed.
async fn next_message(
    ctx: &CallContext,
    stream: &mut BoxStream<'static, Result<Bytes, CallError>>,
) -> Option<Bytes> {
    if ctx.is_terminated() {
        return None;
    }

    let item = match ctx.time_remaining() {
        None => stream.next().await,
        Some(remaining) if remaining.is_zero() => {
            expire(ctx);
            return None;
        }
        Some(remaining) => match tokio::time::timeout(remaining, stream.next()).await {
            Ok(item) => item,
            Err(_) => {
                expire(ctx);
                return None;
            }
        },
    };

    match item? {
        Ok(message) => Some(message),
        Err(err) => {
            record_failure(ctx, err);
            None
        }
    }
}

fn expire(ctx: &CallContext) {
    tracing::debug!("streaming call exceeded its deadline");
    ctx.terminate(Code::DeadlineExceeded, DEADLINE_MESSAGE);
}

/// Turn a handler error into the call's terminal status.
///
/// Aborts already carry their status. Everything else is logged here and
/// reported with a generic message.
fn record_failure(ctx: &CallContext, err: CallError) {
    match err {
        CallError::Aborted(_) => {}
        CallError::Serialize(err) => {
            tracing::error!(error = %err, "failed to serialize response message");
            ctx.terminate(Code::Internal, SERIALIZE_FAILED_MESSAGE);
        }
        err => {
            tracing::error!(error = %err, "method handler failed");
            ctx.terminate(Code::Unknown, HANDLER_FAILED_MESSAGE);
        }
    }
}

fn trailer_frame(outcome: &CallOutcome) -> Bytes {
    let mut trailers = vec![(GRPC_STATUS.to_string(), outcome.code.value().to_string())];
    if let Some(details) = &outcome.details {
        trailers.push((GRPC_MESSAGE.to_string(), encode_grpc_message(details)));
    }
    if let Some(metadata) = &outcome.trailing_metadata {
        trailers.extend(encode_headers(metadata));
    }
    wrap_message(true, false, &pack_trailers(&trailers))
}

/// Headers carried by every RPC response.
fn rpc_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(GRPC_WEB_CONTENT_TYPE),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, HeaderValue::from_static("*"));
    headers
}

fn insert_status(headers: &mut HeaderMap, code: Code, details: Option<&str>) {
    headers.insert(GRPC_STATUS, HeaderValue::from(code.value()));
    if let Some(details) = details {
        match HeaderValue::try_from(encode_grpc_message(details)) {
            Ok(value) => {
                headers.insert(GRPC_MESSAGE, value);
            }
            Err(e) => tracing::debug!(error = %e, "invalid grpc-message, dropped"),
        }
    }
}

fn append_metadata(headers: &mut HeaderMap, metadata: &Metadata) {
    for (key, value) in encode_headers(metadata) {
        let Ok(name) = HeaderName::from_bytes(key.as_bytes()) else {
            tracing::debug!(key = %key, "invalid header name, metadata dropped");
            continue;
        };
        let Ok(value) = HeaderValue::try_from(value) else {
            tracing::debug!(key = %key, "invalid header value, metadata dropped");
            continue;
        };
        headers.append(name, value);
    }
}

fn build(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
