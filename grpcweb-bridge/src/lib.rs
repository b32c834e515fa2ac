//! # gRPC-Web bridge
//!
//! Serve gRPC method handlers to gRPC-Web clients from a plain HTTP server.
//!
//! The bridge is a [`tower::Service`] that sits in front of (or inside) an
//! axum application. Requests whose path matches a registered method are
//! decoded from gRPC-Web frames, dispatched to the handler, and answered with
//! framed messages and a trailer block; everything else falls through to the
//! wrapped application.
//!
//! ## Features
//!
//! - **Unary and server-streaming** calls. Request-streaming methods are
//!   rejected with `UNIMPLEMENTED`.
//! - **Deadlines** from `grpc-timeout`, enforced between streamed messages.
//! - **Metadata** in both directions, including `-bin` keys.
//! - **CORS** preflight answered for every registered path.
//!
//! ## Chunked request bodies
//!
//! By default the bridge reassembles `Transfer-Encoding: chunked` bodies
//! itself, for hosts that hand over the raw bytes. hyper and axum de-chunk
//! the body but leave the header in place; behind them, disable this with
//! [`GrpcWebService::decode_chunked(false)`](GrpcWebService::decode_chunked)
//! or chunked requests fail with [`ReadError::InvalidChunkSize`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use grpcweb_bridge::prelude::*;
//!
//! let greeter = ServiceDescriptor::new("helloworld.Greeter");
//! # fn decode(b: bytes::Bytes) -> Result<String, BoxError> { Ok(String::from_utf8(b.to_vec())?) }
//! # fn encode(s: &String) -> Result<bytes::Bytes, BoxError> { Ok(s.clone().into()) }
//! let greeter = greeter.method(MethodDescriptor::unary(
//!     "/helloworld.Greeter/SayHello",
//!     decode,
//!     encode,
//!     |name: String, _ctx: CallContext| async move {
//!         Ok::<_, CallError>(format!("Hello {name}"))
//!     },
//! ));
//!
//! let mut registry = HandlerRegistry::new();
//! registry.add_provider(greeter);
//! let service = GrpcWebService::new(registry).decode_chunked(false);
//! ```

pub mod capability;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod registry;
pub mod request;
pub mod response;
pub mod service;

pub use capability::{Capability, Unsupported};
pub use config::{BridgeConfig, MessageLimits, compute_effective_timeout};
pub use context::{Aborted, CallContext, CallError};
pub use error::{BoxError, BridgeError, ReadError};
pub use registry::{
    HandlerRegistry, MethodDescriptor, MethodKind, MethodProvider, ServiceDescriptor,
};
pub use request::{BodyFraming, read_request_body};
pub use response::{DEADLINE_MESSAGE, GRPC_WEB_CONTENT_TYPE, http_status};
pub use service::{GrpcWebService, NotFound};

pub use grpcweb_bridge_core::{Code, Metadata, MetadataValue, Status};

// Re-export several crates
pub use futures;
pub use prost;

pub mod prelude {
    //! The types most handlers and servers need.
    pub use crate::context::{CallContext, CallError};
    pub use crate::error::BoxError;
    pub use crate::registry::{HandlerRegistry, MethodDescriptor, ServiceDescriptor};
    pub use crate::service::GrpcWebService;
    pub use grpcweb_bridge_core::{Code, Metadata, Status};
}
