//! Wire-level types for gRPC-Web.
//!
//! This crate provides the pieces of the protocol that do not depend on any
//! HTTP server or async runtime, shared by the `grpcweb-bridge` runtime and
//! by clients that need to decode its responses.
//!
//! ## Modules
//!
//! - [`frame`]: Length-prefixed message and trailer frames
//! - [`metadata`]: Ordered metadata, header encoding, trailer blocks
//! - [`timeout`]: `grpc-timeout` parsing and serialization
//! - [`error`]: Status codes and codec errors

pub mod error;
pub mod frame;
pub mod metadata;
pub mod timeout;

pub use error::*;
pub use frame::{
    FRAME_HEADER_SIZE, Frame, FrameDecoder, frame_flags, parse_frame_header, unwrap_message,
    unwrap_messages, wrap_message,
};
pub use metadata::{
    BINARY_SUFFIX, GRPC_MESSAGE, GRPC_STATUS, HeaderNameRules, Metadata, MetadataValue,
    decode_grpc_message, decode_header, encode_grpc_message, encode_headers, is_binary_key,
    metadata_from_headers, metadata_from_pairs, pack_trailers, unpack_trailers,
};
pub use timeout::{GRPC_TIMEOUT_HEADER, parse_timeout, serialize_timeout};
