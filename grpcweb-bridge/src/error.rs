//! Transport-level errors.
//!
//! These are the failures that happen before a gRPC status can be reliably
//! produced: the request body could not be delimited, or its frame could not
//! be parsed or deserialized. They are returned as the service error so the
//! hosting HTTP server handles them on its own error path.
//!
//! Application failures never show up here. Those travel as `grpc-status`
//! on the response, see [`CallError`](crate::context::CallError).

pub use grpcweb_bridge_core::{Code, FramingError, MetadataError, Status, TimeoutParseError};

/// Boxed error used at type-erased boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure reading the request body from the transport.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("failed to read request body: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid chunk size line: {0:?}")]
    InvalidChunkSize(String),

    #[error("request body ended early: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("request body of {size} bytes exceeds maximum allowed size of {max} bytes")]
    TooLarge { size: usize, max: usize },
}

/// Errors surfaced to the hosting HTTP server.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("malformed request frame: {0}")]
    Framing(#[from] FramingError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("failed to deserialize request message: {0}")]
    Deserialize(#[source] BoxError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_error_display() {
        let err = ReadError::InvalidChunkSize("zz".into());
        assert_eq!(err.to_string(), "invalid chunk size line: \"zz\"");

        let err = ReadError::ShortRead {
            expected: 10,
            actual: 4,
        };
        assert_eq!(
            err.to_string(),
            "request body ended early: expected 10 bytes, got 4"
        );
    }

    #[test]
    fn test_bridge_error_from() {
        let err: BridgeError = FramingError::ReservedFlags(0x02).into();
        assert!(matches!(err, BridgeError::Framing(_)));
        assert_eq!(
            err.to_string(),
            "malformed request frame: reserved frame flag bits set: 0x02"
        );

        let err: BridgeError = ReadError::TooLarge { size: 9, max: 8 }.into();
        assert!(matches!(err, BridgeError::Read(ReadError::TooLarge { .. })));
    }
}
