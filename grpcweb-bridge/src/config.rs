//! Bridge configuration.
//!
//! [`BridgeConfig`] can be built in code through the setters on
//! [`GrpcWebService`](crate::GrpcWebService), or deserialized from any serde
//! format:
//!
//! ```
//! use grpcweb_bridge::BridgeConfig;
//!
//! let config: BridgeConfig = serde_json::from_str(r#"{
//!     "decode_chunked": false,
//!     "limits": { "max_message_size": 1048576 },
//!     "server_timeout": { "secs": 30, "nanos": 0 }
//! }"#).unwrap();
//!
//! assert!(!config.decode_chunked);
//! assert_eq!(config.fallback_read_size, 5);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::ReadError;

/// Default maximum request body size (4 MB), matching gRPC's default receive limit.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Bytes read when a request declares neither a length nor chunked framing.
///
/// This covers a frame header and nothing more. Larger bodies sent without
/// a length are cut short and then rejected by frame parsing.
pub const DEFAULT_FALLBACK_READ_SIZE: usize = 5;

/// Runtime settings for [`GrpcWebService`](crate::GrpcWebService).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Reassemble `Transfer-Encoding: chunked` bodies.
    ///
    /// Turn this off when the HTTP server already de-chunks request bodies,
    /// as hyper and axum do while keeping the header.
    pub decode_chunked: bool,
    pub fallback_read_size: usize,
    pub limits: MessageLimits,
    /// Server-side deadline applied to every call.
    pub server_timeout: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            decode_chunked: true,
            fallback_read_size: DEFAULT_FALLBACK_READ_SIZE,
            limits: MessageLimits::default(),
            server_timeout: None,
        }
    }
}

/// Limit on the size of a request body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MessageLimits {
    /// `None` means unlimited.
    max_message_size: Option<usize>,
}

impl Default for MessageLimits {
    fn default() -> Self {
        Self {
            max_message_size: Some(DEFAULT_MAX_MESSAGE_SIZE),
        }
    }
}

impl MessageLimits {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size: Some(max_message_size),
        }
    }

    /// No maximum. Only for trusted clients.
    pub fn unlimited() -> Self {
        Self {
            max_message_size: None,
        }
    }

    pub fn max_message_size(&self) -> Option<usize> {
        self.max_message_size
    }

    /// Fails with [`ReadError::TooLarge`] if `size` exceeds the limit.
    pub fn check_size(&self, size: usize) -> Result<(), ReadError> {
        match self.max_message_size {
            Some(max) if size > max => Err(ReadError::TooLarge { size, max }),
            _ => Ok(()),
        }
    }
}

/// Compute the effective timeout from server and client timeouts.
///
/// The smaller one wins. Returns `None` if neither is set.
pub fn compute_effective_timeout(
    server_timeout: Option<Duration>,
    client_timeout: Option<Duration>,
) -> Option<Duration> {
    match (server_timeout, client_timeout) {
        (Some(server), Some(client)) => Some(server.min(client)),
        (Some(server), None) => Some(server),
        (None, client) => client,
    }
}
