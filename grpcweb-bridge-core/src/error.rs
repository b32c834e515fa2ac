//! gRPC status codes and wire-level error types.
//!
//! This module provides:
//! - [`Code`]: gRPC status codes as carried in `grpc-status`
//! - [`Status`]: a code with an optional message
//! - [`FramingError`], [`TimeoutParseError`], [`MetadataError`]: codec failures

use std::str::FromStr;

/// gRPC status codes, with the numeric values sent in `grpc-status`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Code {
    #[default]
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Numeric value as written to the `grpc-status` header or trailer.
    pub fn value(self) -> i32 {
        self as i32
    }

    /// Look up a code by its numeric value.
    pub fn from_value(value: i32) -> Option<Self> {
        let code = match value {
            0 => Code::Ok,
            1 => Code::Cancelled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => return None,
        };
        Some(code)
    }

    /// Canonical upper-case name, e.g. `DEADLINE_EXCEEDED`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "OK",
            Code::Cancelled => "CANCELLED",
            Code::Unknown => "UNKNOWN",
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Code::NotFound => "NOT_FOUND",
            Code::AlreadyExists => "ALREADY_EXISTS",
            Code::PermissionDenied => "PERMISSION_DENIED",
            Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Code::FailedPrecondition => "FAILED_PRECONDITION",
            Code::Aborted => "ABORTED",
            Code::OutOfRange => "OUT_OF_RANGE",
            Code::Unimplemented => "UNIMPLEMENTED",
            Code::Internal => "INTERNAL",
            Code::Unavailable => "UNAVAILABLE",
            Code::DataLoss => "DATA_LOSS",
            Code::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`Code`] from a string fails.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown status code")]
pub struct ParseCodeError(());

impl FromStr for Code {
    type Err = ParseCodeError;

    /// Accepts either the numeric form (`"5"`) or the canonical name (`"NOT_FOUND"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(value) = s.parse::<i32>() {
            return Code::from_value(value).ok_or(ParseCodeError(()));
        }
        match s.to_ascii_uppercase().as_str() {
            "OK" => Ok(Code::Ok),
            "CANCELLED" | "CANCELED" => Ok(Code::Cancelled),
            "UNKNOWN" => Ok(Code::Unknown),
            "INVALID_ARGUMENT" => Ok(Code::InvalidArgument),
            "DEADLINE_EXCEEDED" => Ok(Code::DeadlineExceeded),
            "NOT_FOUND" => Ok(Code::NotFound),
            "ALREADY_EXISTS" => Ok(Code::AlreadyExists),
            "PERMISSION_DENIED" => Ok(Code::PermissionDenied),
            "RESOURCE_EXHAUSTED" => Ok(Code::ResourceExhausted),
            "FAILED_PRECONDITION" => Ok(Code::FailedPrecondition),
            "ABORTED" => Ok(Code::Aborted),
            "OUT_OF_RANGE" => Ok(Code::OutOfRange),
            "UNIMPLEMENTED" => Ok(Code::Unimplemented),
            "INTERNAL" => Ok(Code::Internal),
            "UNAVAILABLE" => Ok(Code::Unavailable),
            "DATA_LOSS" => Ok(Code::DataLoss),
            "UNAUTHENTICATED" => Ok(Code::Unauthenticated),
            _ => Err(ParseCodeError(())),
        }
    }
}

/// RPC status: a code plus an optional human-readable message.
///
/// # Example
///
/// ```
/// use grpcweb_bridge_core::{Code, Status};
///
/// let status = Status::not_found("user not found");
/// assert_eq!(status.code(), Code::NotFound);
/// assert_eq!(status.message(), Some("user not found"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: Option<String>,
}

impl Status {
    /// Create a new status with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    /// Create a new status with just a code.
    pub fn from_code(code: Code) -> Self {
        Self {
            code,
            message: None,
        }
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn deadline_exceeded<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn permission_denied<S: Into<String>>(message: S) -> Self {
        Self::new(Code::PermissionDenied, message)
    }

    pub fn unimplemented<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unavailable, message)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(msg) = &self.message {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for Status {}

/// Frame parsing errors.
///
/// A framing error is fatal to the call: no partial payload is ever returned.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    /// Fewer bytes than a frame header.
    #[error("incomplete frame header: expected {expected} bytes, got {actual}")]
    IncompleteHeader { expected: usize, actual: usize },

    /// The declared length runs past the end of the buffer.
    #[error("incomplete frame payload: declared {expected} bytes, got {actual}")]
    IncompletePayload { expected: usize, actual: usize },

    /// A reserved bit of the control byte is set.
    #[error("reserved frame flag bits set: 0x{0:02x}")]
    ReservedFlags(u8),
}

/// Errors from parsing a `grpc-timeout` value.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutParseError {
    #[error("empty timeout value")]
    Empty,

    #[error("invalid timeout magnitude: {0:?}")]
    InvalidMagnitude(String),

    #[error("unknown timeout unit: {0:?}")]
    UnknownUnit(char),

    #[error("timeout value overflows")]
    Overflow,
}

/// Metadata validation and encoding errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("invalid metadata key: {0:?}")]
    InvalidKey(String),

    #[error("invalid value for metadata key {0:?}")]
    InvalidValue(String),

    #[error("binary value for metadata key {0:?} without the -bin suffix")]
    BinaryWithoutSuffix(String),

    #[error("invalid base64 in metadata key {0:?}")]
    InvalidBase64(String),

    #[error("malformed trailer line: {0:?}")]
    MalformedTrailerLine(String),
}
