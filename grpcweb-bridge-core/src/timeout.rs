//! `grpc-timeout` header parsing and serialization.
//!
//! A timeout is an ASCII digit string followed by a single unit character:
//!
//! | unit | meaning      |
//! |------|--------------|
//! | `H`  | hours        |
//! | `M`  | minutes      |
//! | `S`  | seconds      |
//! | `m`  | milliseconds |
//! | `u`  | microseconds |
//! | `n`  | nanoseconds  |

use std::time::Duration;

use crate::error::TimeoutParseError;

/// Header name for the client deadline.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// Longest magnitude accepted when serializing.
const MAX_TIMEOUT_DIGITS: u64 = 99_999_999;

/// Parse a `grpc-timeout` value into a duration.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use grpcweb_bridge_core::parse_timeout;
///
/// assert_eq!(parse_timeout("1S"), Ok(Duration::from_secs(1)));
/// assert_eq!(parse_timeout("500m"), Ok(Duration::from_millis(500)));
/// assert!(parse_timeout("abc").is_err());
/// ```
pub fn parse_timeout(value: &str) -> Result<Duration, TimeoutParseError> {
    let mut chars = value.chars();
    let unit = chars.next_back().ok_or(TimeoutParseError::Empty)?;
    let magnitude = chars.as_str();

    if magnitude.is_empty() || !magnitude.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TimeoutParseError::InvalidMagnitude(magnitude.to_string()));
    }
    let count: u64 = magnitude
        .parse()
        .map_err(|_| TimeoutParseError::Overflow)?;

    let duration = match unit {
        'H' => Duration::from_secs(count.checked_mul(3600).ok_or(TimeoutParseError::Overflow)?),
        'M' => Duration::from_secs(count.checked_mul(60).ok_or(TimeoutParseError::Overflow)?),
        'S' => Duration::from_secs(count),
        'm' => Duration::from_millis(count),
        'u' => Duration::from_micros(count),
        'n' => Duration::from_nanos(count),
        other => return Err(TimeoutParseError::UnknownUnit(other)),
    };
    Ok(duration)
}

/// Render a duration as a `grpc-timeout` value.
///
/// Picks the coarsest unit that represents the duration exactly within eight
/// digits; otherwise the finest unit that fits, rounded up so the peer never
/// sees a shorter deadline than intended.
pub fn serialize_timeout(timeout: Duration) -> String {
    const UNITS: [(u128, char); 6] = [
        (3_600_000_000_000, 'H'),
        (60_000_000_000, 'M'),
        (1_000_000_000, 'S'),
        (1_000_000, 'm'),
        (1_000, 'u'),
        (1, 'n'),
    ];

    let nanos = timeout.as_nanos();
    for (scale, unit) in UNITS {
        if nanos % scale == 0 && nanos / scale <= MAX_TIMEOUT_DIGITS as u128 {
            return format!("{}{}", nanos / scale, unit);
        }
    }
    for (scale, unit) in UNITS.iter().rev() {
        let count = nanos.div_ceil(*scale);
        if count <= MAX_TIMEOUT_DIGITS as u128 {
            return format!("{}{}", count, unit);
        }
    }
    format!("{}H", MAX_TIMEOUT_DIGITS)
}
