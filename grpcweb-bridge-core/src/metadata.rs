//! Call metadata and its text encodings.
//!
//! Metadata is an ordered list of `(key, value)` pairs. Duplicate keys are
//! allowed and keep their order. Keys ending in [`BINARY_SUFFIX`] carry raw
//! bytes, which travel base64-encoded in headers and trailer blocks.

use base64::Engine;
use base64::alphabet;
use base64::engine::DecodePaddingMode;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use bytes::Bytes;
use http::HeaderMap;

use crate::error::MetadataError;

/// Key suffix marking binary metadata.
pub const BINARY_SUFFIX: &str = "-bin";

/// Trailer key for the numeric status code.
pub const GRPC_STATUS: &str = "grpc-status";

/// Trailer key for the percent-encoded status message.
pub const GRPC_MESSAGE: &str = "grpc-message";

/// Inbound binary values are accepted with or without padding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A metadata value: UTF-8 text, or raw bytes for `-bin` keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataValue {
    Ascii(String),
    Binary(Bytes),
}

impl MetadataValue {
    /// Text form, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Ascii(s) => Some(s),
            MetadataValue::Binary(_) => None,
        }
    }

    /// Raw bytes of the value (UTF-8 bytes for text).
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            MetadataValue::Ascii(s) => s.as_bytes(),
            MetadataValue::Binary(b) => b,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Ascii(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Ascii(value)
    }
}

impl From<Vec<u8>> for MetadataValue {
    fn from(value: Vec<u8>) -> Self {
        MetadataValue::Binary(Bytes::from(value))
    }
}

impl From<Bytes> for MetadataValue {
    fn from(value: Bytes) -> Self {
        MetadataValue::Binary(value)
    }
}

/// Ordered metadata entries.
///
/// Keys are lowercased on insertion and must be valid header names; text
/// values may not contain control characters; binary values require a
/// `-bin` key.
///
/// # Example
///
/// ```
/// use grpcweb_bridge_core::Metadata;
///
/// let mut md = Metadata::new();
/// md.append("X-Request-Id", "abc").unwrap();
/// md.append("trace-bin", vec![1u8, 2, 3]).unwrap();
///
/// assert_eq!(md.get("x-request-id").and_then(|v| v.as_str()), Some("abc"));
/// assert!(md.append("plain", vec![0u8]).is_err());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, MetadataValue)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry after validating it.
    pub fn append<K, V>(&mut self, key: K, value: V) -> Result<&mut Self, MetadataError>
    where
        K: AsRef<str>,
        V: Into<MetadataValue>,
    {
        let key = key.as_ref().to_ascii_lowercase();
        if http::HeaderName::from_bytes(key.as_bytes()).is_err() {
            return Err(MetadataError::InvalidKey(key));
        }

        let value = value.into();
        match &value {
            MetadataValue::Binary(_) if !is_binary_key(&key) => {
                return Err(MetadataError::BinaryWithoutSuffix(key));
            }
            MetadataValue::Ascii(text) if text.chars().any(|c| c.is_control() && c != '\t') => {
                return Err(MetadataError::InvalidValue(key));
            }
            _ => {}
        }

        self.entries.push((key, value));
        Ok(self)
    }

    /// Builder form of [`append`](Self::append).
    pub fn with<K, V>(mut self, key: K, value: V) -> Result<Self, MetadataError>
    where
        K: AsRef<str>,
        V: Into<MetadataValue>,
    {
        self.append(key, value)?;
        Ok(self)
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// All values stored under `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a MetadataValue> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether `key` names a binary metadata entry.
pub fn is_binary_key(key: &str) -> bool {
    key.len() > BINARY_SUFFIX.len()
        && key.as_bytes()[key.len() - BINARY_SUFFIX.len()..]
            .eq_ignore_ascii_case(BINARY_SUFFIX.as_bytes())
}

/// Render metadata as wire `(key, value)` pairs.
///
/// Keys are lowercased; values of `-bin` keys are base64-encoded, all others
/// are passed through as text.
pub fn encode_headers(metadata: &Metadata) -> Vec<(String, String)> {
    metadata
        .iter()
        .map(|(key, value)| {
            let key = key.to_ascii_lowercase();
            let value = if is_binary_key(&key) {
                STANDARD.encode(value.as_bytes())
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            (key, value)
        })
        .collect()
}

/// Pack `(key, value)` pairs into a trailer block, one `key: value\r\n` line each.
pub fn pack_trailers<K, V>(trailers: &[(K, V)]) -> Bytes
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut block = String::new();
    for (key, value) in trailers {
        block.push_str(key.as_ref());
        block.push_str(": ");
        block.push_str(value.as_ref());
        block.push_str("\r\n");
    }
    Bytes::from(block)
}

/// Parse a trailer block back into ordered pairs with lowercased keys.
pub fn unpack_trailers(block: &[u8]) -> Result<Vec<(String, String)>, MetadataError> {
    let text = String::from_utf8_lossy(block);
    text.split("\r\n")
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| MetadataError::MalformedTrailerLine(line.to_string()))?;
            Ok((key.trim().to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

/// Percent-encode a status message for `grpc-message`.
///
/// Unreserved characters and `/` are kept, everything else is escaped.
pub fn encode_grpc_message(message: &str) -> String {
    urlencoding::encode(message).replace("%2F", "/")
}

/// Decode a percent-encoded `grpc-message` value.
pub fn decode_grpc_message(encoded: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(encoded.as_bytes())).into_owned()
}

/// How transport header names map to metadata keys.
///
/// Applied in order: optional prefix strip (names without the prefix are
/// skipped), optional `_` to `-` replacement, lowercasing. Binary-suffix
/// detection then runs on the resulting key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderNameRules {
    pub strip_prefix: Option<&'static str>,
    pub underscores_to_dashes: bool,
}

impl HeaderNameRules {
    /// Plain HTTP header names, as found in an [`HeaderMap`].
    pub const HTTP: Self = Self {
        strip_prefix: None,
        underscores_to_dashes: false,
    };

    /// CGI-style environment names such as `HTTP_X_REQUEST_ID`.
    pub const CGI: Self = Self {
        strip_prefix: Some("HTTP_"),
        underscores_to_dashes: true,
    };

    /// Map a transport name to a metadata key, or `None` if it is not a header.
    pub fn metadata_key(&self, name: &str) -> Option<String> {
        let name = match self.strip_prefix {
            Some(prefix) => name.strip_prefix(prefix)?,
            None => name,
        };
        let key = if self.underscores_to_dashes {
            name.replace('_', "-")
        } else {
            name.to_string()
        };
        Some(key.to_ascii_lowercase())
    }
}

impl Default for HeaderNameRules {
    fn default() -> Self {
        Self::HTTP
    }
}

/// Decode one inbound header into a metadata key and value.
pub fn decode_header(
    name: &str,
    value: &[u8],
    rules: &HeaderNameRules,
) -> Result<Option<(String, MetadataValue)>, MetadataError> {
    let Some(key) = rules.metadata_key(name) else {
        return Ok(None);
    };

    let value = if is_binary_key(&key) {
        let decoded = LENIENT_BASE64
            .decode(value)
            .map_err(|_| MetadataError::InvalidBase64(key.clone()))?;
        MetadataValue::Binary(Bytes::from(decoded))
    } else {
        MetadataValue::Ascii(String::from_utf8_lossy(value).into_owned())
    };
    Ok(Some((key, value)))
}

/// Build inbound metadata from `(name, value)` pairs.
///
/// Entries that cannot be decoded are dropped and logged by the caller via
/// the returned rejects.
pub fn metadata_from_pairs<'a, I>(
    pairs: I,
    rules: &HeaderNameRules,
) -> (Metadata, Vec<MetadataError>)
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut metadata = Metadata::new();
    let mut rejected = Vec::new();

    for (name, value) in pairs {
        match decode_header(name, value, rules) {
            Ok(Some((key, value))) => {
                // Inbound text is kept verbatim; only the key is validated.
                if http::HeaderName::from_bytes(key.as_bytes()).is_ok() {
                    metadata.entries.push((key, value));
                } else {
                    rejected.push(MetadataError::InvalidKey(key));
                }
            }
            Ok(None) => {}
            Err(err) => rejected.push(err),
        }
    }

    (metadata, rejected)
}

/// Build inbound metadata from an [`HeaderMap`].
pub fn metadata_from_headers(headers: &HeaderMap) -> (Metadata, Vec<MetadataError>) {
    metadata_from_pairs(
        headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_bytes())),
        &HeaderNameRules::HTTP,
    )
}
