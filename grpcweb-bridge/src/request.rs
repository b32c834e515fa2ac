//! Request body ingestion.
//!
//! The reader works on any [`AsyncBufRead`], so it can sit directly on a raw
//! connection as well as on an already-parsed HTTP body. How many bytes to
//! take is decided from the request headers by [`BodyFraming`]:
//!
//! - `Transfer-Encoding: chunked`: chunks are reassembled until the zero-size
//!   chunk. If the HTTP server already de-chunks bodies (see
//!   [`BridgeConfig::decode_chunked`]), the body is read to its end instead.
//! - a valid, non-zero `Content-Length`: exactly that many bytes.
//! - otherwise: at most [`BridgeConfig::fallback_read_size`] bytes.
//!
//! The bytes returned are still wrapped in their outer frame.

use std::io;

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use http::HeaderMap;
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;

use crate::config::{BridgeConfig, MessageLimits};
use crate::error::{BoxError, ReadError};

/// Longest chunk-size line accepted, extensions included.
const MAX_CHUNK_LINE: u64 = 4096;

/// Upper bound on buffer space reserved ahead of the bytes arriving.
const MAX_PREALLOC: usize = 8 * 1024;

/// How the request body is delimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyFraming {
    /// Chunked transfer coding, reassembled by the reader.
    Chunked,
    /// Declared `Content-Length`.
    Length(usize),
    /// Delimited by the end of the stream.
    ToEnd,
    /// Nothing usable declared: read the fallback amount.
    Unknown,
}

impl BodyFraming {
    /// Pick the framing from raw `Content-Length` and `Transfer-Encoding` values.
    ///
    /// A zero or unparseable length counts as no length.
    pub fn detect(
        content_length: Option<&str>,
        transfer_encoding: Option<&str>,
        decode_chunked: bool,
    ) -> Self {
        if transfer_encoding.is_some_and(is_chunked) {
            return if decode_chunked {
                BodyFraming::Chunked
            } else {
                BodyFraming::ToEnd
            };
        }

        match content_length.and_then(|v| v.trim().parse::<usize>().ok()) {
            Some(len) if len > 0 => BodyFraming::Length(len),
            _ => BodyFraming::Unknown,
        }
    }

    pub fn from_headers(headers: &HeaderMap, decode_chunked: bool) -> Self {
        let content_length = headers.get(CONTENT_LENGTH).and_then(|v| v.to_str().ok());
        let transfer_encoding = headers
            .get(TRANSFER_ENCODING)
            .and_then(|v| v.to_str().ok());
        Self::detect(content_length, transfer_encoding, decode_chunked)
    }
}

/// `chunked` must be the final transfer coding.
fn is_chunked(transfer_encoding: &str) -> bool {
    transfer_encoding
        .rsplit(',')
        .next()
        .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

/// Read the framed request payload from `reader`.
pub async fn read_request_body<R>(
    reader: &mut R,
    framing: BodyFraming,
    config: &BridgeConfig,
) -> Result<Bytes, ReadError>
where
    R: AsyncBufRead + Unpin,
{
    let limits = &config.limits;
    match framing {
        BodyFraming::Chunked => read_chunked(reader, limits).await,
        BodyFraming::Length(len) => {
            limits.check_size(len)?;
            read_exact_len(reader, len).await
        }
        BodyFraming::ToEnd => read_to_end(reader, limits).await,
        BodyFraming::Unknown => {
            let mut buf = Vec::with_capacity(config.fallback_read_size.min(MAX_PREALLOC));
            reader
                .take(config.fallback_read_size as u64)
                .read_to_end(&mut buf)
                .await?;
            Ok(Bytes::from(buf))
        }
    }
}

/// Reassemble a chunked body.
///
/// Stops at end of input, a bare CRLF line, or a zero-size chunk. The chunk
/// trailer section, if any, is left unread.
async fn read_chunked<R>(reader: &mut R, limits: &MessageLimits) -> Result<Bytes, ReadError>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = BytesMut::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = (&mut *reader)
            .take(MAX_CHUNK_LINE)
            .read_until(b'\n', &mut line)
            .await?;
        if read == 0 || line == b"\r\n" {
            break;
        }

        let size = parse_chunk_size(&line)?;
        if size == 0 {
            break;
        }
        limits.check_size(body.len().saturating_add(size))?;

        // Chunk data is followed by CRLF.
        let framed = size
            .checked_add(2)
            .ok_or_else(|| ReadError::InvalidChunkSize(format!("{size:x}")))?;
        let chunk = read_exact_len(reader, framed).await?;
        body.extend_from_slice(&chunk[..size]);
    }

    Ok(body.freeze())
}

/// Hex size before an optional `;` extension.
fn parse_chunk_size(line: &[u8]) -> Result<usize, ReadError> {
    let text = String::from_utf8_lossy(line);
    let size = text.split(';').next().unwrap_or_default().trim();
    usize::from_str_radix(size, 16).map_err(|_| ReadError::InvalidChunkSize(size.to_string()))
}

async fn read_exact_len<R>(reader: &mut R, len: usize) -> Result<Bytes, ReadError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(len.min(MAX_PREALLOC));
    (&mut *reader).take(len as u64).read_to_end(&mut buf).await?;
    if buf.len() < len {
        return Err(ReadError::ShortRead {
            expected: len,
            actual: buf.len(),
        });
    }
    Ok(Bytes::from(buf))
}

async fn read_to_end<R>(reader: &mut R, limits: &MessageLimits) -> Result<Bytes, ReadError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    match limits.max_message_size() {
        Some(max) => {
            // One byte past the limit is enough to tell it was exceeded.
            (&mut *reader)
                .take(max as u64 + 1)
                .read_to_end(&mut buf)
                .await?;
            limits.check_size(buf.len())?;
        }
        None => {
            reader.read_to_end(&mut buf).await?;
        }
    }
    Ok(Bytes::from(buf))
}

/// Adapt an HTTP body into a buffered byte reader.
pub fn body_reader<B>(body: B) -> impl AsyncBufRead + Send + Unpin
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    StreamReader::new(Body::new(body).into_data_stream().map_err(io::Error::other))
}
