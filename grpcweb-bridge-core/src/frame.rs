//! gRPC-Web frame codec.
//!
//! Every message and the final trailer block travel as a length-prefixed frame:
//!
//! ```text
//! [flags:1][length:4 big-endian][payload:length]
//! ```
//!
//! The most significant flag bit marks a trailer block, the least significant
//! bit marks a compressed payload. Compression is never performed here; the
//! bit is carried through as advisory information only.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::FramingError;

/// Frame control byte flags.
pub mod frame_flags {
    /// Regular, uncompressed message.
    pub const MESSAGE: u8 = 0x00;
    /// Payload is compressed.
    pub const COMPRESSED: u8 = 0x01;
    /// Payload is a trailer block.
    pub const TRAILER: u8 = 0x80;
    /// Bits that must be zero.
    pub const RESERVED: u8 = !(TRAILER | COMPRESSED);
}

/// Frame header size (flags + length).
pub const FRAME_HEADER_SIZE: usize = 5;

/// One decoded frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub is_trailer: bool,
    pub is_compressed: bool,
    pub payload: Bytes,
}

impl Frame {
    /// A message frame carrying one serialized value.
    pub fn message(payload: impl Into<Bytes>) -> Self {
        Self {
            is_trailer: false,
            is_compressed: false,
            payload: payload.into(),
        }
    }

    /// A trailer frame carrying a packed trailer block.
    pub fn trailer(payload: impl Into<Bytes>) -> Self {
        Self {
            is_trailer: true,
            is_compressed: false,
            payload: payload.into(),
        }
    }

    /// Size of this frame on the wire.
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }

    /// Encode this frame.
    pub fn encode(&self) -> Bytes {
        wrap_message(self.is_trailer, self.is_compressed, &self.payload)
    }
}

fn pack_flags(is_trailer: bool, is_compressed: bool) -> u8 {
    let mut flags = frame_flags::MESSAGE;
    if is_trailer {
        flags |= frame_flags::TRAILER;
    }
    if is_compressed {
        flags |= frame_flags::COMPRESSED;
    }
    flags
}

/// Wrap a payload in a frame.
///
/// Payloads are bounded by the 4-byte length field; callers never hand in
/// more than `u32::MAX` bytes.
pub fn wrap_message(is_trailer: bool, is_compressed: bool, payload: &[u8]) -> Bytes {
    debug_assert!(payload.len() <= u32::MAX as usize);

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&[pack_flags(is_trailer, is_compressed)]);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame.freeze()
}

/// Parse the frame header, returning `(flags, length)`.
pub fn parse_frame_header(data: &[u8]) -> Result<(u8, u32), FramingError> {
    if data.len() < FRAME_HEADER_SIZE {
        return Err(FramingError::IncompleteHeader {
            expected: FRAME_HEADER_SIZE,
            actual: data.len(),
        });
    }

    let flags = data[0];
    if flags & frame_flags::RESERVED != 0 {
        return Err(FramingError::ReservedFlags(flags));
    }
    let length = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);

    Ok((flags, length))
}

/// Parse exactly one leading frame from `data`.
///
/// Bytes after the first frame are ignored. Fails if the header is short or
/// the declared length exceeds what is buffered.
pub fn unwrap_message(data: &[u8]) -> Result<Frame, FramingError> {
    let (flags, length) = parse_frame_header(data)?;
    let length = length as usize;
    let available = data.len() - FRAME_HEADER_SIZE;
    if available < length {
        return Err(FramingError::IncompletePayload {
            expected: length,
            actual: available,
        });
    }

    Ok(Frame {
        is_trailer: flags & frame_flags::TRAILER != 0,
        is_compressed: flags & frame_flags::COMPRESSED != 0,
        payload: Bytes::copy_from_slice(&data[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + length]),
    })
}

/// Split a complete body into its frames, in order.
///
/// Trailing bytes that do not form a whole frame are an error.
pub fn unwrap_messages(data: &[u8]) -> Result<Vec<Frame>, FramingError> {
    let mut decoder = FrameDecoder::new();
    decoder.extend(data);

    let mut frames = Vec::new();
    while let Some(frame) = decoder.decode_next()? {
        frames.push(frame);
    }
    decoder.finish()?;
    Ok(frames)
}

/// Incremental frame decoder for bodies that arrive in pieces.
///
/// Feed bytes with [`extend`](Self::extend) and pull frames with
/// [`decode_next`](Self::decode_next); `Ok(None)` means more bytes are needed.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Try to decode the next complete frame.
    pub fn decode_next(&mut self) -> Result<Option<Frame>, FramingError> {
        if self.buffer.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let (flags, length) = parse_frame_header(&self.buffer)?;
        let frame_size = FRAME_HEADER_SIZE + length as usize;
        if self.buffer.len() < frame_size {
            return Ok(None);
        }

        let mut frame = self.buffer.split_to(frame_size);
        frame.advance(FRAME_HEADER_SIZE);

        Ok(Some(Frame {
            is_trailer: flags & frame_flags::TRAILER != 0,
            is_compressed: flags & frame_flags::COMPRESSED != 0,
            payload: frame.freeze(),
        }))
    }

    /// Verify no partial frame is left behind.
    pub fn finish(&self) -> Result<(), FramingError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        // Re-run the checks on the leftover bytes to report the right variant.
        unwrap_message(&self.buffer).map(|_| ())
    }
}
