//! WebSocket frames and the codec that moves them over the wire (RFC 6455 §5).
//!
//! A [`Frame`] is the unit exchanged with peers. [`WebSocketCodec`] plugs into
//! `tokio_util::codec` so a socket can be driven as a `Stream` of decoded
//! frames and a `Sink` of outbound ones.

mod codec;
pub mod error;
mod length;

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
pub use codec::{DEFAULT_MAX_PAYLOAD_LEN, MAX_PAYLOAD_LEN_CEILING, Role, WebSocketCodec};
pub use error::{CodecError, EofError, FramingError};
pub use length::{LONG_LEN_MARKER, LengthTier, MAX_SHORT_LEN, MEDIUM_LEN_MARKER};

use crate::byte_order::{read_network_u16, write_network_u16};

/// FIN flag in the first header byte.
pub const FIN_BIT: u8 = 0x80;
/// MASK flag in the second header byte.
pub const MASK_BIT: u8 = 0x80;
/// Opcode bits of the first header byte.
pub const OPCODE_BITS: u8 = 0x0F;
/// 7-bit length field of the second header byte.
pub const LENGTH_BITS: u8 = 0x7F;

/// Frame opcodes defined by RFC 6455 §5.2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation of a fragmented message.
    Continuation = 0x0,
    /// UTF-8 text message.
    Text = 0x1,
    /// Binary message.
    Binary = 0x2,
    /// Connection close.
    Close = 0x8,
    /// Keepalive request.
    Ping = 0x9,
    /// Keepalive response.
    Pong = 0xA,
}

impl Opcode {
    /// Raw 4-bit value.
    #[must_use]
    pub const fn as_u8(self) -> u8 { self as u8 }

    /// Close, Ping and Pong are control opcodes.
    #[must_use]
    pub const fn is_control(self) -> bool { self.as_u8() & 0x8 != 0 }
}

impl TryFrom<u8> for Opcode {
    type Error = FramingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            opcode => Err(FramingError::UnknownOpcode { opcode }),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Continuation => "continuation",
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Close => "close",
            Self::Ping => "ping",
            Self::Pong => "pong",
        };
        f.write_str(name)
    }
}

/// One decoded (or to-be-encoded) WebSocket frame.
///
/// Payloads are always stored unmasked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag. Frames produced by this crate always set it.
    pub fin: bool,
    /// Frame purpose.
    pub opcode: Opcode,
    /// Unmasked payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Build a final frame with the given opcode and payload.
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode,
            payload: payload.into(),
        }
    }

    /// Text frame.
    pub fn text(text: impl Into<String>) -> Self { Self::new(Opcode::Text, text.into()) }

    /// Binary frame.
    pub fn binary(data: impl Into<Bytes>) -> Self { Self::new(Opcode::Binary, data) }

    /// Ping frame.
    pub fn ping(data: impl Into<Bytes>) -> Self { Self::new(Opcode::Ping, data) }

    /// Pong frame, normally echoing a ping payload.
    pub fn pong(data: impl Into<Bytes>) -> Self { Self::new(Opcode::Pong, data) }

    /// Close frame carrying an optional status code and reason.
    #[must_use]
    pub fn close(close: Option<&CloseFrame>) -> Self {
        Self::new(Opcode::Close, close.map(CloseFrame::to_payload).unwrap_or_default())
    }
}

/// Close status codes used by the server (RFC 6455 §7.4.1).
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Endpoint going away, e.g. server shutdown.
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol violation.
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Message too big to process.
    pub const MESSAGE_TOO_BIG: u16 = 1009;
}

/// Structured view of a Close frame payload.
///
/// The codec treats Close payloads as opaque bytes; this helper exists for
/// callers that want to produce or log a status code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseFrame {
    /// Status code.
    pub code: u16,
    /// Human-readable reason, at most 123 bytes on the wire.
    pub reason: String,
}

impl CloseFrame {
    /// Create a close payload description.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Encode as `code (u16, big-endian) || reason`.
    ///
    /// Reasons longer than a control frame allows are cut at the last
    /// character boundary that fits.
    #[must_use]
    pub fn to_payload(&self) -> Bytes {
        const MAX_REASON_LEN: usize = MAX_SHORT_LEN as usize - 2;
        let mut end = self.reason.len().min(MAX_REASON_LEN);
        while !self.reason.is_char_boundary(end) {
            end -= 1;
        }
        let mut buf = BytesMut::with_capacity(2 + end);
        buf.put_slice(&write_network_u16(self.code));
        buf.put_slice(&self.reason.as_bytes()[..end]);
        buf.freeze()
    }

    /// Parse a Close payload. Returns `None` for empty or one-byte payloads.
    #[must_use]
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let (code, reason) = payload.split_first_chunk::<2>()?;
        Some(Self {
            code: read_network_u16(*code),
            reason: String::from_utf8_lossy(reason).into_owned(),
        })
    }
}

/// XOR `payload` with the 4-byte masking `key` (RFC 6455 §5.3).
///
/// Masking is its own inverse.
///
/// # Examples
///
/// ```
/// use wshub::frame::apply_mask;
///
/// let key = [0x37, 0xfa, 0x21, 0x3d];
/// let mut data = *b"Hello";
/// apply_mask(&mut data, key);
/// assert_eq!(data, [0x7f, 0x9f, 0x4d, 0x51, 0x58]);
/// apply_mask(&mut data, key);
/// assert_eq!(&data, b"Hello");
/// ```
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (byte, k) in payload.iter_mut().zip(key.iter().cycle()) {
        *byte ^= k;
    }
}
