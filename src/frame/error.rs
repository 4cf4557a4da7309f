//! Error types for the WebSocket frame codec.
//!
//! # Error Categories
//!
//! - [`FramingError`]: the header bytes describe a frame this server will not accept (unknown
//!   opcode, impossible or oversized length).
//! - [`EofError`]: the peer closed the stream part-way through a frame.
//! - [`CodecError`]: top-level enum wrapping both categories plus transport failures.
//!
//! Every variant is fatal to the connection that produced it and to no other.

use std::io;

use thiserror::Error;

/// Wire-level problems detected while parsing a frame header.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The low nibble of the first header byte is not a defined opcode.
    #[error("unknown opcode: {opcode:#x}")]
    UnknownOpcode {
        /// Raw 4-bit opcode value.
        opcode: u8,
    },

    /// A 64-bit extended length with its most significant bit set.
    #[error("invalid 64-bit payload length: {length:#x}")]
    InvalidLength {
        /// Declared length as read from the wire.
        length: u64,
    },

    /// Declared payload length exceeds the configured maximum.
    #[error("frame payload exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Declared payload length.
        size: u64,
        /// Maximum accepted payload length.
        max: usize,
    },
}

/// Premature end of stream inside a frame.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// The stream ended before the frame header was complete.
    #[error("premature EOF during header: {bytes_received} of {header_size} header bytes")]
    MidHeader {
        /// Header bytes received before EOF.
        bytes_received: usize,
        /// Header size required by the bytes seen so far.
        header_size: usize,
    },

    /// The header was complete but the payload was truncated.
    #[error("premature EOF: {bytes_received} bytes of {expected} byte payload received")]
    MidFrame {
        /// Payload bytes received before EOF.
        bytes_received: usize,
        /// Declared payload length.
        expected: usize,
    },
}

/// Errors produced while decoding or encoding WebSocket frames.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Malformed frame header.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Stream closed mid-frame.
    #[error("eof error: {0}")]
    Eof(#[from] EofError),

    /// Underlying transport failure.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Error reported for writes to a connection that is no longer open.
    #[must_use]
    pub fn not_connected() -> Self { Self::Io(io::Error::from(io::ErrorKind::NotConnected)) }

    /// Returns `true` when the peer violated the framing rules, as opposed to
    /// the transport failing underneath a well-formed stream.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool { matches!(self, Self::Framing(_)) }
}
