//! Reasons a connection task ends abnormally.
//!
//! [`ConnectionError`] aggregates the handshake, codec and protocol
//! failures a single connection can hit. It never escapes the connection's
//! task: the server logs it and tears the connection down.

use thiserror::Error;

use crate::{
    frame::{CodecError, FramingError, close_code},
    handshake::HandshakeError,
};

/// Failure that ended one connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The upgrade handshake did not complete.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    /// Reading or writing frames failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// A Continuation frame arrived; fragmented messages are not supported.
    #[error("unexpected continuation frame")]
    UnexpectedContinuation,
}

impl ConnectionError {
    /// Close status code to report to the client before dropping it, if the
    /// failure is the client's fault.
    #[must_use]
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::Codec(CodecError::Framing(FramingError::OversizedFrame { .. })) => {
                Some(close_code::MESSAGE_TOO_BIG)
            }
            Self::Codec(CodecError::Framing(_)) | Self::UnexpectedContinuation => {
                Some(close_code::PROTOCOL_ERROR)
            }
            Self::Handshake(_) | Self::Codec(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ConnectionError::UnexpectedContinuation, Some(1002))]
    #[case(CodecError::from(FramingError::UnknownOpcode { opcode: 3 }).into(), Some(1002))]
    #[case(
        CodecError::from(FramingError::OversizedFrame { size: 10, max: 5 }).into(),
        Some(1009)
    )]
    #[case(CodecError::not_connected().into(), None)]
    #[case(HandshakeError::MissingKey.into(), None)]
    fn close_codes(#[case] err: ConnectionError, #[case] expected: Option<u16>) {
        assert_eq!(err.close_code(), expected);
    }
}
