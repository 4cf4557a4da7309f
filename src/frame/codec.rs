//! `tokio_util` codec for WebSocket frames.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{
    CodecError,
    EofError,
    FIN_BIT,
    Frame,
    FramingError,
    LENGTH_BITS,
    LONG_LEN_MARKER,
    LengthTier,
    MASK_BIT,
    MEDIUM_LEN_MARKER,
    OPCODE_BITS,
    Opcode,
    apply_mask,
};
use crate::byte_order::{read_network_u16, read_network_u64};

/// Default maximum inbound payload length (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Hard ceiling for the configurable inbound payload length (64 MiB).
///
/// A peer controls the declared length, so the decoder never reserves more
/// than this regardless of configuration.
pub const MAX_PAYLOAD_LEN_CEILING: usize = 64 * 1024 * 1024;

/// Largest possible header: 2 fixed bytes, 8 length bytes, 4 key bytes.
const MAX_HEADER_LEN: usize = 14;
const MASK_KEY_LEN: usize = 4;

/// Which end of the connection the codec speaks for.
///
/// Servers never mask outbound frames; clients always do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Server-to-client frames: unmasked.
    Server,
    /// Client-to-server frames: masked with a fresh random key.
    Client,
}

/// Frame codec implementing RFC 6455 §5.2 framing.
///
/// Decoding accepts masked and unmasked frames and always yields unmasked
/// payloads. Encoding always sets FIN, since outbound messages are never
/// fragmented.
#[derive(Clone, Debug)]
pub struct WebSocketCodec {
    role: Role,
    max_payload_len: usize,
}

impl WebSocketCodec {
    /// Codec for the server side of a connection.
    #[must_use]
    pub fn server(max_payload_len: usize) -> Self { Self::new(Role::Server, max_payload_len) }

    /// Codec for the client side of a connection.
    #[must_use]
    pub fn client(max_payload_len: usize) -> Self { Self::new(Role::Client, max_payload_len) }

    fn new(role: Role, max_payload_len: usize) -> Self {
        Self {
            role,
            max_payload_len: max_payload_len.min(MAX_PAYLOAD_LEN_CEILING),
        }
    }

    /// Role this codec encodes for.
    #[must_use]
    pub fn role(&self) -> Role { self.role }

    /// Largest inbound payload the decoder accepts.
    #[must_use]
    pub fn max_payload_len(&self) -> usize { self.max_payload_len }
}

impl Default for WebSocketCodec {
    fn default() -> Self { Self::server(DEFAULT_MAX_PAYLOAD_LEN) }
}

/// Parsed frame header.
#[derive(Debug)]
struct FrameHeader {
    fin: bool,
    opcode: Opcode,
    mask: Option<[u8; MASK_KEY_LEN]>,
    header_len: usize,
    payload_len: usize,
}

fn read_array<const N: usize>(src: &[u8], at: usize) -> Option<[u8; N]> {
    src.get(at..at + N)?.try_into().ok()
}

/// Number of header bytes implied by the fixed bytes seen so far.
fn required_header_len(src: &[u8]) -> usize {
    let Some(&second) = src.get(1) else {
        return 2;
    };
    let extended = match second & LENGTH_BITS {
        MEDIUM_LEN_MARKER => 2,
        LONG_LEN_MARKER => 8,
        _ => 0,
    };
    let mask = if second & MASK_BIT == 0 { 0 } else { MASK_KEY_LEN };
    2 + extended + mask
}

/// Parse a header from the front of `src` without consuming it.
///
/// Returns `Ok(None)` while the header is incomplete.
fn parse_header(src: &[u8], max_payload_len: usize) -> Result<Option<FrameHeader>, CodecError> {
    let (Some(&first), Some(&second)) = (src.first(), src.get(1)) else {
        return Ok(None);
    };
    let fin = first & FIN_BIT != 0;
    let opcode = Opcode::try_from(first & OPCODE_BITS)?;

    let (declared, mut offset) = match second & LENGTH_BITS {
        MEDIUM_LEN_MARKER => {
            let Some(bytes) = read_array::<2>(src, 2) else {
                return Ok(None);
            };
            (u64::from(read_network_u16(bytes)), 4)
        }
        LONG_LEN_MARKER => {
            let Some(bytes) = read_array::<8>(src, 2) else {
                return Ok(None);
            };
            let length = read_network_u64(bytes);
            if length >> 63 != 0 {
                return Err(FramingError::InvalidLength { length }.into());
            }
            (length, 10)
        }
        short => (u64::from(short), 2),
    };

    let payload_len = usize::try_from(declared)
        .ok()
        .filter(|len| *len <= max_payload_len)
        .ok_or(FramingError::OversizedFrame {
            size: declared,
            max: max_payload_len,
        })?;

    let mask = if second & MASK_BIT == 0 {
        None
    } else {
        let Some(key) = read_array::<MASK_KEY_LEN>(src, offset) else {
            return Ok(None);
        };
        offset += MASK_KEY_LEN;
        Some(key)
    };

    Ok(Some(FrameHeader {
        fin,
        opcode,
        mask,
        header_len: offset,
        payload_len,
    }))
}

/// Describe where in a frame the stream ended.
fn build_eof_error(src: &BytesMut) -> CodecError {
    match parse_header(src, usize::MAX) {
        Ok(Some(header)) => EofError::MidFrame {
            bytes_received: src.len().saturating_sub(header.header_len),
            expected: header.payload_len,
        }
        .into(),
        Ok(None) => EofError::MidHeader {
            bytes_received: src.len(),
            header_size: required_header_len(src),
        }
        .into(),
        Err(e) => e,
    }
}

impl Decoder for WebSocketCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(header) = parse_header(src, self.max_payload_len)? else {
            return Ok(None);
        };
        let frame_len = header.header_len + header.payload_len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut payload = src.split_to(frame_len);
        payload.advance(header.header_len);
        if let Some(key) = header.mask {
            apply_mask(&mut payload, key);
        }

        Ok(Some(Frame {
            fin: header.fin,
            opcode: header.opcode,
            payload: payload.freeze(),
        }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            // Clean close: the stream ended on a frame boundary.
            None if src.is_empty() => Ok(None),
            None => Err(build_eof_error(src)),
        }
    }
}

impl Encoder<Frame> for WebSocketCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = frame.payload.len();
        dst.reserve(MAX_HEADER_LEN + len);
        dst.put_u8(FIN_BIT | frame.opcode.as_u8());

        match self.role {
            Role::Server => {
                LengthTier::for_len(len).write(0, dst);
                dst.put_slice(&frame.payload);
            }
            Role::Client => {
                let key: [u8; MASK_KEY_LEN] = rand::random();
                LengthTier::for_len(len).write(MASK_BIT, dst);
                dst.put_slice(&key);
                let start = dst.len();
                dst.put_slice(&frame.payload);
                apply_mask(&mut dst[start..], key);
            }
        }
        Ok(())
    }
}
