//! Payload length tiers of the WebSocket frame header.

use bytes::BufMut;

use crate::byte_order::{write_network_u16, write_network_u64};

/// Largest payload length carried directly in the 7-bit field.
pub const MAX_SHORT_LEN: u8 = 125;
/// 7-bit marker announcing a 16-bit extended length.
pub const MEDIUM_LEN_MARKER: u8 = 126;
/// 7-bit marker announcing a 64-bit extended length.
pub const LONG_LEN_MARKER: u8 = 127;

/// Encoding chosen for a payload length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LengthTier {
    /// `0..=125`, stored in the second header byte.
    Short(u8),
    /// `126..=65535`, stored in two extra bytes.
    Medium(u16),
    /// Anything larger, stored in eight extra bytes.
    Long(u64),
}

impl LengthTier {
    /// Select the smallest tier able to carry `len`.
    ///
    /// # Examples
    ///
    /// ```
    /// use wshub::frame::LengthTier;
    ///
    /// assert_eq!(LengthTier::for_len(125), LengthTier::Short(125));
    /// assert_eq!(LengthTier::for_len(126), LengthTier::Medium(126));
    /// assert_eq!(LengthTier::for_len(65_536), LengthTier::Long(65_536));
    /// ```
    #[must_use]
    pub fn for_len(len: usize) -> Self {
        match (u8::try_from(len), u16::try_from(len)) {
            (Ok(short), _) if short <= MAX_SHORT_LEN => Self::Short(short),
            (_, Ok(medium)) => Self::Medium(medium),
            _ => Self::Long(len as u64),
        }
    }

    /// Number of bytes following the second header byte.
    #[must_use]
    pub const fn extended_len(self) -> usize {
        match self {
            Self::Short(_) => 0,
            Self::Medium(_) => 2,
            Self::Long(_) => 8,
        }
    }

    /// Write the 7-bit field (combined with `mask_bit`) and any extended
    /// length bytes.
    pub fn write(self, mask_bit: u8, dst: &mut impl BufMut) {
        match self {
            Self::Short(len) => dst.put_u8(mask_bit | len),
            Self::Medium(len) => {
                dst.put_u8(mask_bit | MEDIUM_LEN_MARKER);
                dst.put_slice(&write_network_u16(len));
            }
            Self::Long(len) => {
                dst.put_u8(mask_bit | LONG_LEN_MARKER);
                dst.put_slice(&write_network_u64(len));
            }
        }
    }
}
