//! Network byte-order helpers for WebSocket length fields and close codes.
//!
//! RFC 6455 transmits every multi-byte integer most significant byte first.
//! Keeping the conversions here scopes the lint allowances to one place.

/// Serialise a `u16` in network byte order.
///
/// # Examples
///
/// ```
/// use wshub::byte_order::write_network_u16;
///
/// assert_eq!(write_network_u16(1000), [0x03, 0xE8]);
/// ```
#[must_use]
pub fn write_network_u16(value: u16) -> [u8; 2] {
    #[allow(
        clippy::big_endian_bytes,
        reason = "WebSocket lengths and close codes are big-endian on the wire."
    )]
    value.to_be_bytes()
}

/// Parse a network-order `u16`.
///
/// # Examples
///
/// ```
/// use wshub::byte_order::read_network_u16;
///
/// assert_eq!(read_network_u16([0xFF, 0xFF]), 65_535);
/// ```
#[must_use]
pub fn read_network_u16(bytes: [u8; 2]) -> u16 {
    #[allow(
        clippy::big_endian_bytes,
        reason = "WebSocket lengths and close codes are big-endian on the wire."
    )]
    u16::from_be_bytes(bytes)
}

/// Serialise a `u64` in network byte order.
#[must_use]
pub fn write_network_u64(value: u64) -> [u8; 8] {
    #[allow(
        clippy::big_endian_bytes,
        reason = "WebSocket 64-bit lengths are big-endian on the wire."
    )]
    value.to_be_bytes()
}

/// Parse a network-order `u64`.
#[must_use]
pub fn read_network_u64(bytes: [u8; 8]) -> u64 {
    #[allow(
        clippy::big_endian_bytes,
        reason = "WebSocket 64-bit lengths are big-endian on the wire."
    )]
    u64::from_be_bytes(bytes)
}
