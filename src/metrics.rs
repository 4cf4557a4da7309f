//! Metric helpers for `wshub`.
//!
//! Names and helpers wrapping the [`metrics`](https://docs.rs/metrics) crate.
//! Without the `metrics` feature every helper is a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Gauge tracking registered (post-handshake) connections.
pub const CONNECTIONS_ACTIVE: &str = "wshub_connections_active";
/// Counter tracking frames read from or written to clients.
pub const FRAMES_PROCESSED: &str = "wshub_frames_processed_total";
/// Counter tracking handshake, codec and delivery failures.
pub const ERRORS_TOTAL: &str = "wshub_errors_total";
/// Counter tracking panics caught in connection tasks and callbacks.
pub const PANICS_TOTAL: &str = "wshub_panics_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Frames received from a client.
    Inbound,
    /// Frames sent to a client.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Where a caught panic originated.
#[derive(Clone, Copy, Debug)]
pub enum PanicSource {
    /// The connection task itself.
    Connection,
    /// A user-supplied callback.
    Callback,
}

impl PanicSource {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            PanicSource::Connection => "connection",
            PanicSource::Callback => "callback",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a processed frame for the given direction.
#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
}

/// Record an error occurrence.
pub fn inc_errors() {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL).increment(1);
}

/// Record a caught panic.
#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn inc_panics(source: PanicSource) {
    #[cfg(feature = "metrics")]
    counter!(PANICS_TOTAL, "source" => source.as_str()).increment(1);
}
