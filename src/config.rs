//! Server configuration.
//!
//! [`ServerConfig`] collects the tunables of a [`WebSocketServer`]. Setters
//! consume and return the config so it can be built in one expression;
//! out-of-range values are clamped rather than rejected.
//!
//! [`WebSocketServer`]: crate::server::WebSocketServer

use std::{
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

use crate::{
    frame::{DEFAULT_MAX_PAYLOAD_LEN, MAX_PAYLOAD_LEN_CEILING, MAX_SHORT_LEN},
    handshake::DEFAULT_MAX_HANDSHAKE_LEN,
    server::BackoffConfig,
};

const MIN_HANDSHAKE_LEN: usize = 256;
const MAX_HANDSHAKE_LEN: usize = 64 * 1024;
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Tunables for a [`WebSocketServer`](crate::server::WebSocketServer).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use wshub::config::ServerConfig;
///
/// let config = ServerConfig::default()
///     .max_payload_len(1024 * 1024)
///     .handshake_timeout(Some(Duration::from_secs(2)))
///     .max_connections(Some(500));
/// assert_eq!(config.payload_limit(), 1024 * 1024);
/// assert_eq!(config.connection_limit(), Some(500));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    bind_ip: IpAddr,
    max_payload_len: usize,
    max_handshake_len: usize,
    handshake_timeout: Option<Duration>,
    max_connections: Option<usize>,
    message_queue_capacity: usize,
    backoff: BackoffConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            max_handshake_len: DEFAULT_MAX_HANDSHAKE_LEN,
            handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            max_connections: None,
            message_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Address `start(port)` binds to. Defaults to `0.0.0.0`.
    #[must_use]
    pub fn bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Largest inbound payload accepted, clamped to `[125 B, 64 MiB]`.
    /// Frames declaring more are rejected with close code 1009.
    #[must_use]
    pub fn max_payload_len(mut self, len: usize) -> Self {
        self.max_payload_len = len.clamp(usize::from(MAX_SHORT_LEN), MAX_PAYLOAD_LEN_CEILING);
        self
    }

    /// Largest upgrade request head, clamped to `[256 B, 64 KiB]`.
    #[must_use]
    pub fn max_handshake_len(mut self, len: usize) -> Self {
        self.max_handshake_len = len.clamp(MIN_HANDSHAKE_LEN, MAX_HANDSHAKE_LEN);
        self
    }

    /// Deadline for a client to complete the upgrade; `None` waits forever.
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Cap on concurrently accepted sockets; `None` is unbounded.
    ///
    /// Sockets accepted beyond the cap are closed immediately. A cap of
    /// zero is raised to one.
    #[must_use]
    pub fn max_connections(mut self, limit: Option<usize>) -> Self {
        self.max_connections = limit.map(|n| n.max(1));
        self
    }

    /// Capacity of the polling queue used when no message callback is set.
    #[must_use]
    pub fn message_queue_capacity(mut self, capacity: usize) -> Self {
        self.message_queue_capacity = capacity.max(1);
        self
    }

    /// Accept-loop retry timing, normalized on assignment.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff.normalized();
        self
    }

    /// Configured bind address.
    #[must_use]
    pub const fn ip(&self) -> IpAddr { self.bind_ip }

    /// Configured inbound payload limit.
    #[must_use]
    pub const fn payload_limit(&self) -> usize { self.max_payload_len }

    /// Configured handshake size limit.
    #[must_use]
    pub const fn handshake_limit(&self) -> usize { self.max_handshake_len }

    /// Configured handshake deadline.
    #[must_use]
    pub const fn handshake_deadline(&self) -> Option<Duration> { self.handshake_timeout }

    /// Configured connection cap.
    #[must_use]
    pub const fn connection_limit(&self) -> Option<usize> { self.max_connections }

    /// Configured polling queue capacity.
    #[must_use]
    pub const fn queue_capacity(&self) -> usize { self.message_queue_capacity }

    /// Configured back-off timing.
    #[must_use]
    pub const fn backoff_config(&self) -> BackoffConfig { self.backoff }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(cfg.payload_limit(), 16 * 1024 * 1024);
        assert_eq!(cfg.handshake_limit(), 8192);
        assert_eq!(cfg.handshake_deadline(), Some(Duration::from_secs(10)));
        assert_eq!(cfg.connection_limit(), None);
        assert_eq!(cfg.queue_capacity(), 1024);
    }

    #[rstest]
    #[case(0, 125)]
    #[case(4096, 4096)]
    #[case(usize::MAX, 64 * 1024 * 1024)]
    fn payload_limit_is_clamped(#[case] requested: usize, #[case] expected: usize) {
        let cfg = ServerConfig::default().max_payload_len(requested);
        assert_eq!(cfg.payload_limit(), expected);
    }

    #[rstest]
    #[case(1, 256)]
    #[case(4096, 4096)]
    #[case(1 << 20, 64 * 1024)]
    fn handshake_limit_is_clamped(#[case] requested: usize, #[case] expected: usize) {
        let cfg = ServerConfig::default().max_handshake_len(requested);
        assert_eq!(cfg.handshake_limit(), expected);
    }

    #[test]
    fn zero_caps_are_raised() {
        let cfg = ServerConfig::default()
            .max_connections(Some(0))
            .message_queue_capacity(0);
        assert_eq!(cfg.connection_limit(), Some(1));
        assert_eq!(cfg.queue_capacity(), 1);
    }

    #[test]
    fn backoff_is_normalized() {
        let cfg = ServerConfig::default().backoff(BackoffConfig {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::ZERO,
        });
        let backoff = cfg.backoff_config();
        assert_eq!(backoff.initial_delay, Duration::from_millis(1));
        assert_eq!(backoff.max_delay, Duration::from_millis(50));
    }
}
