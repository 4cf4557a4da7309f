//! Server fixtures for integration tests.

use std::{
    net::Ipv4Addr,
    time::{Duration, Instant},
};

use rstest::fixture;
use wshub::{ServerConfig, WebSocketServer};

/// Configuration binding the loopback interface.
#[fixture]
pub fn loopback_config() -> ServerConfig { ServerConfig::default().bind_ip(Ipv4Addr::LOCALHOST.into()) }

/// A stopped server that binds loopback when started.
#[fixture]
pub fn server() -> WebSocketServer { WebSocketServer::new(loopback_config()) }

/// Poll `condition` every few milliseconds until it holds or `limit` elapses.
///
/// Returns whether the condition was met.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
