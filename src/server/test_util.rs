//! Test helpers shared across server modules.

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use rstest::fixture;
use tokio::net::TcpListener;

use super::Shared;
use crate::config::ServerConfig;

pub const SAMPLE_REQUEST: &[u8] = b"GET /chat HTTP/1.1\r\nHost: localhost\r\nUpgrade: \
    websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";

#[fixture]
pub fn shared() -> Arc<Shared> { Arc::new(Shared::new(ServerConfig::default())) }

/// Bind a Tokio listener on an ephemeral loopback port.
pub async fn loopback_listener() -> (Arc<TcpListener>, SocketAddr) {
    let listener = TcpListener::bind(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0))
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().expect("listener address");
    (Arc::new(listener), addr)
}
