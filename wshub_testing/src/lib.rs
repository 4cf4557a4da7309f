//! Utilities for driving a [`WebSocketServer`](wshub::WebSocketServer)
//! over real loopback sockets during tests.
//!
//! [`TestClient`] performs the client side of the upgrade handshake and
//! speaks masked frames through [`WebSocketCodec`](wshub::WebSocketCodec).
//!
//! ```rust,no_run
//! use wshub::WebSocketServer;
//! use wshub_testing::{TestClient, TestResult, loopback_config};
//!
//! # async fn example() -> TestResult {
//! let server = WebSocketServer::new(loopback_config());
//! let addr = server.start(0)?;
//! let mut client = TestClient::connect(addr).await?;
//! client.send_text("hello").await?;
//! server.stop().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod fixtures;

pub use client::{SAMPLE_ACCEPT, SAMPLE_KEY, TestClient, raw_exchange, upgrade_request};
pub use fixtures::{loopback_config, server, wait_until};

/// Result type used by integration tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
