#![doc(html_root_url = "https://docs.rs/wshub/latest")]
//! Public API for the `wshub` library.
//!
//! An RFC 6455 WebSocket server engine: a Tokio listener that performs the
//! HTTP upgrade handshake, encodes and decodes frames, and keeps a registry
//! of live clients for unicast sends, broadcasts and graceful closes.

pub mod byte_order;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod message;
pub mod metrics;
pub mod panic;
pub mod registry;
pub mod server;

pub use config::ServerConfig;
pub use connection::{ClientInfo, ConnectionState};
pub use error::ConnectionError;
pub use frame::{CloseFrame, CodecError, Frame, Opcode, WebSocketCodec};
pub use handshake::{HandshakeError, compute_accept_key};
pub use message::Message;
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED, PANICS_TOTAL};
pub use registry::{ClientRegistry, ConnectionId};
pub use server::{ServerError, ServerHandle, WebSocketServer};
