//! Errors raised by [`WebSocketServer`](super::WebSocketServer) operations.

use std::io;

use thiserror::Error;

/// Reasons `start` can fail. The server is left stopped in every case.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Creating, binding or listening on the socket failed.
    #[error("bind error: {0}")]
    Bind(#[source] io::Error),
    /// `start` was called on a server that is already running.
    #[error("server is already running")]
    AlreadyRunning,
}
