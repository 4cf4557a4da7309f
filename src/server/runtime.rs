//! Runtime control for [`WebSocketServer`].

mod accept;
mod backoff;

use std::{io, net::SocketAddr, sync::Arc};

pub(super) use accept::{AcceptLoopOptions, accept_loop};
pub use backoff::BackoffConfig;
use futures::future::join_all;
use log::{debug, info};
use tokio::{
    net::{TcpListener, TcpSocket},
    sync::Semaphore,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Running, ServerError, WebSocketServer, close_gracefully};
use crate::frame::{CloseFrame, close_code};

const LISTEN_BACKLOG: u32 = 1024;

/// Bind `addr` with `SO_REUSEADDR` so a restarted server can reclaim a port
/// whose previous sockets linger in `TIME_WAIT`.
fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

impl WebSocketServer {
    /// Bind the configured address on `port` and start accepting clients.
    ///
    /// Port `0` picks an ephemeral port; the bound address is returned.
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AlreadyRunning`] if the server is running and
    /// [`ServerError::Bind`] if the socket cannot be bound. Nothing is
    /// left running on failure.
    pub fn start(&self, port: u16) -> Result<SocketAddr, ServerError> {
        self.start_on(SocketAddr::new(self.config().ip(), port))
    }

    /// Bind an explicit socket address and start accepting clients.
    ///
    /// # Errors
    ///
    /// Same as [`WebSocketServer::start`].
    pub fn start_on(&self, addr: SocketAddr) -> Result<SocketAddr, ServerError> {
        let mut running = self.lock_running();
        if running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }
        let listener = bind_listener(addr).map_err(ServerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ServerError::Bind)?;

        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let config = self.config();
        tracker.spawn(accept_loop(
            Arc::new(listener),
            Arc::clone(&self.handle.shared),
            AcceptLoopOptions {
                shutdown: shutdown.clone(),
                tracker: tracker.clone(),
                backoff: config.backoff_config(),
                limit: config
                    .connection_limit()
                    .map(|n| Arc::new(Semaphore::new(n))),
            },
        ));
        self.handle.shared.running.send_replace(true);
        info!("websocket server listening: local_addr={local_addr}");
        *running = Some(Running {
            shutdown,
            tracker,
            local_addr,
        });
        Ok(local_addr)
    }

    /// Stop accepting, close every client and wait for all tasks to finish.
    ///
    /// Clients receive a Close frame with status 1001 (going away) before
    /// their connections are dropped; message handlers still running are
    /// abandoned. Calling `stop` on a stopped server does nothing.
    pub async fn stop(&self) {
        let Some(Running {
            shutdown,
            tracker,
            local_addr,
        }) = self.lock_running().take()
        else {
            return;
        };

        let going_away = CloseFrame::new(close_code::GOING_AWAY, "server shutting down");
        let clients = self.handle.shared.registry.snapshot();
        debug!(
            "stopping websocket server: local_addr={local_addr}, clients={}",
            clients.len()
        );
        join_all(clients.iter().map(|conn| close_gracefully(conn, &going_away))).await;

        shutdown.cancel();
        tracker.close();
        tracker.wait().await;
        self.handle.shared.running.send_replace(false);
        info!("websocket server stopped: local_addr={local_addr}");
    }
}
