//! Tokio-based WebSocket server.
//!
//! [`WebSocketServer`] binds a listener, upgrades each accepted socket and
//! keeps a registry of live clients. Messages reach the application
//! through [`WebSocketServer::on_message`] or, when no handler is set, a
//! bounded polling queue. [`ServerHandle`] is the cloneable send side used
//! from inside callbacks.

mod callbacks;
mod connection;
mod error;
mod runtime;
#[cfg(test)]
mod test_util;

use std::{
    future::Future,
    net::SocketAddr,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
pub use callbacks::{LifecycleHandler, MessageHandler};
use futures::future::{BoxFuture, join_all};
use log::{debug, warn};
pub use error::ServerError;
pub use runtime::BackoffConfig;
use tokio::{
    sync::{Mutex as AsyncMutex, mpsc, watch},
    time::timeout,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use self::callbacks::Callbacks;
use crate::{
    config::ServerConfig,
    connection::{ClientInfo, Connection},
    frame::{CloseFrame, Frame, Opcode, close_code},
    message::Message,
    metrics,
    registry::{ClientRegistry, ConnectionId},
};

/// Upper bound on writing a Close frame before a connection is dropped.
const CLOSE_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// State shared by the server, its handles and every connection task.
pub(crate) struct Shared {
    config: ServerConfig,
    registry: ClientRegistry,
    callbacks: Callbacks,
    next_id: AtomicU64,
    queue_tx: mpsc::Sender<Message>,
    queue_rx: AsyncMutex<mpsc::Receiver<Message>>,
    // `true` between `start` and the end of `stop`.
    running: watch::Sender<bool>,
}

impl Shared {
    fn new(config: ServerConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity());
        let (running, _) = watch::channel(false);
        Self {
            config,
            registry: ClientRegistry::new(),
            callbacks: Callbacks::default(),
            next_id: AtomicU64::new(1),
            queue_tx,
            queue_rx: AsyncMutex::new(queue_rx),
            running,
        }
    }

    fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Hand a received message to the application.
    async fn deliver(&self, message: Message) {
        let Some(message) = self.callbacks.message(message).await else {
            return;
        };
        if let Err(mpsc::error::TrySendError::Full(message)) = self.queue_tx.try_send(message) {
            metrics::inc_errors();
            warn!(
                "message queue full; dropping message: id={}, len={}",
                message.client_id,
                message.payload.len()
            );
        }
    }
}

/// Cloneable send side of a [`WebSocketServer`].
///
/// Handles stay usable after the server stops; every send then reports
/// failure because the registry is empty.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    /// Send a Text frame to client `id`.
    ///
    /// Returns `false` if `id` is not registered or the write fails.
    pub async fn send(&self, id: ConnectionId, text: &str) -> bool {
        self.send_frame(id, Opcode::Text, text.to_owned()).await
    }

    /// Send a Binary frame to client `id`.
    pub async fn send_binary(&self, id: ConnectionId, data: impl Into<Bytes>) -> bool {
        self.send_frame(id, Opcode::Binary, data).await
    }

    /// Send a single frame with an arbitrary opcode to client `id`.
    ///
    /// A failed write forces the connection closed.
    pub async fn send_frame(&self, id: ConnectionId, opcode: Opcode, payload: impl Into<Bytes>) -> bool {
        let Some(conn) = self.shared.registry.get(&id) else {
            return false;
        };
        match conn.send_frame(Frame::new(opcode, payload)).await {
            Ok(()) => true,
            Err(e) => {
                metrics::inc_errors();
                debug!("send failed: id={id}, error={e}");
                conn.close();
                false
            }
        }
    }

    /// Send a Text frame to every registered client.
    ///
    /// Returns how many clients the frame was written to. A failing client
    /// does not stop delivery to the others.
    pub async fn broadcast(&self, text: &str) -> usize {
        self.broadcast_frame(Frame::text(text)).await
    }

    /// Send a Binary frame to every registered client.
    pub async fn broadcast_binary(&self, data: impl Into<Bytes>) -> usize {
        self.broadcast_frame(Frame::binary(data)).await
    }

    async fn broadcast_frame(&self, frame: Frame) -> usize {
        let targets = self.shared.registry.snapshot();
        let sends = targets.iter().map(|conn| {
            let frame = frame.clone();
            async move {
                let result = conn.send_frame(frame).await;
                if let Err(e) = &result {
                    metrics::inc_errors();
                    debug!("broadcast send failed: id={}, error={e}", conn.id());
                }
                result.is_ok()
            }
        });
        join_all(sends).await.into_iter().filter(|sent| *sent).count()
    }

    /// Close client `id` with status 1000 (normal closure).
    ///
    /// Returns `false` if `id` is not registered.
    pub async fn close_client(&self, id: ConnectionId) -> bool {
        self.close_client_with(id, close_code::NORMAL, "").await
    }

    /// Close client `id` with the given status code and reason.
    ///
    /// The Close frame is best effort; the client is unregistered and its
    /// task stopped whether or not the write succeeds.
    pub async fn close_client_with(&self, id: ConnectionId, code: u16, reason: &str) -> bool {
        let Some(conn) = self.shared.registry.get(&id) else {
            return false;
        };
        close_gracefully(&conn, &CloseFrame::new(code, reason)).await;
        self.shared.registry.remove(&id);
        true
    }

    /// Number of registered clients.
    #[must_use]
    pub fn client_count(&self) -> usize { self.shared.registry.len() }

    /// Registered client ids in ascending order.
    #[must_use]
    pub fn client_ids(&self) -> Vec<ConnectionId> { self.shared.registry.ids() }

    /// Snapshot of client `id`, if registered.
    #[must_use]
    pub fn client_info(&self, id: ConnectionId) -> Option<ClientInfo> {
        self.shared.registry.get(&id).map(|conn| conn.info())
    }

    /// Snapshots of every registered client.
    #[must_use]
    pub fn clients(&self) -> Vec<ClientInfo> {
        let mut infos: Vec<_> = self
            .shared
            .registry
            .snapshot()
            .iter()
            .map(|conn| conn.info())
            .collect();
        infos.sort_unstable_by_key(|info| info.id);
        infos
    }
}

/// Best-effort Close frame followed by a forced close.
async fn close_gracefully(conn: &Connection, close: &CloseFrame) {
    match timeout(CLOSE_WRITE_TIMEOUT, conn.send_close(close.to_payload())).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("close frame not delivered: id={}, error={e}", conn.id()),
        Err(_) => debug!("close frame timed out: id={}", conn.id()),
    }
    conn.close();
}

struct Running {
    shutdown: CancellationToken,
    tracker: TaskTracker,
    local_addr: SocketAddr,
}

/// An RFC 6455 WebSocket server.
///
/// Several servers may coexist in one process; each owns its listener,
/// registry and tasks. Dropping a running server cancels its tasks without
/// waiting for them; call [`WebSocketServer::stop`] for an orderly
/// shutdown.
///
/// # Examples
///
/// ```no_run
/// use wshub::server::WebSocketServer;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), wshub::server::ServerError> {
/// let server = WebSocketServer::default();
/// let handle = server.handle();
/// server.on_message(move |msg| {
///     let handle = handle.clone();
///     async move {
///         handle.send(msg.client_id, &msg.text()).await;
///     }
/// });
/// server.start(9001)?;
/// tokio::signal::ctrl_c().await.ok();
/// server.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct WebSocketServer {
    handle: ServerHandle,
    running: Mutex<Option<Running>>,
}

impl Default for WebSocketServer {
    fn default() -> Self { Self::new(ServerConfig::default()) }
}

impl WebSocketServer {
    /// Create a stopped server.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            handle: ServerHandle {
                shared: Arc::new(Shared::new(config)),
            },
            running: Mutex::new(None),
        }
    }

    /// Configuration the server was created with.
    #[must_use]
    pub fn config(&self) -> &ServerConfig { &self.handle.shared.config }

    /// Cloneable send side, usable from callbacks and other tasks.
    #[must_use]
    pub fn handle(&self) -> ServerHandle { self.handle.clone() }

    /// Whether the server is accepting connections.
    #[must_use]
    pub fn is_running(&self) -> bool { self.lock_running().is_some() }

    /// Address the listener is bound to while running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock_running().as_ref().map(|running| running.local_addr)
    }

    /// Port the listener is bound to while running.
    #[must_use]
    pub fn port(&self) -> Option<u16> { self.local_addr().map(|addr| addr.port()) }

    /// Set the handler awaited for each Text or Binary message.
    ///
    /// Messages of one connection are handled in order; the next frame of
    /// that connection is read once the returned future completes. Without
    /// a handler messages go to the polling queue.
    pub fn on_message<F, Fut>(&self, handler: F)
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handle
            .shared
            .callbacks
            .set_message(Arc::new(move |msg| -> BoxFuture<'static, ()> { Box::pin(handler(msg)) }));
    }

    /// Set the handler called after a client is registered.
    pub fn on_connect<F>(&self, handler: F)
    where
        F: Fn(ConnectionId) + Send + Sync + 'static,
    {
        self.handle.shared.callbacks.set_connect(Arc::new(handler));
    }

    /// Set the handler called once a client has been unregistered.
    pub fn on_disconnect<F>(&self, handler: F)
    where
        F: Fn(ConnectionId) + Send + Sync + 'static,
    {
        self.handle.shared.callbacks.set_disconnect(Arc::new(handler));
    }

    /// Wait for the next queued message.
    ///
    /// Only messages received while no `on_message` handler is set are
    /// queued. Returns `None` once the server is stopped and the queue is
    /// drained, including for callers already waiting when `stop` runs.
    pub async fn next_message(&self) -> Option<Message> {
        let shared = &self.handle.shared;
        let mut queue = shared.queue_rx.lock().await;
        let mut running = shared.running.subscribe();
        loop {
            if let Ok(message) = queue.try_recv() {
                return Some(message);
            }
            if !*running.borrow_and_update() {
                return None;
            }
            tokio::select! {
                message = queue.recv() => return message,
                changed = running.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    /// Take a queued message without waiting.
    #[must_use]
    pub fn try_next_message(&self) -> Option<Message> {
        self.handle.shared.queue_rx.try_lock().ok()?.try_recv().ok()
    }

    /// See [`ServerHandle::send`].
    pub async fn send(&self, id: ConnectionId, text: &str) -> bool { self.handle.send(id, text).await }

    /// See [`ServerHandle::send_binary`].
    pub async fn send_binary(&self, id: ConnectionId, data: impl Into<Bytes>) -> bool {
        self.handle.send_binary(id, data).await
    }

    /// See [`ServerHandle::broadcast`].
    pub async fn broadcast(&self, text: &str) -> usize { self.handle.broadcast(text).await }

    /// See [`ServerHandle::close_client`].
    pub async fn close_client(&self, id: ConnectionId) -> bool { self.handle.close_client(id).await }

    /// See [`ServerHandle::client_count`].
    #[must_use]
    pub fn client_count(&self) -> usize { self.handle.client_count() }

    /// See [`ServerHandle::client_info`].
    #[must_use]
    pub fn client_info(&self, id: ConnectionId) -> Option<ClientInfo> { self.handle.client_info(id) }

    /// See [`ServerHandle::clients`].
    #[must_use]
    pub fn clients(&self) -> Vec<ClientInfo> { self.handle.clients() }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for WebSocketServer {
    fn drop(&mut self) {
        let running = self.running.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = running.take() {
            running.shutdown.cancel();
        }
    }
}
