//! Connection handling for [`WebSocketServer`](super::WebSocketServer).
//!
//! Each accepted socket runs [`process_stream`] on its own task: upgrade,
//! register, read frames until the client leaves or the connection is
//! cancelled, then unregister and notify.

use std::{net::SocketAddr, sync::Arc};

use futures::{FutureExt, Stream, StreamExt};
use log::error;
use tokio::{net::TcpStream, sync::OwnedSemaphorePermit, time::timeout};
use tokio_util::{
    codec::{Framed, FramedParts},
    sync::CancellationToken,
    task::TaskTracker,
};

use super::{Shared, close_gracefully};
use crate::{
    config::ServerConfig,
    connection::{Connection, ConnectionState},
    error::ConnectionError,
    frame::{CloseFrame, CodecError, Frame, Opcode, WebSocketCodec},
    handshake::{HandshakeError, Upgraded, perform_handshake},
    message::Message,
    metrics::{self, Direction, PanicSource},
    panic::format_panic,
};

/// Spawn a task to process a single TCP connection, logging and discarding any panics.
pub(super) fn spawn_connection_task(
    stream: TcpStream,
    peer_addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    permit: Option<OwnedSemaphorePermit>,
    tracker: &TaskTracker,
) {
    tracker.spawn(async move {
        let _permit = permit;
        let fut = std::panic::AssertUnwindSafe(process_stream(stream, peer_addr, shared, shutdown))
            .catch_unwind();

        if let Err(panic) = fut.await {
            metrics::inc_panics(PanicSource::Connection);
            let panic_msg = format_panic(&*panic);
            // Emit via both `log` and `tracing` for tests that capture either.
            error!("connection task panicked: panic={panic_msg}, peer_addr={peer_addr}");
            tracing::error!(panic = %panic_msg, %peer_addr, "connection task panicked");
        }
    });
}

/// Keeps a connection registered for as long as it is alive.
struct Registration<'a> {
    shared: &'a Shared,
    conn: Arc<Connection>,
}

impl<'a> Registration<'a> {
    fn new(shared: &'a Shared, conn: Arc<Connection>) -> Self {
        conn.set_state(ConnectionState::Open);
        shared.registry.insert(Arc::clone(&conn));
        metrics::inc_connections();
        Self { shared, conn }
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.shared.registry.remove(&self.conn.id());
        self.conn.set_state(ConnectionState::Closed);
        metrics::dec_connections();
    }
}

pub(super) async fn process_stream(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
) {
    let upgraded = tokio::select! {
        biased;

        () = shutdown.cancelled() => return,
        res = upgrade(&mut stream, &shared.config) => match res {
            Ok(upgraded) => upgraded,
            Err(e) => {
                metrics::inc_errors();
                tracing::debug!(%peer_addr, error = %e, "handshake failed");
                return;
            }
        },
    };

    let id = shared.next_connection_id();
    tracing::debug!(
        %id,
        %peer_addr,
        path = upgraded.request.target(),
        "client upgraded"
    );
    let mut parts = FramedParts::new::<Frame>(stream, WebSocketCodec::server(shared.config.payload_limit()));
    parts.read_buf = upgraded.leftover;
    let (sink, mut frames) = Framed::from_parts(parts).split();

    let conn = Arc::new(Connection::new(id, peer_addr, sink, shutdown));
    let registration = Registration::new(&shared, Arc::clone(&conn));
    shared.callbacks.connected(id);

    if let Err(e) = receive_loop(&shared, &conn, &mut frames).await {
        metrics::inc_errors();
        if let Some(code) = e.close_code() {
            tracing::warn!(%id, %peer_addr, error = %e, "closing client after protocol error");
            close_gracefully(&conn, &CloseFrame::new(code, e.to_string())).await;
        } else {
            tracing::debug!(%id, %peer_addr, error = %e, "connection failed");
        }
    }

    drop(registration);
    drop(conn);
    drop(frames);
    tracing::debug!(%id, %peer_addr, "client disconnected");
    shared.callbacks.disconnected(id);
}

async fn upgrade(stream: &mut TcpStream, config: &ServerConfig) -> Result<Upgraded, HandshakeError> {
    let handshake = perform_handshake(stream, config.handshake_limit());
    match config.handshake_deadline() {
        Some(limit) => timeout(limit, handshake)
            .await
            .unwrap_or(Err(HandshakeError::TimedOut(limit))),
        None => handshake.await,
    }
}

/// Read frames from an open connection until it closes.
///
/// Returns `Ok` when the client closes cleanly, hangs up between frames or
/// the connection is cancelled. Cancellation also abandons a message
/// handler that is still running.
async fn receive_loop<S>(
    shared: &Shared,
    conn: &Connection,
    frames: &mut S,
) -> Result<(), ConnectionError>
where
    S: Stream<Item = Result<Frame, CodecError>> + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;

            () = conn.shutdown_token().cancelled() => return Ok(()),
            next = frames.next() => next,
        };
        let Some(frame) = next.transpose()? else {
            return Ok(());
        };
        metrics::inc_frames(Direction::Inbound);
        conn.touch();

        match frame.opcode {
            Opcode::Text | Opcode::Binary => {
                let message = Message::new(conn.id(), frame.opcode, frame.payload);
                tokio::select! {
                    biased;

                    () = conn.shutdown_token().cancelled() => return Ok(()),
                    () = shared.deliver(message) => {}
                }
            }
            Opcode::Ping => conn.send_frame(Frame::pong(frame.payload)).await?,
            Opcode::Pong => {}
            Opcode::Close => {
                conn.set_state(ConnectionState::Closing);
                if let Some(close) = CloseFrame::parse(&frame.payload) {
                    tracing::debug!(id = %conn.id(), code = close.code, reason = %close.reason, "client sent close");
                }
                conn.send_close(frame.payload).await?;
                return Ok(());
            }
            Opcode::Continuation => return Err(ConnectionError::UnexpectedContinuation),
        }
    }
}
