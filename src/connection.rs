//! Per-client connection state and its serialized writer.
//!
//! A [`Connection`] is created once the upgrade handshake succeeds. The
//! receive loop owns the read half of the stream; the write half lives
//! behind an async mutex here so replies from the loop, unicast sends and
//! broadcasts never interleave bytes of different frames.

use std::{
    fmt,
    net::SocketAddr,
    pin::Pin,
    sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering},
    time::{Duration, Instant},
};

use bytes::Bytes;
use futures::{Sink, SinkExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    frame::{CodecError, Frame, Opcode},
    metrics::{self, Direction},
    registry::ConnectionId,
};

/// Boxed frame sink used as a connection's write half.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = CodecError> + Send>>;

/// Lifecycle of a connection.
///
/// `Closed` is terminal: once reached the state never changes again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Upgrade request not yet answered.
    Handshaking = 0,
    /// Registered and exchanging frames.
    Open = 1,
    /// A Close frame was received or teardown has begun.
    Closing = 2,
    /// Unregistered; the transport is released or about to be.
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Handshaking,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Read-only snapshot of a registered client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientInfo {
    /// Identifier assigned at accept time.
    pub id: ConnectionId,
    /// Remote address and port.
    pub peer_addr: SocketAddr,
    /// When the handshake completed.
    pub connected_at: Instant,
    /// Last time a frame was received from the client.
    pub last_activity: Instant,
}

/// A live, handshaken client connection.
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    connected_at: Instant,
    // Milliseconds since `connected_at`.
    last_activity: AtomicU64,
    state: AtomicU8,
    close_sent: AtomicBool,
    writer: Mutex<FrameSink>,
    shutdown: CancellationToken,
}

impl Connection {
    /// Wrap the write half of an upgraded stream.
    ///
    /// The connection starts in [`ConnectionState::Handshaking`]; callers
    /// move it to `Open` once it is registered. Cancelling `shutdown`
    /// stops the receive loop and fails any pending send.
    pub fn new<S>(id: ConnectionId, peer_addr: SocketAddr, sink: S, shutdown: CancellationToken) -> Self
    where
        S: Sink<Frame, Error = CodecError> + Send + 'static,
    {
        Self {
            id,
            peer_addr,
            connected_at: Instant::now(),
            last_activity: AtomicU64::new(0),
            state: AtomicU8::new(ConnectionState::Handshaking as u8),
            close_sent: AtomicBool::new(false),
            writer: Mutex::new(Box::pin(sink)),
            shutdown,
        }
    }

    /// Identifier of this connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.id }

    /// Remote address of the client.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr { self.peer_addr }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `next` unless the connection is already closed.
    pub fn set_state(&self, next: ConnectionState) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != ConnectionState::Closed as u8).then_some(next as u8)
            });
    }

    /// Whether the connection reached its terminal state.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.state() == ConnectionState::Closed }

    /// Record inbound activity.
    pub fn touch(&self) {
        let elapsed = u64::try_from(self.connected_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_activity.fetch_max(elapsed, Ordering::Relaxed);
    }

    /// Snapshot the client's identity and activity timestamps.
    #[must_use]
    pub fn info(&self) -> ClientInfo {
        let since_connect = Duration::from_millis(self.last_activity.load(Ordering::Relaxed));
        ClientInfo {
            id: self.id,
            peer_addr: self.peer_addr,
            connected_at: self.connected_at,
            last_activity: self.connected_at + since_connect,
        }
    }

    /// Token cancelled when the connection is forced closed.
    #[must_use]
    pub fn shutdown_token(&self) -> &CancellationToken { &self.shutdown }

    /// Force the connection closed.
    ///
    /// The receive loop observes the cancellation, unregisters the client
    /// and fires the disconnect callback.
    pub fn close(&self) { self.shutdown.cancel(); }

    /// Encode and flush `frame` to the client.
    ///
    /// Concurrent callers are serialized; each frame is written whole.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Io`] with `NotConnected` if the connection is
    /// closed or is forced closed while waiting, or the underlying write
    /// error.
    pub async fn send_frame(&self, frame: Frame) -> Result<(), CodecError> {
        if self.is_closed() || self.shutdown.is_cancelled() {
            return Err(CodecError::not_connected());
        }
        let mut writer = self.writer.lock().await;
        tokio::select! {
            biased;

            () = self.shutdown.cancelled() => Err(CodecError::not_connected()),
            res = writer.send(frame) => {
                res?;
                metrics::inc_frames(Direction::Outbound);
                Ok(())
            }
        }
    }

    /// Send a Close frame with `payload`, at most once per connection.
    ///
    /// Later calls succeed without writing anything, so the server never
    /// answers a Close it initiated with a second one.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::send_frame`].
    pub async fn send_close(&self, payload: Bytes) -> Result<(), CodecError> {
        if self.close_sent.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.send_frame(Frame::new(Opcode::Close, payload)).await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
