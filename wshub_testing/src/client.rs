//! Masking WebSocket client for integration tests.

use std::{io, net::SocketAddr, time::Duration};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tokio_util::codec::Framed;
use wshub::{
    CloseFrame,
    Frame,
    Opcode,
    WebSocketCodec,
    frame::DEFAULT_MAX_PAYLOAD_LEN,
    handshake::compute_accept_key,
};

use crate::TestResult;

/// Key from RFC 6455 §1.3.
pub const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
/// Accept value the server must derive from [`SAMPLE_KEY`].
pub const SAMPLE_ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_RESPONSE_HEAD: usize = 4096;

/// Build an upgrade request carrying `key`.
#[must_use]
pub fn upgrade_request(addr: SocketAddr, key: &str) -> String {
    format!(
        "GET /chat HTTP/1.1\r\nHost: {addr}\r\nUpgrade: websocket\r\nConnection: \
         Upgrade\r\nSec-WebSocket-Key: {key}\r\nSec-WebSocket-Version: 13\r\n\r\n"
    )
}

/// Send raw `request` bytes and return everything the server writes before
/// closing the connection.
///
/// # Errors
///
/// Returns any IO error, or a timeout if the server keeps the socket open.
pub async fn raw_exchange(addr: SocketAddr, request: &[u8]) -> TestResult<Vec<u8>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(request).await?;
    let mut response = Vec::new();
    timeout(RECV_TIMEOUT, stream.read_to_end(&mut response)).await??;
    Ok(response)
}

/// Read the HTTP response head one byte at a time so no frame bytes that
/// follow it are consumed.
async fn read_response_head(stream: &mut TcpStream) -> TestResult<String> {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err("upgrade response too large".into());
        }
        let byte = stream.read_u8().await?;
        head.push(byte);
    }
    Ok(String::from_utf8(head)?)
}

/// A WebSocket client speaking masked frames.
pub struct TestClient {
    framed: Framed<TcpStream, WebSocketCodec>,
}

impl TestClient {
    /// Connect and upgrade using [`SAMPLE_KEY`].
    ///
    /// # Errors
    ///
    /// Fails if the connection or handshake fails, or the server returns an
    /// unexpected accept value.
    pub async fn connect(addr: SocketAddr) -> TestResult<Self> {
        Self::connect_with_key(addr, SAMPLE_KEY).await
    }

    /// Connect and upgrade using `key`.
    ///
    /// # Errors
    ///
    /// See [`TestClient::connect`].
    pub async fn connect_with_key(addr: SocketAddr, key: &str) -> TestResult<Self> {
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(upgrade_request(addr, key).as_bytes()).await?;
        let head = timeout(RECV_TIMEOUT, read_response_head(&mut stream)).await??;
        if !head.starts_with("HTTP/1.1 101 Switching Protocols\r\n") {
            return Err(format!("unexpected upgrade response: {head:?}").into());
        }
        let accept = format!("Sec-WebSocket-Accept: {}\r\n", compute_accept_key(key));
        if !head.contains(&accept) {
            return Err(format!("wrong accept key in {head:?}").into());
        }
        Ok(Self {
            framed: Framed::new(stream, WebSocketCodec::client(DEFAULT_MAX_PAYLOAD_LEN)),
        })
    }

    /// Local address of the client socket, as the server sees the peer.
    ///
    /// # Errors
    ///
    /// Returns any IO error from the socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> { self.framed.get_ref().local_addr() }

    /// Send one masked frame.
    ///
    /// # Errors
    ///
    /// Returns the codec error if the write fails.
    pub async fn send(&mut self, frame: Frame) -> TestResult {
        self.framed.send(frame).await?;
        Ok(())
    }

    /// Send a Text frame.
    ///
    /// # Errors
    ///
    /// See [`TestClient::send`].
    pub async fn send_text(&mut self, text: &str) -> TestResult { self.send(Frame::text(text)).await }

    /// Send a Close frame with `code`.
    ///
    /// # Errors
    ///
    /// See [`TestClient::send`].
    pub async fn send_close(&mut self, code: u16) -> TestResult {
        self.send(Frame::close(Some(&CloseFrame::new(code, "")))).await
    }

    /// Write bytes directly to the socket, bypassing the codec.
    ///
    /// # Errors
    ///
    /// Returns any IO error.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> TestResult {
        let stream = self.framed.get_mut();
        stream.write_all(bytes).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Stop sending; the server sees end of stream.
    ///
    /// # Errors
    ///
    /// Returns any IO error.
    pub async fn shutdown_write(&mut self) -> TestResult {
        self.framed.get_mut().shutdown().await?;
        Ok(())
    }

    /// Receive the next frame, or `None` once the server closed the socket.
    ///
    /// # Errors
    ///
    /// Fails on decode errors or if nothing arrives within five seconds.
    pub async fn recv(&mut self) -> TestResult<Option<Frame>> {
        match timeout(RECV_TIMEOUT, self.framed.next()).await? {
            Some(frame) => Ok(Some(frame?)),
            None => Ok(None),
        }
    }

    /// Receive the next frame, failing if the socket closed instead.
    ///
    /// # Errors
    ///
    /// See [`TestClient::recv`].
    pub async fn expect_frame(&mut self) -> TestResult<Frame> {
        self.recv().await?.ok_or_else(|| "connection closed".into())
    }

    /// Receive the next frame and require it to be a Close frame.
    ///
    /// Returns the parsed status, if the frame carried one.
    ///
    /// # Errors
    ///
    /// Fails if another frame arrives first.
    pub async fn expect_close(&mut self) -> TestResult<Option<CloseFrame>> {
        let frame = self.expect_frame().await?;
        if frame.opcode != Opcode::Close {
            return Err(format!("expected close frame, got {:?}", frame.opcode).into());
        }
        Ok(CloseFrame::parse(&frame.payload))
    }

    /// Read until the server closes the socket, returning every frame seen.
    ///
    /// Resets and decode errors also count as closure.
    ///
    /// # Errors
    ///
    /// Fails only if the socket stays open past the receive timeout.
    pub async fn drain_until_closed(&mut self) -> TestResult<Vec<Frame>> {
        let mut frames = Vec::new();
        loop {
            match timeout(RECV_TIMEOUT, self.framed.next()).await? {
                Some(Ok(frame)) => frames.push(frame),
                Some(Err(_)) | None => return Ok(frames),
            }
        }
    }

    /// Send a Ping and return the payload of the Pong that answers it.
    ///
    /// # Errors
    ///
    /// Fails if the next frame is not a Pong.
    pub async fn ping(&mut self, payload: impl Into<Bytes>) -> TestResult<Bytes> {
        self.send(Frame::ping(payload)).await?;
        let frame = self.expect_frame().await?;
        if frame.opcode != Opcode::Pong {
            return Err(format!("expected pong, got {:?}", frame.opcode).into());
        }
        Ok(frame.payload)
    }
}
