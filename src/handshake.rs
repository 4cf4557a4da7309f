//! HTTP Upgrade handshake (RFC 6455 §4.2).
//!
//! [`perform_handshake`] reads the client's opening request from a freshly
//! accepted stream, derives `Sec-WebSocket-Accept` and writes the
//! `101 Switching Protocols` response. Any bytes the client sent after the
//! request head are returned so the frame decoder can consume them.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::{BufMut, BytesMut};
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// GUID appended to the client key before hashing (RFC 6455 §1.3).
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Default upper bound on the size of the request head.
pub const DEFAULT_MAX_HANDSHAKE_LEN: usize = 8 * 1024;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";
const READ_CHUNK: usize = 1024;

/// Errors that abort a handshake. The connection is dropped in every case.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Reading the request or writing the response failed.
    #[error("handshake transport error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the stream before sending a complete request head.
    #[error("connection closed before the handshake completed")]
    ConnectionClosed,

    /// The request head did not terminate within the configured bound.
    #[error("handshake request exceeds {limit} bytes")]
    TooLarge {
        /// Configured maximum request head size.
        limit: usize,
    },

    /// The request line could not be parsed.
    #[error("malformed handshake request: {reason}")]
    MalformedRequest {
        /// What was wrong with the request.
        reason: &'static str,
    },

    /// The request carried no `Sec-WebSocket-Key` header.
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    /// The client did not finish the handshake in time.
    #[error("handshake timed out after {0:?}")]
    TimedOut(Duration),
}

/// Parsed opening request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpgradeRequest {
    method: String,
    target: String,
    headers: Vec<(String, String)>,
}

impl UpgradeRequest {
    /// Parse a request head (request line plus headers, without the blank
    /// line terminator).
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::MalformedRequest`] if the request line lacks
    /// a method or target.
    pub fn parse(head: &[u8]) -> Result<Self, HandshakeError> {
        let text = String::from_utf8_lossy(head);
        let mut lines = text.split("\r\n");

        let mut request_line = lines.next().unwrap_or_default().split_whitespace();
        let (Some(method), Some(target)) = (request_line.next(), request_line.next()) else {
            return Err(HandshakeError::MalformedRequest {
                reason: "request line needs a method and a target",
            });
        };

        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_owned(), value.trim().to_owned()))
            .collect();

        Ok(Self {
            method: method.to_owned(),
            target: target.to_owned(),
            headers,
        })
    }

    /// Request method, e.g. `GET`.
    #[must_use]
    pub fn method(&self) -> &str { &self.method }

    /// Request target, e.g. `/chat`.
    #[must_use]
    pub fn target(&self) -> &str { &self.target }

    /// First header value matching `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The client's `Sec-WebSocket-Key`.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::MissingKey`] if the header is absent or empty.
    pub fn websocket_key(&self) -> Result<&str, HandshakeError> {
        self.header("Sec-WebSocket-Key")
            .filter(|key| !key.is_empty())
            .ok_or(HandshakeError::MissingKey)
    }
}

/// Result of a successful upgrade.
#[derive(Debug)]
pub struct Upgraded {
    /// The request that was accepted.
    pub request: UpgradeRequest,
    /// Bytes received after the request head; the start of the frame stream.
    pub leftover: BytesMut,
}

/// Derive `Sec-WebSocket-Accept` from a client key.
///
/// # Examples
///
/// ```
/// use wshub::handshake::compute_accept_key;
///
/// assert_eq!(
///     compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
#[must_use]
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// The `101 Switching Protocols` response for `accept_key`.
#[must_use]
pub fn upgrade_response(accept_key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept_key}\r\n\
         \r\n"
    )
}

fn bad_request_response(reason: &str) -> String {
    let body = format!("Bad Request: {reason}");
    format!(
        "HTTP/1.1 400 Bad Request\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
}

fn find_terminator(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
        .map(|pos| from + pos)
}

/// Read until the blank line ending the request head, never buffering more
/// than `max_len` bytes. Returns the head and any bytes after it.
async fn read_request_head<R>(
    reader: &mut R,
    max_len: usize,
) -> Result<(BytesMut, BytesMut), HandshakeError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK.min(max_len));
    let mut scanned = 0;
    loop {
        if let Some(end) = find_terminator(&buf, scanned) {
            let leftover = buf.split_off(end + HEAD_TERMINATOR.len());
            buf.truncate(end);
            return Ok((buf, leftover));
        }
        scanned = buf.len().saturating_sub(HEAD_TERMINATOR.len() - 1);

        let remaining = max_len.saturating_sub(buf.len());
        if remaining == 0 {
            return Err(HandshakeError::TooLarge { limit: max_len });
        }
        let mut limited = (&mut buf).limit(remaining.min(READ_CHUNK));
        if reader.read_buf(&mut limited).await? == 0 {
            return Err(HandshakeError::ConnectionClosed);
        }
    }
}

/// Run the server side of the opening handshake on `stream`.
///
/// On a request without `Sec-WebSocket-Key` a `400 Bad Request` is written
/// on a best-effort basis before the error is returned.
///
/// # Errors
///
/// Returns a [`HandshakeError`] if the request cannot be read, is malformed
/// or oversized, lacks a key, or the response cannot be written.
pub async fn perform_handshake<S>(stream: &mut S, max_len: usize) -> Result<Upgraded, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (head, leftover) = read_request_head(stream, max_len).await?;

    let (request, accept_key) = match UpgradeRequest::parse(&head).and_then(|request| {
        let accept_key = compute_accept_key(request.websocket_key()?);
        Ok((request, accept_key))
    }) {
        Ok(accepted) => accepted,
        Err(err) => {
            reject(stream, &err).await;
            return Err(err);
        }
    };

    stream
        .write_all(upgrade_response(&accept_key).as_bytes())
        .await?;
    stream.flush().await?;

    Ok(Upgraded { request, leftover })
}

/// Answer a rejected request with `400 Bad Request`. Failures are ignored
/// since the connection is dropped either way.
async fn reject<S>(stream: &mut S, err: &HandshakeError)
where
    S: AsyncWrite + Unpin,
{
    let response = bad_request_response(&err.to_string());
    if stream.write_all(response.as_bytes()).await.is_ok() {
        let _ = stream.shutdown().await;
    }
}

#[cfg(test)]
mod tests;
