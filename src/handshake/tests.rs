//! Unit tests for the opening handshake.

use rstest::rstest;
use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

use super::*;

const RFC_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
const RFC_ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

fn upgrade_request(key_header: &str) -> String {
    format!(
        "GET /chat HTTP/1.1\r\nHost: server.example.com\r\nUpgrade: websocket\r\nConnection: \
         Upgrade\r\n{key_header}Sec-WebSocket-Version: 13\r\n\r\n"
    )
}

/// Feed `request` to `perform_handshake` and return its result together with
/// everything the server wrote back.
async fn run_handshake(
    request: Vec<u8>,
    max_len: usize,
) -> (Result<Upgraded, HandshakeError>, String) {
    let (mut client, mut server) = duplex(64 * 1024);
    client.write_all(&request).await.expect("write request");
    client.shutdown().await.expect("shutdown client writes");

    let result = perform_handshake(&mut server, max_len).await;
    drop(server);

    let mut response = String::new();
    client
        .read_to_string(&mut response)
        .await
        .expect("read response");
    (result, response)
}

#[test]
fn accept_key_matches_rfc_example() {
    assert_eq!(compute_accept_key(RFC_KEY), RFC_ACCEPT);
}

#[test]
fn upgrade_response_is_bit_exact() {
    assert_eq!(
        upgrade_response(RFC_ACCEPT),
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: \
         Upgrade\r\nSec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n"
    );
}

#[rstest]
#[case("Sec-WebSocket-Key")]
#[case("sec-websocket-key")]
#[case("SEC-WEBSOCKET-KEY")]
fn key_header_is_case_insensitive(#[case] name: &str) {
    let request = upgrade_request(&format!("{name}: {RFC_KEY}\r\n"));
    let head = request.trim_end_matches("\r\n\r\n");
    let parsed = UpgradeRequest::parse(head.as_bytes()).expect("parse");
    assert_eq!(parsed.websocket_key().expect("key"), RFC_KEY);
    assert_eq!(parsed.method(), "GET");
    assert_eq!(parsed.target(), "/chat");
    assert_eq!(parsed.header("upgrade"), Some("websocket"));
}

#[rstest]
#[case("")]
#[case("Sec-WebSocket-Key:   \r\n")]
fn missing_or_empty_key_is_rejected(#[case] key_header: &str) {
    let request = upgrade_request(key_header);
    let parsed = UpgradeRequest::parse(request.as_bytes()).expect("parse");
    assert!(matches!(
        parsed.websocket_key(),
        Err(HandshakeError::MissingKey)
    ));
}

#[test]
fn request_line_without_target_is_malformed() {
    let err = UpgradeRequest::parse(b"GET\r\nSec-WebSocket-Key: abc").expect_err("malformed");
    assert!(matches!(err, HandshakeError::MalformedRequest { .. }));
}

#[tokio::test]
async fn successful_handshake_writes_101() {
    let request = upgrade_request(&format!("Sec-WebSocket-Key: {RFC_KEY}\r\n"));
    let (result, response) = run_handshake(request.into_bytes(), DEFAULT_MAX_HANDSHAKE_LEN).await;

    let upgraded = result.expect("handshake should succeed");
    assert!(upgraded.leftover.is_empty());
    assert_eq!(response, upgrade_response(RFC_ACCEPT));
}

#[tokio::test]
async fn bytes_after_request_head_are_preserved() {
    let mut request = upgrade_request(&format!("Sec-WebSocket-Key: {RFC_KEY}\r\n")).into_bytes();
    request.extend_from_slice(&[0x89, 0x00]);

    let (result, _) = run_handshake(request, DEFAULT_MAX_HANDSHAKE_LEN).await;
    let upgraded = result.expect("handshake should succeed");
    assert_eq!(&upgraded.leftover[..], &[0x89, 0x00]);
}

#[tokio::test]
async fn missing_key_gets_bad_request() {
    let (result, response) =
        run_handshake(upgrade_request("").into_bytes(), DEFAULT_MAX_HANDSHAKE_LEN).await;

    assert!(matches!(result, Err(HandshakeError::MissingKey)));
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{response}");
    assert!(!response.contains("101"));
}

#[tokio::test]
async fn oversized_request_head_is_rejected() {
    let mut request = b"GET / HTTP/1.1\r\n".to_vec();
    request.extend(std::iter::repeat_n(b'a', 600));

    let (result, response) = run_handshake(request, 512).await;
    assert!(matches!(result, Err(HandshakeError::TooLarge { limit: 512 })));
    assert!(response.is_empty());
}

#[tokio::test]
async fn eof_before_blank_line_is_reported() {
    let request = b"GET / HTTP/1.1\r\nSec-WebSocket-Key: abc\r\n".to_vec();
    let (result, _) = run_handshake(request, DEFAULT_MAX_HANDSHAKE_LEN).await;
    assert!(matches!(result, Err(HandshakeError::ConnectionClosed)));
}

#[tokio::test]
async fn terminator_split_across_reads_is_found() {
    let (mut client, mut server) = duplex(16);
    let request = upgrade_request(&format!("Sec-WebSocket-Key: {RFC_KEY}\r\n"));

    let writer = tokio::spawn(async move {
        for chunk in request.as_bytes().chunks(3) {
            client.write_all(chunk).await.expect("write chunk");
        }
        let mut response = vec![0u8; upgrade_response(RFC_ACCEPT).len()];
        client.read_exact(&mut response).await.expect("read response");
        response
    });

    perform_handshake(&mut server, DEFAULT_MAX_HANDSHAKE_LEN)
        .await
        .expect("handshake should succeed");
    let response = writer.await.expect("join writer");
    assert_eq!(response, upgrade_response(RFC_ACCEPT).into_bytes());
}
