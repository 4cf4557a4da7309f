//! A misbehaving client only ever takes down its own connection.
use std::{
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use rstest::rstest;
use wshub::{ConnectionId, Frame, Opcode, WebSocketServer};
use wshub_testing::{
    TestClient,
    TestResult,
    loopback_config,
    raw_exchange,
    server,
    wait_until,
};

const WAIT: Duration = Duration::from_secs(2);

async fn healthy_peer(server: &WebSocketServer) -> TestResult<TestClient> {
    let addr = server.local_addr().ok_or("server not running")?;
    let client = TestClient::connect(addr).await?;
    if !wait_until(WAIT, || server.client_count() >= 1).await {
        return Err("healthy client did not register".into());
    }
    Ok(client)
}

/// Record every id passed to `on_disconnect`.
fn record_disconnects(server: &WebSocketServer) -> Arc<Mutex<Vec<ConnectionId>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    server.on_disconnect(move |id| sink.lock().expect("lock").push(id));
    seen
}

/// Connect a second client next to `good_id` and return it with its id.
async fn offender(server: &WebSocketServer, good_id: ConnectionId) -> TestResult<(TestClient, ConnectionId)> {
    let addr = server.local_addr().ok_or("server not running")?;
    let client = TestClient::connect(addr).await?;
    if !wait_until(WAIT, || server.client_count() == 2).await {
        return Err("offending client did not register".into());
    }
    let id = server
        .handle()
        .client_ids()
        .into_iter()
        .find(|id| *id != good_id)
        .ok_or("offending client has no id")?;
    Ok((client, id))
}

#[rstest]
#[case::unknown_opcode(vec![0x83, 0x80, 1, 2, 3, 4], 1002)]
#[case::reserved_control_opcode(vec![0x8B, 0x80, 1, 2, 3, 4], 1002)]
#[case::length_msb_set(vec![0x82, 0xFF, 0x80, 0, 0, 0, 0, 0, 0, 0], 1002)]
#[tokio::test]
async fn malformed_frame_closes_only_the_offender(
    server: WebSocketServer,
    #[case] raw: Vec<u8>,
    #[case] expected_code: u16,
) -> TestResult {
    let disconnects = record_disconnects(&server);
    server.start(0)?;
    let mut good = healthy_peer(&server).await?;
    let good_id = server.handle().client_ids()[0];
    let (mut bad, bad_id) = offender(&server, good_id).await?;

    bad.send_raw(&raw).await?;
    let close = bad.expect_close().await?.expect("status");
    assert_eq!(close.code, expected_code);
    bad.drain_until_closed().await?;

    assert!(wait_until(WAIT, || server.client_count() == 1).await);
    assert!(wait_until(WAIT, || !disconnects.lock().expect("lock").is_empty()).await);
    assert_eq!(*disconnects.lock().expect("lock"), vec![bad_id]);
    assert_eq!(server.handle().client_ids(), vec![good_id]);
    assert_eq!(&good.ping("alive").await?[..], b"alive");
    server.stop().await;
    Ok(())
}

#[rstest]
#[tokio::test]
async fn continuation_frames_are_rejected(server: WebSocketServer) -> TestResult {
    let addr = server.start(0)?;
    let mut client = TestClient::connect(addr).await?;
    client.send(Frame::new(Opcode::Continuation, "tail")).await?;
    let close = client.expect_close().await?.expect("status");
    assert_eq!(close.code, 1002);
    assert!(wait_until(WAIT, || server.client_count() == 0).await);
    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn oversized_frame_is_refused_with_1009() -> TestResult {
    let server = WebSocketServer::new(loopback_config().max_payload_len(1024));
    let addr = server.start(0)?;
    let mut client = TestClient::connect(addr).await?;
    client.send(Frame::binary(vec![0_u8; 2000])).await?;
    let close = client.expect_close().await?.expect("status");
    assert_eq!(close.code, 1009);
    server.stop().await;
    Ok(())
}

#[rstest]
#[tokio::test]
async fn truncated_frame_drops_the_connection(server: WebSocketServer) -> TestResult {
    let disconnects = record_disconnects(&server);
    server.start(0)?;
    let mut good = healthy_peer(&server).await?;
    let good_id = server.handle().client_ids()[0];
    let (mut bad, bad_id) = offender(&server, good_id).await?;

    // Header announces ten masked bytes; only three follow.
    bad.send_raw(&[0x82, 0x8A, 0, 0, 0, 0, 1, 2, 3]).await?;
    bad.shutdown_write().await?;
    assert!(bad.drain_until_closed().await?.is_empty());

    assert!(wait_until(WAIT, || server.client_count() == 1).await);
    assert!(wait_until(WAIT, || !disconnects.lock().expect("lock").is_empty()).await);
    assert_eq!(*disconnects.lock().expect("lock"), vec![bad_id]);
    assert_eq!(&good.ping("ok").await?[..], b"ok");
    server.stop().await;
    Ok(())
}

#[rstest]
#[tokio::test]
async fn handshake_without_key_gets_400_and_is_never_registered(
    server: WebSocketServer,
) -> TestResult {
    let connects = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connects);
    server.on_connect(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let addr = server.start(0)?;
    let _good = healthy_peer(&server).await?;

    let request = b"GET / HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\n\r\n";
    let response = raw_exchange(addr, request).await?;
    assert!(response.starts_with(b"HTTP/1.1 400 Bad Request\r\n"));

    assert_eq!(server.client_count(), 1);
    assert_eq!(connects.load(Ordering::SeqCst), 1);
    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn silent_socket_is_dropped_after_the_handshake_timeout() -> TestResult {
    let server = WebSocketServer::new(
        loopback_config().handshake_timeout(Some(Duration::from_millis(100))),
    );
    let addr = server.start(0)?;
    let response = raw_exchange(addr, b"GET / HTTP/1.1\r\n").await?;
    assert!(response.is_empty());
    assert_eq!(server.client_count(), 0);
    server.stop().await;
    Ok(())
}

#[rstest]
#[tokio::test]
async fn panicking_callback_keeps_the_connection(server: WebSocketServer) -> TestResult {
    let handle = server.handle();
    server.on_message(move |msg| {
        assert!(msg.text() != "boom", "callback exploded");
        let handle = handle.clone();
        async move {
            handle.send(msg.client_id, &msg.text()).await;
        }
    });
    let addr = server.start(0)?;
    let mut client = TestClient::connect(addr).await?;

    client.send_text("boom").await?;
    client.send_text("fine").await?;
    assert_eq!(&client.expect_frame().await?.payload[..], b"fine");
    assert_eq!(server.client_count(), 1);
    server.stop().await;
    Ok(())
}
