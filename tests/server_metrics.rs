#![cfg(feature = "metrics")]
//! Metrics emitted by a running server.
//!
//! Installs a global recorder, so this file holds a single test.
use std::time::Duration;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use wshub::{WebSocketServer, metrics as ws_metrics};
use wshub_testing::{TestClient, TestResult, loopback_config, wait_until};

#[tokio::test]
async fn server_records_connections_and_frames() -> TestResult {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    metrics::set_global_recorder(recorder).map_err(|_| "global recorder already installed")?;

    let server = WebSocketServer::new(loopback_config());
    let addr = server.start(0)?;
    let mut client = TestClient::connect(addr).await?;
    assert!(wait_until(Duration::from_secs(2), || server.client_count() == 1).await);
    client.ping("x").await?;
    client.ping("y").await?;
    server.stop().await;

    let metrics = snapshotter.snapshot().into_vec();
    let counter = |name: &str, direction: &str| {
        metrics.iter().find_map(|(k, _, _, v)| match v {
            DebugValue::Counter(c)
                if k.key().name() == name
                    && k.key()
                        .labels()
                        .any(|l| l.key() == "direction" && l.value() == direction) =>
            {
                Some(*c)
            }
            _ => None,
        })
    };
    assert_eq!(counter(ws_metrics::FRAMES_PROCESSED, "inbound"), Some(2));
    // Two pongs and the going-away close.
    assert_eq!(counter(ws_metrics::FRAMES_PROCESSED, "outbound"), Some(3));

    let active = metrics.iter().find_map(|(k, _, _, v)| match v {
        DebugValue::Gauge(g) if k.key().name() == ws_metrics::CONNECTIONS_ACTIVE => Some(g.0),
        _ => None,
    });
    assert_eq!(active.map(|g| g.abs() < f64::EPSILON), Some(true));
    Ok(())
}
