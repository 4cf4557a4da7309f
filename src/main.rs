//! `wshub` demo server.
//!
//! Runs a [`WebSocketServer`] that echoes or relays messages until Ctrl+C.

mod cli;

use std::error::Error;

use clap::Parser;
use cli::{Cli, Mode};
use wshub::{ServerConfig, WebSocketServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    #[cfg(feature = "metrics")]
    if let Some(addr) = cli.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        tracing::info!(%addr, "serving metrics");
    }
    #[cfg(not(feature = "metrics"))]
    if cli.metrics_addr.is_some() {
        tracing::warn!("built without the metrics feature; ignoring --metrics-addr");
    }

    let mut config = ServerConfig::default()
        .bind_ip(cli.bind)
        .max_connections(cli.max_connections);
    if let Some(len) = cli.max_payload {
        config = config.max_payload_len(len);
    }

    let server = WebSocketServer::new(config);
    let handle = server.handle();
    let mode = cli.mode;
    server.on_message(move |msg| {
        let handle = handle.clone();
        async move {
            match mode {
                Mode::Echo if msg.is_text() => {
                    handle.send(msg.client_id, &msg.text()).await;
                }
                Mode::Echo => {
                    handle.send_binary(msg.client_id, msg.payload).await;
                }
                Mode::Relay if msg.is_text() => {
                    handle.broadcast(&msg.text()).await;
                }
                Mode::Relay => {
                    handle.broadcast_binary(msg.payload).await;
                }
            }
        }
    });
    server.on_connect(|id| tracing::info!(%id, "client connected"));
    server.on_disconnect(|id| tracing::info!(%id, "client disconnected"));

    let addr = server.start(cli.port)?;
    tracing::info!(%addr, ?mode, "wshub listening; press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    server.stop().await;
    Ok(())
}
