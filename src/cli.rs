//! Command line interface for the `wshub` demo server.
//!
//! Kept free of crate-internal imports so the build script can include it
//! to render the man page.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::{Parser, ValueEnum};

/// What the demo server does with incoming messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Send every message back to its sender.
    #[default]
    Echo,
    /// Broadcast every message to all connected clients.
    Relay,
}

/// Command line arguments for the `wshub` binary.
#[derive(Debug, Parser)]
#[command(name = "wshub", version, about = "RFC 6455 WebSocket demo server")]
pub struct Cli {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 9001)]
    pub port: u16,

    /// Address to bind.
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Message handling mode.
    #[arg(short, long, value_enum, default_value_t = Mode::Echo)]
    pub mode: Mode,

    /// Largest accepted frame payload in bytes.
    #[arg(long)]
    pub max_payload: Option<usize>,

    /// Maximum number of concurrent clients.
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Mode};

    #[test]
    fn defaults_to_echo_on_9001() {
        let cli = Cli::parse_from(["wshub"]);
        assert_eq!(cli.port, 9001);
        assert_eq!(cli.mode, Mode::Echo);
        assert!(cli.max_payload.is_none());
    }

    #[test]
    fn parses_relay_options() {
        let cli = Cli::parse_from([
            "wshub",
            "--port",
            "8080",
            "--mode",
            "relay",
            "--max-connections",
            "10",
            "--metrics-addr",
            "127.0.0.1:9100",
        ]);
        assert_eq!(cli.port, 8080);
        assert_eq!(cli.mode, Mode::Relay);
        assert_eq!(cli.max_connections, Some(10));
        assert_eq!(
            cli.metrics_addr.map(|addr| addr.port()),
            Some(9100)
        );
    }
}
