// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Foreground CLI harness standing in for a GUI control surface: starts
//! the engine, loads the newline-delimited peer list, and runs until
//! Ctrl-C. The engine crate itself never touches the filesystem - this
//! binary owns that file.

use clap::Parser;
use lan_relay::{Config, Engine};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Relays local UDP broadcasts to remote peers")]
struct Args {
    /// Peer IPv4 address to relay broadcasts to. Repeatable.
    #[arg(long = "receiver", value_name = "IP")]
    receivers: Vec<String>,

    /// Newline-delimited file of peer IPv4 addresses; blank and
    /// unparseable lines are skipped.
    #[arg(long, value_name = "PATH")]
    receivers_file: Option<PathBuf>,

    /// Capture port to bind the promiscuous socket to. Not used for
    /// filtering; present for parity with the tunable in `Config`.
    #[arg(long, default_value_t = lan_relay::config::DEFAULT_CAPTURE_PORT)]
    port: u16,
}

fn load_receivers_file(path: &std::path::Path) -> std::io::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| line.parse::<std::net::Ipv4Addr>().is_ok())
        .map(str::to_string)
        .collect())
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .with_env_var("LAN_RELAY_LOG")
        .from_env()
        .unwrap_or_default();
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();

    let mut config = Config::default();
    config.capture_port = args.port;

    let engine = Engine::new(config);

    for ip in &args.receivers {
        if !engine.add_receiver(ip) {
            tracing::warn!(%ip, "ignoring unparsable --receiver argument");
        }
    }

    if let Some(path) = &args.receivers_file {
        match load_receivers_file(path) {
            Ok(ips) => {
                for ip in ips {
                    engine.add_receiver(&ip);
                }
            }
            Err(err) => {
                tracing::error!(error = %err, path = %path.display(), "failed to read receivers file");
            }
        }
    }

    if let Err(err) = engine.start().await {
        eprintln!("failed to start engine: {err}");
        return std::process::ExitCode::FAILURE;
    }

    tracing::info!(receivers = ?engine.list_receivers(), "relay running, press Ctrl-C to stop");

    let _ = tokio::signal::ctrl_c().await;

    engine.dispose().await;

    std::process::ExitCode::SUCCESS
}
