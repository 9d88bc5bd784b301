//! `lislink` binary: run one analyzer link against the in-memory store.
//!
//! Real deployments embed the library and supply their own [`LisStore`];
//! this binary keeps a session alive for bench work against an instrument
//! or a simulator, logging every persisted reading.

mod cli;

use std::{sync::Arc, time::Duration};

use clap::Parser;
use lislink::{
    LinkConfig, LinkError, MemoryStore, NullSink, Session,
    config::{Mode, Parity, Role},
    transport,
};
use log::{error, info};
use tokio_util::sync::CancellationToken;

/// Pause between reconnect attempts after the transport drops.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

fn config_from(cli: cli::Cli) -> LinkConfig {
    LinkConfig {
        mode: match cli.mode {
            cli::CliMode::Serial => Mode::Serial,
            cli::CliMode::Network => Mode::Network,
        },
        role: match cli.role {
            cli::CliRole::Server => Role::Server,
            cli::CliRole::Client => Role::Client,
        },
        network_ack: cli.network_ack,
        address: cli.address,
        port: cli.port,
        serial_device: cli.serial_device,
        baud: cli.baud,
        parity: match cli.parity {
            cli::CliParity::None => Parity::None,
            cli::CliParity::Even => Parity::Even,
            cli::CliParity::Odd => Parity::Odd,
        },
        data_bits: cli.data_bits,
        stop_bits: cli.stop_bits,
        machine_name: cli.machine_name,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = config_from(cli::Cli::parse());
    config.validate().map_err(|e| format!("invalid configuration: {e}"))?;

    let store = Arc::new(MemoryStore::new());
    let cancel = CancellationToken::new();

    let signal_token = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
        signal_token.cancel();
    });

    while !cancel.is_cancelled() {
        let link = match transport::open(&config).await {
            Ok(link) => link,
            Err(e) => {
                error!("transport open failed: {e}; retrying");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(RECONNECT_DELAY) => continue,
                }
            }
        };

        let session = Session::new(
            config.clone(),
            Arc::clone(&store),
            NullSink,
            cancel.clone(),
        );
        match session.run(link).await {
            Ok(()) => break,
            Err(LinkError::TransportClosed) => {
                info!("link lost; reconnecting in {RECONNECT_DELAY:?}");
                for reading in store.readings() {
                    info!(
                        "reading: lab={} param={} value={}",
                        reading.lab_number, reading.qualified_param, reading.value
                    );
                }
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
            Err(e) => {
                error!("session failed: {e}");
                return Err(e.into());
            }
        }
    }

    Ok(())
}
