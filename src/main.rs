//! ==============================================================================
//! main.rs - gateway entry point
//! ==============================================================================
//!
//! purpose:
//!     wires the serial device, the state store, the record log and the udp
//!     server together, then waits for ctrl-c.
//!
//! tasks:
//!
//! ```text
//!     ┌────────────────────────────┐     ┌────────────────────────────┐
//!     │ serial-reader (os thread)  │     │ udp accept loop (tokio)    │
//!     │ blocking line reads        │     │ one task per datagram      │
//!     │ -> StateStore::update      │     │ -> StateStore::snapshot    │
//!     │ -> RecordLog::append       │     │ -> CommandWriter           │
//!     └────────────────────────────┘     └────────────────────────────┘
//! ```
//!
//! shutdown:
//!     ctrl-c (or the serial stream ending) stops the accept loop and drops
//!     the serial write half. handlers still in flight are not drained and
//!     the reader thread is left blocked until the process exits.
//!
//! usage:
//!     serial-gateway [--config <path> | <path>]
//!
//! ==============================================================================

use std::path::PathBuf;

use anyhow::Result;
use tokio::sync::{oneshot, watch};
use tracing_subscriber::EnvFilter;

use serial_gateway::config::GatewayConfig;
use serial_gateway::device::{CommandWriter, Ingestor, LineParser, LineReader};
use serial_gateway::domain::UnitTable;
use serial_gateway::gateway::{Gateway, GatewayServer};
use serial_gateway::record_log::RecordLog;
use serial_gateway::state::StateStore;
use serial_gateway::transport::SerialTransport;

/// `--config <path>`, `-c <path>` or a bare first argument
fn parse_config_path() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(PathBuf::from(&args[i + 1]));
        }
    }

    args.get(1).filter(|a| !a.starts_with('-')).map(PathBuf::from)
}

/// load config under a temporary subscriber so its log lines are not lost
fn load_config() -> GatewayConfig {
    let bootstrap = tracing_subscriber::fmt().with_env_filter(EnvFilter::new("info")).finish();
    let path = parse_config_path();
    tracing::subscriber::with_default(bootstrap, || GatewayConfig::load_or_default(path.as_deref()))
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: configuration and logging
    let config = load_config();
    init_logging(&config.logging.level);
    config.print_summary();

    // step 2: open the device; failure here is fatal
    let transport = match SerialTransport::open(&config.serial.port, config.serial.baud_rate) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Serial {} port not available: {}", config.serial.port, e);
            return Err(e.into());
        }
    };
    let (reader, writer) = transport.split()?;

    // step 3: shared state and persistence
    let state = StateStore::for_mode(config.ingest.mode, &config.ingest.tracked_keys);
    let record_log = RecordLog::new(&config.record_log.path);
    tracing::info!("Recording readings to {}", record_log.path().display());
    let units = UnitTable::with_overrides(&config.units);

    // step 4: serial reader on its own thread
    let ingestor = Ingestor::new(
        LineParser::new(config.ingest.mode, units),
        state.clone(),
        record_log,
        config.logging.show_readings,
    );
    let (serial_done_tx, serial_done_rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("serial-reader".to_string())
        .spawn(move || {
            let outcome = ingestor.run(LineReader::new(reader));
            let _ = serial_done_tx.send(outcome);
        })?;

    // step 5: udp server
    let gateway = Gateway::new(
        state,
        CommandWriter::new(writer),
        config.ingest.mode,
        config.ingest.tracked_keys.clone(),
    );
    let server = GatewayServer::bind(config.bind_addr()?, gateway, config.network.max_datagram).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = tokio::spawn(server.run(shutdown_rx));

    tracing::info!("Press Ctrl-C to quit.");

    // step 6: wait for ctrl-c or the device going away
    let serial_result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Interrupt received, shutting down");
            Ok(())
        }
        outcome = serial_done_rx => {
            match outcome {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    tracing::error!("Serial read loop failed: {}", e);
                    Err(e)
                }
                Err(_) => Ok(()),
            }
        }
    };

    let _ = shutdown_tx.send(true);
    match server_task.await {
        Ok(Err(e)) => tracing::warn!("Server exited with error: {}", e),
        Err(e) => tracing::warn!("Server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    serial_result?;
    Ok(())
}
