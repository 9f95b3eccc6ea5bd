//! # Stratum Light Client
//!
//! Keeps a local header chain in step with a Stratum server and logs the
//! activity of watched addresses.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (`STRATUM_CONFIG` file, then environment)
//! 2. Install the tracing subscriber
//! 3. Open the header store, connect, start the synchronizer and watchers
//! 4. Run until Ctrl+C, until the server connection is lost, or until the
//!    synchronizer stops on a fatal error

use anyhow::{Context, Result};
use stratum_runtime::{logging, RuntimeConfig, StratumRuntime};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = RuntimeConfig::load().context("Failed to load configuration")?;
    logging::init(&config.log_level, config.json_logs)?;

    let mut runtime = StratumRuntime::new(config);
    runtime.start().await?;

    info!("Stratum client is running. Press Ctrl+C to stop.");
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Ctrl+C received");
        }
        _ = runtime.disconnected() => {
            warn!("Server connection lost");
        }
        _ = runtime.chain_finished() => {
            warn!("Chain synchronizer stopped");
        }
    }

    let report = runtime.shutdown().await?;
    info!(
        height = report.height,
        peer_height = report.peer_height,
        "Stratum client stopped"
    );
    Ok(())
}
