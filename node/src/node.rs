//! Long-running node hosting the state

use crate::runtime::{Bootstrap, StateRuntime};
use std::time::Duration;
use strata_core::NodeConfig;
use strata_state::GenesisState;
use tokio::signal;
use tracing::{error, info, warn};

/// Full STRATA node
pub struct StrataNode {
    runtime: StateRuntime,
}

impl StrataNode {
    /// Open the node's state database
    pub fn open(config: NodeConfig) -> anyhow::Result<Self> {
        let runtime = StateRuntime::open(config)?;
        Ok(Self { runtime })
    }

    /// Bootstrap the state, flush periodically until ctrl-c, then shut down
    pub async fn run(mut self, genesis: GenesisState) -> anyhow::Result<()> {
        info!("Starting STRATA node...");

        match self.runtime.bootstrap(&genesis) {
            Ok(Bootstrap::Loaded) => info!("State loaded from disk"),
            Ok(Bootstrap::Genesis) => info!("State initialized from genesis"),
            Err(e) => {
                // staged genesis changes may be half written; never flush them again
                error!("State bootstrap failed: {}", e);
                if let Err(close_err) = self.runtime.abort() {
                    warn!("Closing after failed bootstrap: {}", close_err);
                }
                return Err(e.into());
            }
        }

        let summary = self.runtime.summary()?;
        info!(
            last_accepted = %summary.last_accepted,
            stakers = summary.stakers,
            utxos = summary.utxos,
            "Node started successfully"
        );

        let period = Duration::from_secs(self.runtime.config().state.flush_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.runtime.flush() {
                        error!("Periodic flush failed: {}", e);
                        break;
                    }
                }
                result = signal::ctrl_c() => {
                    match result {
                        Ok(()) => info!("Shutdown signal received, stopping node..."),
                        Err(e) => error!("Error waiting for shutdown signal: {}", e),
                    }
                    break;
                }
            }
        }

        self.runtime.shutdown()?;
        info!("Node stopped");
        Ok(())
    }

    pub fn runtime(&self) -> &StateRuntime {
        &self.runtime
    }
}
