//! STRATA Node Binary

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use strata_core::{NodeConfig, Timestamp};
use strata_node::{resolve_node_id, StateRuntime, StrataNode};
use strata_state::GenesisState;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strata-node")]
#[command(about = "STRATA Node - Platform chain state host")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node
    Run {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Genesis file path
        #[arg(short, long)]
        genesis: Option<PathBuf>,

        /// Data directory
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Generate a devnet genesis file
    Genesis {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Hex node id of the genesis validator
        #[arg(long)]
        node_id: Option<String>,

        /// Genesis timestamp in seconds (defaults to now)
        #[arg(long)]
        timestamp: Option<u64>,
    },

    /// Load persisted state and print a summary
    Inspect {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Data directory
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Also print metrics
        #[arg(long)]
        metrics: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            genesis,
            data_dir,
        } => {
            let config = load_config(config.as_deref(), data_dir)?;
            init_tracing(&config.log_level);
            info!("Starting STRATA Node...");

            let genesis = match genesis {
                Some(path) => {
                    let content = std::fs::read_to_string(&path)?;
                    GenesisState::from_json(&content)?
                }
                None => GenesisState::devnet(resolve_node_id(&config)?, Timestamp::now()),
            };

            let node = StrataNode::open(config)?;
            node.run(genesis).await?;
        }

        Commands::Genesis {
            output,
            node_id,
            timestamp,
        } => {
            let config = NodeConfig {
                node_id,
                ..NodeConfig::default()
            };
            init_tracing(&config.log_level);
            let timestamp = timestamp.map(Timestamp::from_secs).unwrap_or_else(Timestamp::now);
            let genesis = GenesisState::devnet(resolve_node_id(&config)?, timestamp);

            std::fs::write(&output, genesis.to_json()?)?;
            println!("Genesis saved to: {}", output.display());
            println!("Genesis block id: {}", genesis.block_id()?.to_hex());
        }

        Commands::Inspect {
            config,
            data_dir,
            metrics,
        } => {
            let config = load_config(config.as_deref(), data_dir)?;
            init_tracing(&config.log_level);
            let mut runtime = StateRuntime::open(config)?;
            runtime.load()?;

            println!("{}", serde_json::to_string_pretty(&runtime.summary()?)?);
            if metrics {
                println!("{}", runtime.metrics_text()?);
            }
            runtime.shutdown()?;
        }
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> anyhow::Result<NodeConfig> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            NodeConfig::from_json(&content)?
        }
        None => NodeConfig::default(),
    };

    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }
    Ok(config)
}
