//! # floorsync
//!
//! CLI tool for exercising collaborative floor-plan marker sessions.
//!
//! ## Commands
//!
//! - `simulate`: Run two operators on one floor plan through a scripted
//!   concurrent-edit scenario
//! - `config`: Print the effective configuration
//!
//! ## Example
//!
//! ```bash
//! # Watch a conflict being resolved by hand
//! floorsync simulate --strategy manual
//!
//! # Show configuration loaded from a file
//! floorsync config --config ./floorsync.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use floorsync_core::ConflictResolutionStrategy;
use std::path::PathBuf;

mod commands;
mod config;

use commands::{config as config_cmd, simulate};
use config::CliConfig;

/// CLI tool for exercising collaborative floor-plan marker sessions.
#[derive(Parser, Debug)]
#[command(name = "floorsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to floorsync.toml in the config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log sync activity at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run two in-process operators through a concurrent-edit scenario
    Simulate {
        /// Conflict policy for the second operator
        #[arg(long, short, value_enum)]
        strategy: Option<StrategyArg>,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Conflict policy names accepted on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[value(rename_all = "snake_case")]
enum StrategyArg {
    ServerAuthoritative,
    LocalWins,
    LastWriteWins,
    Manual,
}

impl From<StrategyArg> for ConflictResolutionStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::ServerAuthoritative => Self::ServerAuthoritative,
            StrategyArg::LocalWins => Self::LocalWins,
            StrategyArg::LastWriteWins => Self::LastWriteWins,
            StrategyArg::Manual => Self::Manual,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let (config, source) = CliConfig::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Simulate { strategy } => {
            simulate::run(&config, strategy.map(ConflictResolutionStrategy::from)).await?;
        }
        Commands::Config => {
            config_cmd::run(&config, source.as_deref())?;
        }
    }

    Ok(())
}
