use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{LedgerConfig, PublishMode, RelayConfig};
use crate::runner::SimulationConfig;

/// Drive the ledger core from the command line
#[derive(Parser, Debug)]
#[command(name = "ledger-core")]
#[command(about = "Replay and stress the ledger core", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// How committed changes reach the event bus
    #[arg(
        long = "publish-mode",
        value_name = "MODE",
        env = "LEDGER_PUBLISH_MODE",
        default_value = "deferred",
        global = true,
        help = "Event publishing: 'deferred' (outbox relay) or 'inline' (after commit)"
    )]
    pub publish_mode: PublishMode,

    /// Deadline for each unit of work
    #[arg(
        long = "timeout-ms",
        value_name = "MILLIS",
        env = "LEDGER_TIMEOUT_MS",
        global = true,
        help = "Deadline per unit of work in milliseconds (default: 5000, 0 disables)"
    )]
    pub timeout_ms: Option<u64>,

    /// Emit logs as JSON lines
    #[arg(long = "json-logs", global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply a CSV of ledger operations and print the resulting accounts
    Replay {
        #[arg(value_name = "INPUT", help = "Path to the operations CSV file")]
        input_file: PathBuf,
    },

    /// Fire concurrent random transfers and verify the ledger invariants
    Simulate {
        #[arg(long, value_name = "COUNT", default_value_t = 16)]
        accounts: usize,

        #[arg(long, value_name = "COUNT", default_value_t = 1000)]
        transfers: usize,

        #[arg(
            long,
            value_name = "COUNT",
            help = "Runtime worker threads (default: CPU cores)"
        )]
        workers: Option<usize>,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

impl CliArgs {
    /// Create a LedgerConfig from CLI arguments
    ///
    /// Values not given on the command line or in the environment keep
    /// their defaults.
    pub fn to_ledger_config(&self) -> LedgerConfig {
        let default = LedgerConfig::default();
        let operation_timeout = match self.timeout_ms {
            Some(millis) => Some(Duration::from_millis(millis)),
            None => default.operation_timeout,
        };

        LedgerConfig::new(
            self.publish_mode,
            operation_timeout,
            default.default_page_size,
            default.max_page_size,
            RelayConfig::default(),
        )
    }
}

impl Command {
    /// Create a SimulationConfig from the `simulate` arguments
    ///
    /// Returns `None` for other subcommands.
    pub fn to_simulation_config(&self) -> Option<SimulationConfig> {
        match self {
            Command::Simulate {
                accounts,
                transfers,
                workers,
                seed,
            } => Some(SimulationConfig::new(
                *accounts,
                *transfers,
                workers.unwrap_or_else(num_cpus::get),
                *seed,
            )),
            Command::Replay { .. } => None,
        }
    }
}
