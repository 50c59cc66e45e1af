//! Ledger Core CLI
//!
//! Command-line drivers for the ledger core.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- replay operations.csv > accounts.csv
//! cargo run -- --publish-mode inline replay operations.csv > accounts.csv
//! cargo run -- simulate --accounts 32 --transfers 10000 --workers 8 --seed 7
//! RUST_LOG=debug cargo run -- --json-logs simulate
//! ```
//!
//! `replay` applies the operations of the input CSV in order and writes the
//! final account states to stdout. `simulate` fires concurrent random
//! transfers and verifies that funds are conserved.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (file not found, output failure, violated invariant, etc.)

use ledger_core::cli::{self, Command};
use ledger_core::runner::{ReplayRunner, SimulationRunner};
use ledger_core::telemetry;
use std::process;

fn main() {
    let args = cli::parse_args();
    telemetry::init(args.json_logs);

    if let Err(e) = run(&args) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(args: &cli::CliArgs) -> anyhow::Result<()> {
    let config = args.to_ledger_config();

    match &args.command {
        Command::Replay { input_file } => {
            let mut output = std::io::stdout();
            ReplayRunner::new(config).process(input_file, &mut output)?;
        }
        command @ Command::Simulate { .. } => {
            let simulation = command.to_simulation_config().unwrap_or_default();
            let report = SimulationRunner::new(config, simulation).run()?;
            println!("{}", report);
        }
    }

    Ok(())
}
