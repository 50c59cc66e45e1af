//! Benchmark suite for transfer throughput
//!
//! Measures concurrent transfers through the full ledger service (row
//! locks, unit of work, event notification) using the divan benchmarking
//! framework.
//!
//! # Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//! ```
//!
//! # Scenarios
//!
//! - Few accounts: heavy lock contention, many insufficient-funds rejections
//! - Many accounts: transfers mostly touch disjoint rows
//! - Replay: sequential CSV replay of a small recorded session
//!
//! Each simulation scenario runs once with deferred and once with inline
//! event publishing.

use ledger_core::config::{LedgerConfig, PublishMode};
use ledger_core::runner::{ReplayRunner, SimulationConfig, SimulationRunner};
use std::path::Path;

fn main() {
    divan::main();
}

fn run_simulation(accounts: usize, transfers: usize, publish_mode: PublishMode) {
    let ledger = LedgerConfig {
        publish_mode,
        ..LedgerConfig::default()
    };
    let simulation = SimulationConfig::new(accounts, transfers, 4, 42);

    SimulationRunner::new(ledger, simulation)
        .run()
        .expect("Simulation failed");
}

/// 1,000 transfers over 4 accounts, deferred publishing
#[divan::bench]
fn contended_deferred() {
    run_simulation(4, 1_000, PublishMode::Deferred);
}

/// 1,000 transfers over 4 accounts, inline publishing
#[divan::bench]
fn contended_inline() {
    run_simulation(4, 1_000, PublishMode::Inline);
}

/// 1,000 transfers over 256 accounts, deferred publishing
#[divan::bench]
fn spread_deferred() {
    run_simulation(256, 1_000, PublishMode::Deferred);
}

/// 1,000 transfers over 256 accounts, inline publishing
#[divan::bench]
fn spread_inline() {
    run_simulation(256, 1_000, PublishMode::Inline);
}

/// Sequential replay of the happy-path fixture
#[divan::bench]
fn replay_happy_path() {
    let path = Path::new("tests/fixtures/happy_path/input.csv");
    let mut output = Vec::new();

    ReplayRunner::new(LedgerConfig::default())
        .process(path, &mut output)
        .expect("Replay failed");
}
