//! Concurrent transfer simulation
//!
//! Opens a set of funded accounts, fires random transfers between them from
//! many tasks at once, then checks that no money was created or destroyed
//! and that no balance went negative.
//!
//! The transfer plan is drawn from a seeded `StdRng`, so a run is
//! reproducible in what it attempts; which transfers win the race for a
//! balance still depends on scheduling.

use anyhow::{bail, Context};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::LedgerConfig;
use crate::core::MemoryStore;
use crate::events::InMemoryPublisher;
use crate::service::LedgerService;
use crate::types::{
    Account, AccountId, ErrorKind, LedgerError, TransferKind, TransferRequest, UserId,
};

/// Currency every simulated account is opened in
const SIMULATION_CURRENCY: &str = "USD";

/// Shape of a simulation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Number of accounts to open
    pub accounts: usize,
    /// Number of transfers to attempt
    pub transfers: usize,
    /// Worker threads of the runtime
    pub workers: usize,
    /// Seed of the transfer plan
    pub seed: u64,
    /// Balance each account starts with
    pub initial_balance: Decimal,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            accounts: 16,
            transfers: 1000,
            workers: num_cpus::get(),
            seed: 42,
            initial_balance: Decimal::new(100000, 2),
        }
    }
}

impl SimulationConfig {
    /// Create a SimulationConfig, replacing invalid values with defaults
    pub fn new(accounts: usize, transfers: usize, workers: usize, seed: u64) -> Self {
        let default = Self::default();

        let accounts = if accounts < 2 {
            tracing::warn!(
                accounts,
                fallback = default.accounts,
                "a simulation needs at least two accounts, using default"
            );
            default.accounts
        } else {
            accounts
        };

        let workers = if workers == 0 {
            tracing::warn!(
                workers,
                fallback = default.workers,
                "invalid worker count, using default"
            );
            default.workers
        } else {
            workers
        };

        Self {
            accounts,
            transfers,
            workers,
            seed,
            ..default
        }
    }
}

/// Outcome of a simulation run
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub accounts: usize,
    pub attempted: usize,
    pub committed: usize,
    pub insufficient_funds: usize,
    pub other_failures: usize,
    /// Sum of all balances after the run
    pub total_balance: Decimal,
    pub elapsed: Duration,
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "accounts:           {}", self.accounts)?;
        writeln!(f, "transfers:          {}", self.attempted)?;
        writeln!(f, "committed:          {}", self.committed)?;
        writeln!(f, "insufficient funds: {}", self.insufficient_funds)?;
        writeln!(f, "other failures:     {}", self.other_failures)?;
        writeln!(f, "total balance:      {}", self.total_balance)?;
        write!(f, "elapsed:            {:?}", self.elapsed)
    }
}

/// Runs a seeded transfer storm against a fresh in-memory ledger
#[derive(Debug, Clone)]
pub struct SimulationRunner {
    ledger: LedgerConfig,
    simulation: SimulationConfig,
}

impl SimulationRunner {
    pub fn new(ledger: LedgerConfig, simulation: SimulationConfig) -> Self {
        Self { ledger, simulation }
    }

    /// Run the simulation on a dedicated multi-thread runtime
    ///
    /// # Errors
    ///
    /// Returns an error if setup fails, or if the final state breaks
    /// conservation of funds or holds a negative balance.
    pub fn run(&self) -> anyhow::Result<SimulationReport> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.simulation.workers)
            .enable_all()
            .build()
            .context("Failed to create tokio runtime")?;

        runtime.block_on(self.run_async())
    }

    /// Run the simulation on the current runtime
    pub async fn run_async(&self) -> anyhow::Result<SimulationReport> {
        let config = &self.simulation;
        let store = MemoryStore::new();
        let publisher = Arc::new(InMemoryPublisher::new());
        let service = Arc::new(LedgerService::new(
            Arc::new(store.clone()),
            publisher,
            self.ledger.clone(),
        ));

        let accounts = open_accounts(&service, config)
            .await
            .context("Failed to open simulation accounts")?;
        let plan = plan_transfers(&accounts, config);

        tracing::info!(
            accounts = accounts.len(),
            transfers = plan.len(),
            workers = config.workers,
            seed = config.seed,
            "simulation started"
        );

        let started = Instant::now();
        let handles: Vec<_> = plan
            .into_iter()
            .map(|request| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.transfer(request).await })
            })
            .collect();
        let results = futures::future::join_all(handles).await;
        let elapsed = started.elapsed();

        let mut report = SimulationReport {
            accounts: accounts.len(),
            attempted: results.len(),
            committed: 0,
            insufficient_funds: 0,
            other_failures: 0,
            total_balance: Decimal::ZERO,
            elapsed,
        };
        for result in results {
            match result.context("transfer task panicked")? {
                Ok(_) => report.committed += 1,
                Err(e) if e.kind() == ErrorKind::InsufficientFunds => {
                    report.insufficient_funds += 1
                }
                Err(e) => {
                    tracing::warn!(error = %e, "transfer failed");
                    report.other_failures += 1;
                }
            }
        }

        if let Ok(service) = Arc::try_unwrap(service) {
            let dead_letters = service.shutdown().await;
            if !dead_letters.is_empty() {
                tracing::warn!(count = dead_letters.len(), "events left undelivered");
            }
        }

        let final_accounts = store.all_accounts()?;
        report.total_balance = verify_invariants(&final_accounts, config)?;

        tracing::info!(
            committed = report.committed,
            insufficient_funds = report.insufficient_funds,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "simulation finished"
        );
        Ok(report)
    }
}

/// Owner of the simulated account at `index`; pairs of accounts share a
/// user so the plan mixes internal and external transfers
fn owner_of(index: usize) -> UserId {
    (index / 2) as UserId + 1
}

async fn open_accounts(
    service: &LedgerService,
    config: &SimulationConfig,
) -> Result<Vec<Account>, LedgerError> {
    let mut accounts = Vec::with_capacity(config.accounts);
    for index in 0..config.accounts {
        let user_id = owner_of(index);
        let account = service
            .create_account(user_id, "checking", SIMULATION_CURRENCY)
            .await?;
        let (account, _) = service
            .deposit(user_id, account.id, config.initial_balance)
            .await?;
        accounts.push(account);
    }
    Ok(accounts)
}

fn plan_transfers(accounts: &[Account], config: &SimulationConfig) -> Vec<TransferRequest> {
    if accounts.len() < 2 {
        return Vec::new();
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    // Up to a quarter of the starting balance, in cents
    let max_cents = (config.initial_balance * Decimal::new(25, 0))
        .trunc()
        .to_i64()
        .unwrap_or(1)
        .max(1);

    (0..config.transfers)
        .map(|_| {
            let from = rng.gen_range(0..accounts.len());
            let mut to = rng.gen_range(0..accounts.len() - 1);
            if to >= from {
                to += 1;
            }
            let (source, destination): (&Account, &Account) = (&accounts[from], &accounts[to]);
            let kind = if source.user_id == destination.user_id {
                TransferKind::Internal
            } else {
                TransferKind::External
            };

            TransferRequest {
                user_id: source.user_id,
                from_account_id: source.id,
                to_account_id: destination.id,
                amount: Decimal::new(rng.gen_range(1..=max_cents), 2),
                description: format!("simulated {} -> {}", source.id, destination.id),
                kind,
            }
        })
        .collect()
}

/// Check conservation of funds and non-negative balances
///
/// Returns the total balance on success.
fn verify_invariants(accounts: &[Account], config: &SimulationConfig) -> anyhow::Result<Decimal> {
    let negative: Vec<AccountId> = accounts
        .iter()
        .filter(|account| account.balance < Decimal::ZERO)
        .map(|account| account.id)
        .collect();
    if !negative.is_empty() {
        bail!("negative balance on accounts {:?}", negative);
    }

    let total: Decimal = accounts.iter().map(|account| account.balance).sum();
    let expected = config.initial_balance * Decimal::from(accounts.len() as u64);
    if total != expected {
        bail!("funds not conserved: expected {}, found {}", expected, total);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn small(seed: u64) -> SimulationConfig {
        SimulationConfig {
            accounts: 6,
            transfers: 200,
            workers: 4,
            seed,
            initial_balance: Decimal::new(5000, 2),
        }
    }

    #[rstest]
    #[case(1)]
    #[case(7)]
    #[case(42)]
    fn test_simulation_conserves_funds(#[case] seed: u64) {
        let report = SimulationRunner::new(LedgerConfig::default(), small(seed))
            .run()
            .unwrap();

        assert_eq!(report.attempted, 200);
        assert_eq!(report.total_balance, Decimal::new(30000, 2));
        assert_eq!(
            report.committed + report.insufficient_funds + report.other_failures,
            200
        );
        assert_eq!(report.other_failures, 0);
    }

    #[test]
    fn test_plan_is_seeded_and_never_self_transfers() {
        let now = chrono::Utc::now();
        let accounts: Vec<Account> = (1..=4)
            .map(|id| Account {
                id,
                user_id: owner_of(id as usize - 1),
                account_type: "checking".to_string(),
                currency: "USD".to_string(),
                balance: Decimal::new(5000, 2),
                status: crate::types::AccountStatus::Active,
                version: 1,
                created_at: now,
                updated_at: now,
            })
            .collect();

        let first = plan_transfers(&accounts, &small(3));
        let second = plan_transfers(&accounts, &small(3));

        assert_eq!(first, second);
        assert!(first.iter().all(|t| t.from_account_id != t.to_account_id));
        assert!(first.iter().all(|t| t.amount > Decimal::ZERO));
        assert!(first.iter().any(|t| t.kind == TransferKind::Internal));
        assert!(first.iter().any(|t| t.kind == TransferKind::External));
    }

    #[rstest]
    #[case::too_few_accounts(1, 4, 16, 4)]
    #[case::zero_workers(8, 0, 8, num_cpus::get())]
    fn test_config_fallbacks(
        #[case] accounts: usize,
        #[case] workers: usize,
        #[case] expected_accounts: usize,
        #[case] expected_workers: usize,
    ) {
        let config = SimulationConfig::new(accounts, 10, workers, 1);
        assert_eq!(config.accounts, expected_accounts);
        assert_eq!(config.workers, expected_workers);
    }
}
