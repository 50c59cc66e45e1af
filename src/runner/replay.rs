//! Replay of recorded ledger operations
//!
//! Applies the rows of an operation CSV to a fresh in-memory ledger, in
//! file order, and writes the resulting accounts as CSV.
//!
//! # Architecture
//!
//! ```text
//! ReplayRunner
//!     ├── OperationReader (streaming CSV rows)
//!     ├── LedgerService
//!     │     ├── MemoryStore
//!     │     └── InMemoryPublisher (via the notifier)
//!     └── write_accounts_csv
//! ```
//!
//! Rows the ledger rejects are logged and skipped; only I/O and runtime
//! failures abort the replay.

use anyhow::{anyhow, Context};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::config::LedgerConfig;
use crate::core::MemoryStore;
use crate::events::InMemoryPublisher;
use crate::io::{write_accounts_csv, LedgerOperation, OperationReader};
use crate::service::LedgerService;
use crate::types::LedgerError;

/// Counters reported after a replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Operations the ledger accepted
    pub applied: usize,
    /// Operations the ledger refused
    pub rejected: usize,
    /// Rows that did not parse into an operation
    pub malformed: usize,
}

/// Replays an operation file through a fresh ledger
#[derive(Debug, Clone)]
pub struct ReplayRunner {
    config: LedgerConfig,
}

impl ReplayRunner {
    pub fn new(config: LedgerConfig) -> Self {
        Self { config }
    }

    /// Replay `input_path` and write the final accounts to `output`
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot start, the input cannot be
    /// opened, or the output cannot be written.
    pub fn process(&self, input_path: &Path, output: &mut dyn Write) -> anyhow::Result<ReplaySummary> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to create tokio runtime")?;

        runtime.block_on(async {
            let reader = OperationReader::new(input_path).map_err(|e| anyhow!(e))?;

            let store = MemoryStore::new();
            let publisher = Arc::new(InMemoryPublisher::new());
            let service =
                LedgerService::new(Arc::new(store.clone()), publisher, self.config.clone());

            let summary = replay(&service, reader).await;

            let dead_letters = service.shutdown().await;
            if !dead_letters.is_empty() {
                tracing::warn!(count = dead_letters.len(), "events left undelivered");
            }

            let accounts = store.all_accounts()?;
            write_accounts_csv(&accounts, output).map_err(|e| anyhow!(e))?;

            tracing::info!(
                applied = summary.applied,
                rejected = summary.rejected,
                malformed = summary.malformed,
                accounts = accounts.len(),
                "replay finished"
            );
            Ok::<_, anyhow::Error>(summary)
        })
    }
}

/// Apply operations one after another, continuing past failures
pub async fn replay<I>(service: &LedgerService, operations: I) -> ReplaySummary
where
    I: IntoIterator<Item = Result<LedgerOperation, String>>,
{
    let mut summary = ReplaySummary::default();

    for (index, parsed) in operations.into_iter().enumerate() {
        let operation = match parsed {
            Ok(operation) => operation,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed row");
                summary.malformed += 1;
                continue;
            }
        };

        match apply(service, operation).await {
            Ok(()) => summary.applied += 1,
            Err(e) => {
                tracing::warn!(row = index + 1, kind = %e.kind(), error = %e, "operation rejected");
                summary.rejected += 1;
            }
        }
    }

    summary
}

async fn apply(service: &LedgerService, operation: LedgerOperation) -> Result<(), LedgerError> {
    match operation {
        LedgerOperation::Open {
            user_id,
            account_type,
            currency,
        } => {
            service
                .create_account(user_id, &account_type, &currency)
                .await?;
        }
        LedgerOperation::Deposit {
            user_id,
            account_id,
            amount,
        } => {
            service.deposit(user_id, account_id, amount).await?;
        }
        LedgerOperation::Transfer(request) => {
            service.transfer(request).await?;
        }
        LedgerOperation::Close {
            user_id,
            account_id,
        } => {
            service.close_account(user_id, account_id).await?;
        }
    }
    Ok(())
}
