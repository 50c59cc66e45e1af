//! Ledger Core Library
//! # Overview
//!
//! This library provides the ledger core of a retail banking backend: accounts,
//! their balances, and the immutable transactions that move money between them.
//! Balance changes spanning two accounts are applied atomically, stay consistent
//! under concurrent requests, and are announced to downstream systems without the
//! announcement ever being able to corrupt the ledger.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Account, Transaction, errors, money rules)
//! - [`core`] - Business logic components:
//!   - [`core::traits`] - Store, unit-of-work and publisher contracts
//!   - [`core::memory_store`] - In-memory store with row locks
//!   - [`core::engine`] - Account lifecycle, deposits and queries
//!   - [`core::transfer`] - Two-account transfers with ordered locking
//! - [`events`] - Event payloads, the in-memory publisher and the outbox relay
//! - [`service`] - The `LedgerService` facade
//! - [`config`] - Publish mode, deadlines, page sizes, relay retry policy
//! - [`io`] / [`runner`] / [`cli`] - CSV replay and simulation drivers
//! - [`telemetry`] - Logging setup
//!
//! # Transaction Types
//!
//! - **Deposit**: Money entering the ledger; has no source account
//! - **Internal**: Transfer between two accounts of the same owner
//! - **External**: Transfer to an account that may belong to another owner
//!
//! # Account States
//!
//! Each account is either `active` or `closed`. Closed accounts keep their
//! history, accept no balance mutation, and can only be reached from a zero
//! balance.

pub mod cli;
pub mod config;
pub mod core;
pub mod events;
pub mod io;
pub mod runner;
pub mod service;
pub mod telemetry;
pub mod types;

pub use config::{LedgerConfig, PublishMode, RelayConfig};
pub use core::{LedgerEngine, MemoryStore, TransferOrchestrator};
pub use events::{EventRelay, InMemoryPublisher, LedgerEvent, Notifier};
pub use service::LedgerService;
pub use types::{
    Account, AccountId, AccountStatus, ErrorKind, LedgerError, Transaction, TransactionFilter,
    TransactionId, TransactionType, TransferKind, TransferRequest, UserId,
};
