//! Core business logic module
//!
//! This module contains the ledger components:
//! - `traits` - Collaborator contracts (stores, unit of work, publisher)
//! - `memory_store` - In-memory store backing tests, replays and simulations
//! - `engine` - Account lifecycle, deposits and queries
//! - `transfer` - Two-account transfers with ordered locking

pub mod engine;
pub mod memory_store;
pub mod traits;
pub mod transfer;

pub use engine::LedgerEngine;
pub use memory_store::MemoryStore;
pub use traits::{
    AccountStore, Committed, EventPublisher, LedgerStore, TransactionLog, UnitOfWork,
};
pub use transfer::TransferOrchestrator;
