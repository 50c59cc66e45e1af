//! Operational drivers
//!
//! Each runner builds a fresh in-memory ledger, drives it through
//! [`LedgerService`](crate::service::LedgerService) and reports the outcome.
//!
//! - `replay`: apply a CSV of recorded operations in order
//! - `simulate`: concurrent random transfers with invariant checks

pub mod replay;
pub mod simulate;

pub use replay::{replay, ReplayRunner, ReplaySummary};
pub use simulate::{SimulationConfig, SimulationReport, SimulationRunner};
