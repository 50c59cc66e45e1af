//! Ledger configuration
//!
//! `LedgerConfig` collects the knobs of the ledger service: how events are
//! published, the deadline applied to each unit of work, transaction page
//! sizes, and the retry policy of the event relay. Invalid values fall back
//! to defaults with a warning instead of failing startup.

use clap::ValueEnum;
use std::time::Duration;

/// How committed changes are announced on the event bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PublishMode {
    /// Enqueue on the in-process outbox; a background relay publishes with
    /// retries. Ledger operations succeed regardless of bus availability.
    #[default]
    Deferred,

    /// Publish right after commit. A failure is returned to the caller as
    /// `PublishFailure`; the committed change is kept.
    Inline,
}

/// Retry policy of the event relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Publish attempts per event before it is dead-lettered
    pub max_attempts: u32,
    /// Delay before the first retry; doubled after every failure
    pub initial_backoff: Duration,
    /// Upper bound for the retry delay
    pub max_backoff: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RelayConfig {
    /// Create a RelayConfig, replacing invalid values with defaults
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        let default = Self::default();

        let max_attempts = if max_attempts == 0 {
            tracing::warn!(
                max_attempts,
                fallback = default.max_attempts,
                "invalid relay max_attempts, using default"
            );
            default.max_attempts
        } else {
            max_attempts
        };

        let max_backoff = if max_backoff < initial_backoff {
            tracing::warn!(
                ?max_backoff,
                ?initial_backoff,
                "relay max_backoff below initial_backoff, raising it"
            );
            initial_backoff
        } else {
            max_backoff
        };

        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
        }
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }
}

/// Configuration of the ledger service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub publish_mode: PublishMode,

    /// Deadline for each unit of work; `None` disables it
    ///
    /// On expiry the unit is rolled back and the caller receives a transient
    /// persistence failure.
    pub operation_timeout: Option<Duration>,

    /// Page size used when a transaction query asks for limit 0
    pub default_page_size: u32,

    /// Largest page a transaction query may request
    pub max_page_size: u32,

    pub relay: RelayConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            publish_mode: PublishMode::Deferred,
            operation_timeout: Some(Duration::from_secs(5)),
            default_page_size: 20,
            max_page_size: 100,
            relay: RelayConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Create a LedgerConfig, replacing invalid values with defaults
    pub fn new(
        publish_mode: PublishMode,
        operation_timeout: Option<Duration>,
        default_page_size: u32,
        max_page_size: u32,
        relay: RelayConfig,
    ) -> Self {
        let default = Self::default();

        let operation_timeout = match operation_timeout {
            Some(timeout) if timeout.is_zero() => {
                tracing::warn!("zero operation timeout, disabling the deadline");
                None
            }
            other => other,
        };

        let max_page_size = if max_page_size == 0 {
            tracing::warn!(
                max_page_size,
                fallback = default.max_page_size,
                "invalid max_page_size, using default"
            );
            default.max_page_size
        } else {
            max_page_size
        };

        let default_page_size = if default_page_size == 0 {
            tracing::warn!(
                default_page_size,
                fallback = default.default_page_size.min(max_page_size),
                "invalid default_page_size, using default"
            );
            default.default_page_size.min(max_page_size)
        } else if default_page_size > max_page_size {
            tracing::warn!(
                default_page_size,
                max_page_size,
                "default_page_size above max_page_size, clamping"
            );
            max_page_size
        } else {
            default_page_size
        };

        Self {
            publish_mode,
            operation_timeout,
            default_page_size,
            max_page_size,
            relay,
        }
    }

    /// Effective page size for a requested limit
    pub fn page_limit(&self, requested: u32) -> u32 {
        match requested {
            0 => self.default_page_size,
            n => n.min(self.max_page_size),
        }
    }
}
