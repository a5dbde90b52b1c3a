//! Driver configuration
//!
//! Timing and retry parameters of the driver core. The defaults are the
//! values the module is qualified with; a persistence layer outside the core
//! may store and restore them (see the `serde` feature).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Minimum time between two round-robin fault polling phases
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 20;

/// Quiescent period before a protection lockout is released
pub const DEFAULT_LOCKOUT_MS: u32 = 10_000;

/// Attempts per bus transaction before giving up
pub const DEFAULT_RETRIES: u8 = 3;

/// Driver timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DriverConfig {
    /// Minimum interval between fault polling phases (ms)
    pub poll_interval_ms: u32,
    /// Lockout cooldown for over-voltage and thermal protection (ms)
    pub lockout_ms: u32,
    /// Transaction attempts before a bank is flagged as failed
    pub retries: u8,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            lockout_ms: DEFAULT_LOCKOUT_MS,
            retries: DEFAULT_RETRIES,
        }
    }
}

impl DriverConfig {
    /// Attempts actually performed per transaction (never zero)
    pub fn attempts(&self) -> u8 {
        self.retries.max(1)
    }
}
