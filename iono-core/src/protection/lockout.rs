//! Over-voltage and thermal lockout state machines
//!
//! Both interlocks engage as soon as their fault is sampled, re-arm their
//! timestamp on every pass while the fault persists, and release only after
//! the cooldown has elapsed without the fault. On release the channel
//! returns to what the caller last asked for.

/// Snapshot of one output channel taken right after a fault register read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelSample {
    /// Raw (instantaneous) fault flag for this interlock
    pub fault: bool,
    /// Channel currently in push-pull mode
    pub push_pull: bool,
    /// Commanded output level
    pub on: bool,
    /// Lock bit of this interlock
    pub locked: bool,
    /// Time the lock was last (re-)armed (ms)
    pub locked_since_ms: u32,
}

/// Decision for one channel on one protection pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Verdict {
    /// Nothing to do
    Idle,
    /// Set the lock, force the channel to its protected state and
    /// re-arm the lock timestamp
    Engage,
    /// Cooldown elapsed: restore the caller's intent and clear the lock
    Release,
}

/// Protection interlock kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Lockout {
    /// External over-voltage on a high-side channel: hold the switch on
    OverVoltage,
    /// Driver thermal shutdown: revert to high-side and switch off
    Thermal,
}

impl Lockout {
    /// Output level the interlock forces while engaged
    pub const fn forced_level(self) -> bool {
        match self {
            Lockout::OverVoltage => true,
            Lockout::Thermal => false,
        }
    }

    /// Check if the sampled channel must be (or stay) locked
    pub fn engages(self, s: &ChannelSample) -> bool {
        if !s.fault {
            return false;
        }
        match self {
            // High-side channels only; engage when off, hold when locked
            Lockout::OverVoltage => !s.push_pull && (!s.on || s.locked),
            // Push-pull channels that are driving, or already locked
            Lockout::Thermal => (s.push_pull || s.locked) && (s.on || s.locked),
        }
    }

    /// Evaluate one protection pass for a channel
    pub fn evaluate(self, s: &ChannelSample, now_ms: u32, cooldown_ms: u32) -> Verdict {
        if self.engages(s) {
            Verdict::Engage
        } else if s.locked && now_ms.wrapping_sub(s.locked_since_ms) >= cooldown_ms {
            Verdict::Release
        } else {
            Verdict::Idle
        }
    }
}
