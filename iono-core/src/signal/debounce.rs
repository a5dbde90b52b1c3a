//! Debounce gate
//!
//! A sample equal to the stable value re-arms the gate. A differing sample
//! is committed only once the time since the last matching sample reaches
//! the debounce interval, so a new level must hold for the whole window and
//! any bounce back restarts it.

/// Debounce state for one sampled signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Debouncer {
    /// Required hold time (ms)
    interval_ms: u32,
    /// Last committed level; `None` until the first commit
    value: Option<bool>,
    /// Time of the last sample that matched `value` (ms)
    last_match_ms: u32,
}

impl Debouncer {
    /// Create a gate with no committed level yet
    ///
    /// The first level is committed once it has been observed for the
    /// interval, counting from `now_ms`.
    pub const fn new(interval_ms: u32, now_ms: u32) -> Self {
        Self {
            interval_ms,
            value: None,
            last_match_ms: now_ms,
        }
    }

    /// Last committed level
    pub fn value(&self) -> Option<bool> {
        self.value
    }

    /// Debounce interval (ms)
    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    /// Feed one sample; returns the new level when a change is committed
    pub fn sample(&mut self, level: bool, now_ms: u32) -> Option<bool> {
        if self.value == Some(level) {
            self.last_match_ms = now_ms;
            return None;
        }
        if now_ms.wrapping_sub(self.last_match_ms) >= self.interval_ms {
            self.value = Some(level);
            self.last_match_ms = now_ms;
            return Some(level);
        }
        None
    }
}
