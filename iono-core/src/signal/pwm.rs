//! Software PWM
//!
//! Timing is driven by the periodic tick, so resolution is bounded by how
//! often the host calls it.

use crate::error::Error;

/// Full-scale duty value
pub const DUTY_FULL_SCALE: u32 = 65_535;

const US_PER_S: u32 = 1_000_000;

/// PWM state of one push-pull pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmChannel {
    /// Cycle length (µs); 0 = disabled
    period_us: u32,
    /// High time per cycle (µs)
    on_us: u32,
    /// Start of the current cycle (µs)
    start_us: u32,
    /// Currently in the high phase
    high: bool,
}

impl PwmChannel {
    /// A disabled channel
    pub const fn disabled() -> Self {
        Self {
            period_us: 0,
            on_us: 0,
            start_us: 0,
            high: false,
        }
    }

    /// Check if the channel is generating
    pub fn is_enabled(&self) -> bool {
        self.period_us > 0
    }

    /// Cycle length (µs)
    pub fn period_us(&self) -> u32 {
        self.period_us
    }

    /// High time per cycle (µs)
    pub fn on_us(&self) -> u32 {
        self.on_us
    }

    /// Stop generating
    pub fn disable(&mut self) {
        self.period_us = 0;
        self.high = false;
    }

    /// Configure frequency and duty (0-65535)
    ///
    /// Returns the level to drive right now: LOW for duty 0 (the channel
    /// is disabled), otherwise HIGH at the start of a new cycle.
    pub fn configure(&mut self, freq_hz: u32, duty: u16, now_us: u32) -> Result<bool, Error> {
        self.disable();
        if duty == 0 {
            return Ok(false);
        }
        if freq_hz == 0 || freq_hz > US_PER_S {
            return Err(Error::InvalidFrequency);
        }
        let period_us = US_PER_S / freq_hz;
        self.on_us = (period_us as u64 * duty as u64 / DUTY_FULL_SCALE as u64) as u32;
        self.period_us = period_us;
        self.start_us = now_us;
        self.high = true;
        Ok(true)
    }

    /// Advance the channel; returns the level to drive on an edge
    pub fn poll(&mut self, now_us: u32) -> Option<bool> {
        if !self.is_enabled() {
            return None;
        }
        let elapsed = now_us.wrapping_sub(self.start_us);
        if elapsed > self.period_us {
            self.start_us = now_us;
            self.high = true;
            Some(true)
        } else if self.high && elapsed > self.on_us {
            self.high = false;
            Some(false)
        } else {
            None
        }
    }
}
