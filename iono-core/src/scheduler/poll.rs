//! Round-robin poll phase state machine

/// One step of the fault polling cycle
///
/// Phases alternate between the input and output chip pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollPhase {
    /// Input chips: fault register 1 (and 2 on over-temperature)
    InputFaults,
    /// Output chips: open-load register
    OpenLoad,
    /// Output chips: over-voltage register, then over-voltage lockout
    OverVoltage,
    /// Output chips: re-assert the commanded outputs
    Refresh,
    /// Output chips: thermal register, then thermal lockout
    Thermal,
}

impl PollPhase {
    /// Phase that follows this one
    pub fn next(self) -> Self {
        match self {
            PollPhase::InputFaults => PollPhase::OpenLoad,
            PollPhase::OpenLoad => PollPhase::OverVoltage,
            PollPhase::OverVoltage => PollPhase::Refresh,
            PollPhase::Refresh => PollPhase::Thermal,
            PollPhase::Thermal => PollPhase::InputFaults,
        }
    }
}

/// Time-gated round-robin over [`PollPhase`]
#[derive(Debug, Clone)]
pub struct PollScheduler {
    /// Phase to run on the next qualifying tick
    next: PollPhase,
    /// Time of the last phase run (ms)
    last_ms: u32,
    /// Minimum spacing between phases (ms)
    interval_ms: u32,
}

impl PollScheduler {
    /// Create a scheduler starting at [`PollPhase::InputFaults`]
    pub fn new(interval_ms: u32, now_ms: u32) -> Self {
        Self {
            next: PollPhase::InputFaults,
            last_ms: now_ms,
            interval_ms,
        }
    }

    /// Phase that will run next
    pub fn pending(&self) -> PollPhase {
        self.next
    }

    /// Advance if the interval has elapsed
    ///
    /// Returns the phase to execute on this tick, at most one per call.
    pub fn poll(&mut self, now_ms: u32) -> Option<PollPhase> {
        if now_ms.wrapping_sub(self.last_ms) < self.interval_ms {
            return None;
        }
        let phase = self.next;
        self.next = phase.next();
        self.last_ms = now_ms;
        Some(phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_wraps() {
        let mut phase = PollPhase::InputFaults;
        let expected = [
            PollPhase::OpenLoad,
            PollPhase::OverVoltage,
            PollPhase::Refresh,
            PollPhase::Thermal,
            PollPhase::InputFaults,
        ];
        for want in expected {
            phase = phase.next();
            assert_eq!(phase, want);
        }
    }

    #[test]
    fn test_gated_by_interval() {
        let mut sched = PollScheduler::new(20, 0);
        assert_eq!(sched.poll(0), None);
        assert_eq!(sched.poll(19), None);
        assert_eq!(sched.poll(20), Some(PollPhase::InputFaults));
        // Same tick again does not advance
        assert_eq!(sched.poll(20), None);
        assert_eq!(sched.poll(39), None);
        assert_eq!(sched.poll(40), Some(PollPhase::OpenLoad));
    }

    #[test]
    fn test_one_phase_per_call_after_long_gap() {
        let mut sched = PollScheduler::new(20, 0);
        // A long stall must not burst through several phases
        assert_eq!(sched.poll(1_000), Some(PollPhase::InputFaults));
        assert_eq!(sched.poll(1_001), None);
        assert_eq!(sched.pending(), PollPhase::OpenLoad);
    }

    #[test]
    fn test_full_cycle() {
        let mut sched = PollScheduler::new(20, 0);
        let mut now = 0;
        let mut seen = [None; 6];
        for slot in seen.iter_mut() {
            now += 20;
            *slot = sched.poll(now);
        }
        assert_eq!(
            seen,
            [
                Some(PollPhase::InputFaults),
                Some(PollPhase::OpenLoad),
                Some(PollPhase::OverVoltage),
                Some(PollPhase::Refresh),
                Some(PollPhase::Thermal),
                Some(PollPhase::InputFaults),
            ]
        );
    }

    #[test]
    fn test_timer_wrap() {
        let mut sched = PollScheduler::new(20, u32::MAX - 5);
        assert_eq!(sched.poll(10), None);
        assert_eq!(sched.poll(14), Some(PollPhase::InputFaults));
    }
}
