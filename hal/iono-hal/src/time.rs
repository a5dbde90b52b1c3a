//! Monotonic time base
//!
//! Both counters are free-running and wrap; consumers compare them with
//! `wrapping_sub` only.

/// Monotonic clock
pub trait Clock {
    /// Milliseconds since an arbitrary epoch
    fn now_ms(&self) -> u32;

    /// Microseconds since an arbitrary epoch
    fn now_us(&self) -> u32;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }

    fn now_us(&self) -> u32 {
        (**self).now_us()
    }
}
