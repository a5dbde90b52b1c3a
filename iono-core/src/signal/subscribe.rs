//! Debounced edge subscriptions

use super::debounce::Debouncer;

/// Subscriber callback, invoked with the pin number and the new level
pub type EdgeCallback = fn(u8, bool);

/// One pin subscription
#[derive(Debug, Clone, Copy)]
pub struct Subscription {
    callback: EdgeCallback,
    debouncer: Debouncer,
}

impl Subscription {
    /// Subscribe with a debounce interval starting at `now_ms`
    pub fn new(callback: EdgeCallback, debounce_ms: u32, now_ms: u32) -> Self {
        Self {
            callback,
            debouncer: Debouncer::new(debounce_ms, now_ms),
        }
    }

    /// Last level delivered to the callback
    pub fn value(&self) -> Option<bool> {
        self.debouncer.value()
    }

    /// Sample the pin; calls back on a committed change
    pub fn update(&mut self, pin: u8, level: bool, now_ms: u32) {
        if let Some(level) = self.debouncer.sample(level, now_ms) {
            (self.callback)(pin, level);
        }
    }
}
