//! Input-to-output link rules
//!
//! A link watches one input pin through a debounce gate and acts on one
//! output pin each time the gate commits a change.

use super::debounce::Debouncer;

/// What a link does with a committed input change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkMode {
    /// Link disabled
    #[default]
    None,
    /// Output copies the input
    Follow,
    /// Output copies the inverted input
    Invert,
    /// Output toggles on every committed change
    FlipOnAny,
    /// Output toggles when the input goes high
    FlipOnRise,
    /// Output toggles when the input goes low
    FlipOnFall,
}

/// Output action requested by a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkAction {
    /// Drive the output to a level
    Write(bool),
    /// Invert the output
    Toggle,
}

impl LinkMode {
    /// Action for a committed input `level`
    pub fn action(self, level: bool) -> Option<LinkAction> {
        match self {
            LinkMode::None => None,
            LinkMode::Follow => Some(LinkAction::Write(level)),
            LinkMode::Invert => Some(LinkAction::Write(!level)),
            LinkMode::FlipOnAny => Some(LinkAction::Toggle),
            LinkMode::FlipOnRise => level.then_some(LinkAction::Toggle),
            LinkMode::FlipOnFall => (!level).then_some(LinkAction::Toggle),
        }
    }
}

/// One (input, output) link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkRule {
    mode: LinkMode,
    debouncer: Debouncer,
}

impl LinkRule {
    /// A rule that never acts
    pub const DISABLED: LinkRule = LinkRule {
        mode: LinkMode::None,
        debouncer: Debouncer::new(0, 0),
    };

    /// Create a rule whose debounce window starts at `now_ms`
    pub fn new(mode: LinkMode, debounce_ms: u32, now_ms: u32) -> Self {
        Self {
            mode,
            debouncer: Debouncer::new(debounce_ms, now_ms),
        }
    }

    /// Configured mode
    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    /// Check if the rule does anything
    pub fn is_active(&self) -> bool {
        self.mode != LinkMode::None
    }

    /// Sample the input; returns the output action on a committed change
    pub fn update(&mut self, level: bool, now_ms: u32) -> Option<LinkAction> {
        if !self.is_active() {
            return None;
        }
        let level = self.debouncer.sample(level, now_ms)?;
        self.mode.action(level)
    }
}

impl Default for LinkRule {
    fn default() -> Self {
        Self::DISABLED
    }
}
