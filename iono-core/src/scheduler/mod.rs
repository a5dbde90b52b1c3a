//! Fault polling scheduler
//!
//! Spreads the slow fault-register reads over successive ticks so that a
//! single tick never stacks more than one exchange per chip.

pub mod poll;

pub use poll::{PollPhase, PollScheduler};
