//! Output protection interlocks
//!
//! Decides when an output channel enters or leaves a timed lockout.
//! Applying the decision (bus writes) is up to the output bank driver.

pub mod lockout;

pub use lockout::{ChannelSample, Lockout, Verdict};
