//! Signal conditioning above raw pin access
//!
//! - Debounce gate shared by subscriptions and links
//! - Edge subscriptions with callbacks
//! - Input-to-output link rules
//! - Software PWM for push-pull outputs

pub mod debounce;
pub mod link;
pub mod pwm;
pub mod subscribe;

pub use debounce::Debouncer;
pub use link::{LinkAction, LinkMode, LinkRule};
pub use pwm::PwmChannel;
pub use subscribe::{EdgeCallback, Subscription};
