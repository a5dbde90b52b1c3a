//! Board-agnostic core logic for the Iono D16 driver
//!
//! This crate contains all logic that does not touch the bus:
//!
//! - Pin numbering, pin modes and the pin-to-chip mapping
//! - Output joining rule
//! - Sticky fault memories
//! - Over-voltage and thermal lockout decisions
//! - Round-robin fault polling schedule
//! - Signal conditioning (debounce, subscriptions, links, software PWM)
//! - Driver configuration and error types

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod bits;
pub mod config;
pub mod error;
pub mod pins;
pub mod protection;
pub mod scheduler;
pub mod signal;

pub use config::DriverConfig;
pub use error::Error;
pub use pins::{Channel, Pin, PinMode};
