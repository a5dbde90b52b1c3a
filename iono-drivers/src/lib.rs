//! Chip drivers and device core for the Iono D16 I/O module
//!
//! This crate talks to the hardware through the traits in `iono-hal` and
//! drives the logic in `iono-core`:
//!
//! - Shared SPI bus with a single lock ([`bus::SharedBus`])
//! - 8-channel digital input chips, 5-bit CRC protocol ([`input`])
//! - 8-channel protected output drivers, 7-bit CRC protocol ([`output`])
//! - The device state and pin-level API ([`device::IonoD16`])

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

// This mod MUST go first, so that the others see its macros.
mod fmt;

pub mod bus;
pub mod device;
pub mod input;
pub mod output;

pub use bus::{ChipBus, ChipBusError, SharedBus};
pub use device::IonoD16;
pub use input::InputBank;
pub use output::OutputBank;
