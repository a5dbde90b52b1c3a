//! Iono D16 Hardware Abstraction Layer
//!
//! This crate defines the traits the driver core needs from the board.
//! The board support package implements them once; everything above
//! (bank drivers, protection, scheduling, signal conditioning) is
//! board-agnostic.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Host application (Modbus bridge, etc.) │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  iono-drivers (IonoD16, bank drivers)   │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  iono-hal (this crate - traits)         │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Traits
//!
//! - [`spi::SpiExchange`] - Three-word chip exchange on the shared bus
//! - [`gpio::InputPin`], [`gpio::OutputPin`], [`gpio::IoPin`] - Auxiliary pins
//! - [`time::Clock`] - Millisecond and microsecond time base

#![no_std]
#![deny(unsafe_code)]

pub mod gpio;
pub mod spi;
pub mod time;

// Re-export key traits at crate root for convenience
pub use gpio::{InputPin, IoPin, OutputPin};
pub use spi::{ChipSelect, SpiExchange};
pub use time::Clock;
