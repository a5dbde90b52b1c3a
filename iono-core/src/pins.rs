//! Pin numbering, modes and chip mapping
//!
//! The module exposes 16 bidirectional terminals (D1-D16) and four raw MCU
//! pins (DT1-DT4). Each terminal is wired to one channel of an input chip
//! and one channel of an output driver:
//!
//! ```text
//! pin    input chip  input bit   output chip  output bit
//! D1-D8  0           8 - pin     0            pin - 1
//! D9-D16 1           16 - pin    1            pin - 9
//! ```

use crate::error::Error;

/// Number of conditioned terminals
pub const PIN_COUNT: usize = 16;

/// Number of auxiliary MCU pins
pub const AUX_PIN_COUNT: usize = 4;

/// Channels per chip
pub const CHANNELS_PER_BANK: usize = 8;

/// Chips per family
pub const BANK_COUNT: usize = 2;

/// First terminal pin number
pub const D1: u8 = 1;
/// Last terminal pin number
pub const D16: u8 = 16;
/// First auxiliary pin number (MCU GPIO 26)
pub const DT1: u8 = 26;
/// Second auxiliary pin number
pub const DT2: u8 = 27;
/// Third auxiliary pin number
pub const DT3: u8 = 28;
/// Last auxiliary pin number (MCU GPIO 29)
pub const DT4: u8 = 29;

/// A validated pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pin {
    /// Terminal D1-D16, zero-based index
    D(u8),
    /// Auxiliary DT1-DT4, zero-based index
    Dt(u8),
}

impl Pin {
    /// Resolve a public pin number
    pub fn from_number(number: u8) -> Option<Pin> {
        match number {
            D1..=D16 => Some(Pin::D(number - D1)),
            DT1..=DT4 => Some(Pin::Dt(number - DT1)),
            _ => None,
        }
    }

    /// Public pin number
    pub fn number(self) -> u8 {
        match self {
            Pin::D(index) => index + D1,
            Pin::Dt(index) => index + DT1,
        }
    }

    /// Zero-based index of a terminal pin number
    ///
    /// Operations that only exist for D1-D16 use this to reject
    /// auxiliary and out-of-range numbers.
    pub fn terminal(number: u8) -> Result<usize, Error> {
        match Pin::from_number(number) {
            Some(Pin::D(index)) => Ok(index as usize),
            _ => Err(Error::InvalidPin),
        }
    }
}

/// Configured mode of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinMode {
    /// Never configured
    #[default]
    Unconfigured,
    /// Digital input (terminals optionally with wire-break detection)
    Input,
    /// Plain MCU output (auxiliary pins only)
    Output,
    /// Protected high-side output (terminals only)
    OutputHighSide,
    /// Push-pull output (terminals only)
    OutputPushPull,
}

impl PinMode {
    /// Check if the mode drives the terminal
    pub fn is_output(&self) -> bool {
        matches!(self, PinMode::OutputHighSide | PinMode::OutputPushPull)
    }
}

/// One channel of one chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Channel {
    /// Chip index within its family (0 = pins 1-8, 1 = pins 9-16)
    pub bank: usize,
    /// Bit position inside the chip's registers
    pub bit: u8,
}

/// Input chip channel of terminal `index` (bit order is reversed)
pub fn input_channel(index: usize) -> Channel {
    Channel {
        bank: index / CHANNELS_PER_BANK,
        bit: (CHANNELS_PER_BANK - 1 - index % CHANNELS_PER_BANK) as u8,
    }
}

/// Output chip channel of terminal `index`
pub fn output_channel(index: usize) -> Channel {
    Channel {
        bank: index / CHANNELS_PER_BANK,
        bit: (index % CHANNELS_PER_BANK) as u8,
    }
}

/// Check the output joining rule for terminal `index`
///
/// Outputs are grouped in fours. Within a group the pair containing the
/// pin must be high-side outputs, and the other pair must be high-side
/// outputs or inputs.
pub fn joinable(modes: &[PinMode; PIN_COUNT], index: usize) -> bool {
    let base = index / 4 * 4;
    let (join_pair, companions) = if index % 4 <= 1 {
        ([base, base + 1], [base + 2, base + 3])
    } else {
        ([base + 2, base + 3], [base, base + 1])
    };

    join_pair
        .iter()
        .all(|&i| modes[i] == PinMode::OutputHighSide)
        && companions
            .iter()
            .all(|&i| matches!(modes[i], PinMode::OutputHighSide | PinMode::Input))
}

/// Join-configuration bit controlling output bit `bit` of a chip
///
/// Bit 2 joins channels 0-3, bit 3 joins channels 4-7.
pub fn join_bit(bit: u8) -> u8 {
    if bit <= 3 {
        2
    } else {
        3
    }
}
