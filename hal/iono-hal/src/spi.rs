//! SPI chip exchange abstraction
//!
//! All four signal-conditioning chips sit on one SPI bus and speak the same
//! frame shape: three bytes out, three bytes back, with the chip-select line
//! held asserted for the whole frame.

/// Chip-select identity of one chip on the shared bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipSelect {
    /// Input chip serving pins 1-8
    InputLow,
    /// Input chip serving pins 9-16
    InputHigh,
    /// Output driver serving pins 1-8
    OutputLow,
    /// Output driver serving pins 9-16
    OutputHigh,
}

impl ChipSelect {
    /// All chip selects, in index order
    pub const ALL: [ChipSelect; 4] = [
        ChipSelect::InputLow,
        ChipSelect::InputHigh,
        ChipSelect::OutputLow,
        ChipSelect::OutputHigh,
    ];

    /// Stable index (0-3), usable to address per-chip arrays
    pub const fn index(self) -> usize {
        match self {
            ChipSelect::InputLow => 0,
            ChipSelect::InputHigh => 1,
            ChipSelect::OutputLow => 2,
            ChipSelect::OutputHigh => 3,
        }
    }
}

/// Raw three-word exchange with a chip
///
/// Implementations assert the selected chip's line, clock three bytes out
/// (most significant first, SPI mode 0) while capturing the three bytes
/// shifted back, then release the line.
///
/// Implementations are NOT expected to be thread-safe; the driver core
/// serializes every call behind a single bus lock.
pub trait SpiExchange {
    /// Error type for bus operations
    type Error;

    /// Exchange `words` with the chip behind `cs`, returning the echoed words
    fn exchange(&mut self, cs: ChipSelect, words: [u8; 3]) -> Result<[u8; 3], Self::Error>;

    /// Drive the board status indicator
    ///
    /// On the reference board the indicator shares lines with the chip
    /// selects, so this is called with the bus lock held.
    fn set_indicator(&mut self, on: bool) -> Result<(), Self::Error>;
}
