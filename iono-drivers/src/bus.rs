//! Shared SPI bus
//!
//! The four chips share one SPI bus, and the bus is shared between two
//! execution contexts (the periodic tick and foreground API calls, possibly
//! on different cores). Every physical exchange, and every chained
//! command + confirmation pair, runs inside one critical section of a
//! single [`SharedBus`] lock.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;
use iono_hal::{ChipSelect, SpiExchange};

/// Process-wide lock around an [`SpiExchange`]
///
/// Use `CriticalSectionRawMutex` when the bus is reachable from more than
/// one core or from interrupts; `NoopRawMutex` when it is not.
pub struct SharedBus<M: RawMutex, S> {
    inner: Mutex<M, RefCell<S>>,
}

impl<M: RawMutex, S> SharedBus<M, S> {
    /// Wrap a bus
    pub const fn new(spi: S) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(spi)),
        }
    }

    /// Run `f` with exclusive access to the bus
    ///
    /// Everything `f` does is one critical section. `f` must not call back
    /// into the same `SharedBus`.
    pub fn transaction<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

impl<M: RawMutex, S: SpiExchange> SharedBus<M, S> {
    /// Single guarded three-word exchange
    pub fn exchange(&self, cs: ChipSelect, words: [u8; 3]) -> Result<[u8; 3], S::Error> {
        self.transaction(|spi| spi.exchange(cs, words))
    }

    /// Drive the status indicator under the bus lock
    pub fn set_indicator(&self, on: bool) -> Result<(), S::Error> {
        self.transaction(|spi| spi.set_indicator(on))
    }
}

/// Errors from [`ChipBus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipBusError<S, P> {
    /// SPI transfer failed
    Spi(S),
    /// Chip-select line could not be driven
    ChipSelect(P),
}

/// [`SpiExchange`] over an `embedded-hal` SPI bus and four chip-select lines
///
/// Chip selects are active low and indexed by [`ChipSelect::index`].
pub struct ChipBus<SPI, CS> {
    spi: SPI,
    cs: [CS; 4],
}

impl<SPI, CS> ChipBus<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    /// Take ownership of the bus and release every chip select
    pub fn new(spi: SPI, cs: [CS; 4]) -> Result<Self, ChipBusError<SPI::Error, CS::Error>> {
        let mut bus = Self { spi, cs };
        for line in bus.cs.iter_mut() {
            line.set_high().map_err(ChipBusError::ChipSelect)?;
        }
        Ok(bus)
    }

    /// Give back the bus and the chip-select lines
    pub fn release(self) -> (SPI, [CS; 4]) {
        (self.spi, self.cs)
    }

    fn line(&mut self, cs: ChipSelect) -> &mut CS {
        &mut self.cs[cs.index()]
    }
}

impl<SPI, CS> SpiExchange for ChipBus<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    type Error = ChipBusError<SPI::Error, CS::Error>;

    fn exchange(&mut self, cs: ChipSelect, words: [u8; 3]) -> Result<[u8; 3], Self::Error> {
        let mut frame = words;
        self.line(cs).set_low().map_err(ChipBusError::ChipSelect)?;
        let transfer = self
            .spi
            .transfer_in_place(&mut frame)
            .and_then(|()| self.spi.flush());
        // Release even if the transfer failed
        self.line(cs).set_high().map_err(ChipBusError::ChipSelect)?;
        transfer.map_err(ChipBusError::Spi)?;
        Ok(frame)
    }

    fn set_indicator(&mut self, on: bool) -> Result<(), Self::Error> {
        // The indicator latch is clocked by a dummy frame to the low input
        // chip while the high input chip is selected; the low output chip
        // select carries the indicator level.
        if on {
            self.line(ChipSelect::OutputLow)
                .set_low()
                .map_err(ChipBusError::ChipSelect)?;
        }
        self.line(ChipSelect::InputHigh)
            .set_low()
            .map_err(ChipBusError::ChipSelect)?;
        let latched = self.exchange(ChipSelect::InputLow, [0; 3]);
        self.line(ChipSelect::InputHigh)
            .set_high()
            .map_err(ChipBusError::ChipSelect)?;
        self.line(ChipSelect::OutputLow)
            .set_high()
            .map_err(ChipBusError::ChipSelect)?;
        latched.map(|_| ())
    }
}
