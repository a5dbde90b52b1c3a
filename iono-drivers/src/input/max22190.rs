//! 8-channel industrial digital input chip (SPI, 5-bit CRC mode)
//!
//! # Frame format
//!
//! Every exchange is three bytes in each direction:
//! - Byte 1: register address, bit 7 set for a write
//! - Byte 2: data (0 for reads)
//! - Byte 3: 5-bit CRC in bits 4..0
//!
//! The chip answers with the current input levels, the register content
//! and its own CRC over the echo. The CRC covers the 19 bits above the
//! CRC field (seed `0b00111`, polynomial `0b110101`).

use iono_core::bits::{self, StickyBits};
use iono_core::Error;
use iono_hal::{ChipSelect, SpiExchange};

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::bus::SharedBus;

/// Register addresses
pub mod reg {
    /// Wire-break flags, one bit per channel
    pub const WB: u8 = 0x00;
    /// Chip-wide fault register 1
    pub const FAULT1: u8 = 0x04;
    /// Filter/wire-break configuration of channel 0; channel n is at
    /// `FLT1 + 2 * n`
    pub const FLT1: u8 = 0x06;
    /// Chip-wide fault register 2
    pub const FAULT2: u8 = 0x1C;
    /// Fault register 2 source enables
    pub const FAULT2EN: u8 = 0x1E;
}

/// Write flag in the address byte
pub const WRITE: u8 = 0x80;

/// FAULT1: alarm temperature threshold 1 exceeded
pub const FAULT1_ALRMT1: u8 = 3;
/// FAULT1: alarm temperature threshold 2 exceeded
pub const FAULT1_ALRMT2: u8 = 4;
/// FAULT1: one of the FAULT2 sources is active
pub const FAULT1_FAULT2: u8 = 5;
/// FAULT2: over-temperature shutdown
pub const FAULT2_OTSHDN: u8 = 4;
/// FAULT2EN value enabling every source
pub const FAULT2EN_ALL: u8 = 0x3F;

/// FLTx: wire-break detection enable
pub const FLT_WBE: u8 = 0x10;
/// FLTx: filter delay/bypass bits
pub const FLT_FILTER_MASK: u8 = 0x0F;

/// CRC seed placed in the CRC field before the division
pub const CRC_SEED: u8 = 0x07;
/// CRC polynomial, 6 bits including the implicit top term
pub const CRC_POLY: u8 = 0x35;

const CRC_MASK: u8 = 0x1F;

/// 5-bit CRC over the frame `(d2, d1, d0)`
///
/// The low 5 bits of `d0` are the CRC field and are replaced by the seed;
/// its top 3 bits are part of the checked payload.
pub const fn crc5(d2: u8, d1: u8, d0: u8) -> u8 {
    const LENGTH: u32 = 19;

    let frame = ((d2 as u32) << 16) | ((d1 as u32) << 8) | d0 as u32;
    let frame = (frame & 0xFF_FFE0) | CRC_SEED as u32;

    // The first step consumes the top 6 bits at once
    let mut step = ((frame & 0xFC_0000) >> 18) as u8;
    if step & 0x20 != 0 {
        step ^= CRC_POLY;
    }

    let mut i = 0;
    while i < LENGTH - 1 {
        let next = ((frame >> (LENGTH - 2 - i)) & 1) as u8;
        step = ((step & CRC_MASK) << 1) | next;
        if step & 0x20 != 0 {
            step ^= CRC_POLY;
        }
        i += 1;
    }

    step & CRC_MASK
}

/// Check an echoed frame against its CRC field
pub const fn echo_valid(echo: [u8; 3]) -> bool {
    echo[2] & CRC_MASK == crc5(echo[0], echo[1], echo[2])
}

/// One input chip (8 channels)
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InputBank {
    cs: ChipSelect,
    /// Last transaction failed on every attempt
    error: bool,
    /// Input levels from the last good echo
    inputs: u8,
    /// Raw wire-break flags from the last poll
    wire_open: u8,
    /// Raw FAULT1 from the last poll
    fault1: u8,
    /// Raw FAULT2 from the last poll
    fault2: u8,
    /// Shadow of the FLTx registers
    filter: [u8; 8],
    wire_break_mem: StickyBits,
    alarm_t1_mem: StickyBits,
    alarm_t2_mem: StickyBits,
    over_temp_mem: StickyBits,
}

impl InputBank {
    /// Create the driver state for the chip behind `cs`
    pub const fn new(cs: ChipSelect) -> Self {
        Self {
            cs,
            error: false,
            inputs: 0,
            wire_open: 0,
            fault1: 0,
            fault2: 0,
            filter: [0; 8],
            wire_break_mem: StickyBits::new(),
            alarm_t1_mem: StickyBits::new(),
            alarm_t2_mem: StickyBits::new(),
            over_temp_mem: StickyBits::new(),
        }
    }

    /// Chip select of this chip
    pub fn chip_select(&self) -> ChipSelect {
        self.cs
    }

    /// Check if the last transaction failed
    pub fn error(&self) -> bool {
        self.error
    }

    /// Input levels, bit 7 = lowest-numbered pin
    pub fn inputs(&self) -> u8 {
        self.inputs
    }

    /// Level of channel `bit`
    pub fn level(&self, bit: u8) -> bool {
        bits::bit(self.inputs, bit)
    }

    /// Raw wire-break flags
    pub fn wire_open(&self) -> u8 {
        self.wire_open
    }

    /// Raw fault register 1
    pub fn fault1(&self) -> u8 {
        self.fault1
    }

    /// Raw fault register 2
    pub fn fault2(&self) -> u8 {
        self.fault2
    }

    /// Shadowed FLTx value of channel `bit`
    pub fn filter(&self, bit: u8) -> u8 {
        self.filter[bit as usize]
    }

    /// Read-and-clear the wire-break memory of channel `bit`
    pub fn take_wire_break(&mut self, bit: u8) -> bool {
        self.wire_break_mem.take(bit)
    }

    /// Read-and-clear the alarm threshold 1 memory of channel `bit`
    pub fn take_alarm_t1(&mut self, bit: u8) -> bool {
        self.alarm_t1_mem.take(bit)
    }

    /// Read-and-clear the alarm threshold 2 memory of channel `bit`
    pub fn take_alarm_t2(&mut self, bit: u8) -> bool {
        self.alarm_t2_mem.take(bit)
    }

    /// Read-and-clear the over-temperature memory of channel `bit`
    pub fn take_over_temperature(&mut self, bit: u8) -> bool {
        self.over_temp_mem.take(bit)
    }

    /// Send one frame, retrying until the echo checks out
    ///
    /// On success the input snapshot is refreshed from the echo and the
    /// register byte is returned. On failure nothing but the error flag
    /// changes.
    fn transfer<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
        address: u8,
        data: u8,
    ) -> Result<u8, Error> {
        let frame = [address, data, crc5(address, data, 0)];

        for attempt in 0..attempts {
            match bus.exchange(self.cs, frame) {
                Ok(echo) if echo_valid(echo) => {
                    self.error = false;
                    self.inputs = echo[0];
                    return Ok(echo[1]);
                }
                _ => trace!("input {}: retry {}", self.cs, attempt),
            }
        }

        self.error = true;
        warn!("input {}: no valid echo for register {=u8:#x}", self.cs, address & !WRITE);
        Err(Error::Transport)
    }

    /// Read a register
    pub fn read_register<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
        address: u8,
    ) -> Result<u8, Error> {
        self.transfer(bus, attempts, address, 0)
    }

    /// Write a register
    pub fn write_register<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
        address: u8,
        value: u8,
    ) -> Result<(), Error> {
        self.transfer(bus, attempts, WRITE | address, value).map(|_| ())
    }

    /// Enable every fault register 2 source
    pub fn enable_fault2<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
    ) -> Result<(), Error> {
        self.write_register(bus, attempts, reg::FAULT2EN, FAULT2EN_ALL)
    }

    /// Enable or disable wire-break detection on channel `bit`
    ///
    /// The filter bits of the channel are preserved.
    pub fn configure_wire_break<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
        bit: u8,
        enabled: bool,
    ) -> Result<(), Error> {
        let index = bit as usize;
        let value = (self.filter[index] & FLT_FILTER_MASK) | if enabled { FLT_WBE } else { 0 };
        self.write_register(bus, attempts, reg::FLT1 + 2 * bit, value)?;
        self.filter[index] = value;
        Ok(())
    }

    /// Read the wire-break register and latch it
    ///
    /// Also refreshes the input snapshot; run on every tick.
    pub fn refresh<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
    ) -> Result<(), Error> {
        self.wire_open = self.read_register(bus, attempts, reg::WB)?;
        self.wire_break_mem.latch(self.wire_open);
        Ok(())
    }

    /// Read the chip-wide fault registers and latch them
    ///
    /// Temperature alarms and over-temperature shutdown are chip-wide and
    /// latch into every channel.
    pub fn poll_faults<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
    ) -> Result<(), Error> {
        self.fault1 = self.read_register(bus, attempts, reg::FAULT1)?;
        self.alarm_t1_mem
            .latch_all_if(bits::bit(self.fault1, FAULT1_ALRMT1));
        self.alarm_t2_mem
            .latch_all_if(bits::bit(self.fault1, FAULT1_ALRMT2));

        if bits::bit(self.fault1, FAULT1_FAULT2) {
            self.fault2 = self.read_register(bus, attempts, reg::FAULT2)?;
            self.over_temp_mem
                .latch_all_if(bits::bit(self.fault2, FAULT2_OTSHDN));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_crc5_vectors() {
        assert_eq!(crc5(0x00, 0x00, 0x00), 0x07);
        assert_eq!(crc5(reg::FAULT1, 0x00, 0x00), 0x0F);
        assert_eq!(crc5(reg::FAULT2, 0x00, 0x00), 0x0A);
        assert_eq!(crc5(WRITE | reg::FAULT2EN, FAULT2EN_ALL, 0x00), 0x0F);
        assert_eq!(crc5(WRITE | reg::FLT1, FLT_WBE, 0x00), 0x01);
        assert_eq!(crc5(0xA5, 0x5A, 0x00), 0x15);
        assert_eq!(crc5(0xFF, 0xFF, 0x00), 0x02);
    }

    #[test]
    fn test_crc_field_is_ignored() {
        for field in 0..=CRC_MASK {
            assert_eq!(crc5(0x12, 0x34, field), crc5(0x12, 0x34, 0));
        }
        // The bits above the field are payload
        assert_ne!(crc5(0x12, 0x34, 0xE0), crc5(0x12, 0x34, 0));
    }

    #[test]
    fn test_echo_validation() {
        let echo = [0x81, 0x00, crc5(0x81, 0x00, 0)];
        assert!(echo_valid(echo));

        let mut corrupted = echo;
        corrupted[1] ^= 0x04;
        assert!(!echo_valid(corrupted));
    }

    proptest! {
        #[test]
        fn prop_own_crc_validates(d2 in any::<u8>(), d1 in any::<u8>()) {
            let crc = crc5(d2, d1, 0);
            prop_assert!(crc <= CRC_MASK);
            prop_assert!(echo_valid([d2, d1, crc]));
        }

        /// Any single flipped bit in the two data words is detected
        #[test]
        fn prop_crc5_detects_single_bit_errors(d2 in any::<u8>(), d1 in any::<u8>(), flip in 0u32..16) {
            let word = (((d2 as u16) << 8) | d1 as u16) ^ (1 << flip);
            let echo = [(word >> 8) as u8, word as u8, crc5(d2, d1, 0)];
            prop_assert!(!echo_valid(echo));
        }
    }
}
