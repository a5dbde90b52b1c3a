//! 8-channel protected high-side/push-pull output driver (SPI, 7-bit CRC)
//!
//! # Frame format
//!
//! Three bytes in each direction:
//! - Byte 1: command, bit 7 requests a fault clear
//! - Byte 2: command data (a register address for reads)
//! - Byte 3: 7-bit CRC; in the echo, bit 7 reports a CRC error seen by
//!   the chip
//!
//! A register read answers with the realtime flags (`A`) and the register
//! content (`Q`). Commands are confirmed by a read-realtime-status frame
//! sent to the same chip inside the same bus critical section.

use iono_core::bits::{self, StickyBits};
use iono_core::protection::{ChannelSample, Lockout, Verdict};
use iono_core::Error;
use iono_hal::{ChipSelect, SpiExchange};

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::bus::SharedBus;

/// Register addresses
pub mod reg {
    /// Input (sensed output) levels
    pub const IN: u8 = 0;
    /// Push-pull mode bits
    pub const PP: u8 = 1;
    /// Open-load detection enable bits
    pub const OL_EN: u8 = 2;
    /// Watchdog and output-join configuration
    pub const WD_JN: u8 = 3;
    /// Open-load flags
    pub const OL: u8 = 4;
    /// Thermal shutdown flags
    pub const THSD: u8 = 5;
    /// Global faults
    pub const FAULTS: u8 = 6;
    /// Over-voltage flags
    pub const OV: u8 = 7;
}

/// Command codes (byte 1)
pub mod cmd {
    /// Set the output levels
    pub const SET_STATE: u8 = 0x00;
    /// Set push-pull mode bits
    pub const SET_MODE: u8 = 0x01;
    /// Set open-load detection enables
    pub const SET_OL_DET: u8 = 0x02;
    /// Set watchdog/join configuration
    pub const SET_CONFIG: u8 = 0x03;
    /// Read a register; byte 2 is the address
    pub const READ_REG: u8 = 0x20;
    /// Read the realtime status
    pub const READ_RT_STAT: u8 = 0x30;
}

/// Fault-clear marker ORed into byte 1
pub const CLEAR_FAULTS: u8 = 0x80;

/// Echo byte 3: the chip saw a CRC error
pub const CRC_ERROR: u8 = 0x80;

/// CRC polynomial, including the top term
pub const CRC_POLY: u8 = 0xB7;
/// CRC seed
pub const CRC_SEED: u8 = 0x7F;
/// Byte folded in after the payload
pub const CRC_FINAL: u8 = 0x80;

const CRC_MASK: u8 = 0x7F;

const fn crc7_fold(mut crc: u8, mut byte: u8) -> u8 {
    let mut i = 0;
    while i < 8 {
        crc <<= 1;
        if crc & 0x80 != 0 {
            crc ^= CRC_POLY;
        }
        if byte & 0x80 != 0 {
            crc ^= 1;
        }
        byte <<= 1;
        i += 1;
    }
    crc
}

/// 7-bit CRC over the two payload bytes of a frame
pub const fn crc7(w1: u8, w0: u8) -> u8 {
    let crc = crc7_fold(CRC_SEED, w1);
    let crc = crc7_fold(crc, w0);
    crc7_fold(crc, CRC_FINAL) & CRC_MASK
}

/// CRC of the read-realtime-status confirmation frame
pub const READ_RT_STAT_CRC: u8 = crc7(cmd::READ_RT_STAT, 0);

const STATUS_FRAME: [u8; 3] = [cmd::READ_RT_STAT, 0, READ_RT_STAT_CRC];

/// Check an echoed frame: no chip-side CRC error and a matching CRC
pub const fn echo_valid(echo: [u8; 3]) -> bool {
    echo[2] & CRC_ERROR == 0 && echo[2] & CRC_MASK == crc7(echo[0], echo[1])
}

/// One output driver chip (8 channels)
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputBank {
    cs: ChipSelect,
    /// Last transaction failed on every attempt
    error: bool,
    /// Commanded levels, after protection
    outputs: u8,
    /// Levels the caller last asked for
    outputs_user: u8,
    /// Send the fault-clear marker with the next frame
    clear_faults: bool,
    open_load: u8,
    open_load_rt: u8,
    over_voltage_rt: u8,
    thermal: u8,
    thermal_rt: u8,
    /// Push-pull bits, after protection
    push_pull: u8,
    /// Push-pull bits the caller last asked for
    push_pull_user: u8,
    open_load_detect: u8,
    join: u8,
    ov_lock: u8,
    thermal_lock: u8,
    /// Shared by both interlocks; they never hold the same channel
    lock_since_ms: [u32; 8],
    open_load_mem: StickyBits,
    over_voltage_mem: StickyBits,
    thermal_mem: StickyBits,
    ov_protection: bool,
}

impl OutputBank {
    /// Create the driver state for the chip behind `cs`
    pub const fn new(cs: ChipSelect) -> Self {
        Self {
            cs,
            error: false,
            outputs: 0,
            outputs_user: 0,
            clear_faults: false,
            open_load: 0,
            open_load_rt: 0,
            over_voltage_rt: 0,
            thermal: 0,
            thermal_rt: 0,
            push_pull: 0,
            push_pull_user: 0,
            open_load_detect: 0,
            join: 0,
            ov_lock: 0,
            thermal_lock: 0,
            lock_since_ms: [0; 8],
            open_load_mem: StickyBits::new(),
            over_voltage_mem: StickyBits::new(),
            thermal_mem: StickyBits::new(),
            ov_protection: false,
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

    /// Commanded output levels
    pub fn outputs(&self) -> u8 {
        self.outputs
    }

    /// Output levels last requested by the caller
    pub fn outputs_user(&self) -> u8 {
        self.outputs_user
    }

    /// Push-pull bits in effect
    pub fn push_pull(&self) -> u8 {
        self.push_pull
    }

    /// Push-pull bits last requested by the caller
    pub fn push_pull_user(&self) -> u8 {
        self.push_pull_user
    }

    /// Open-load detection enables in effect
    pub fn open_load_detect(&self) -> u8 {
        self.open_load_detect
    }

    /// Watchdog/join configuration in effect
    pub fn join(&self) -> u8 {
        self.join
    }

    /// Raw open-load register from the last poll
    pub fn open_load(&self) -> u8 {
        self.open_load
    }

    /// Realtime open-load flags from the last poll
    pub fn open_load_rt(&self) -> u8 {
        self.open_load_rt
    }

    /// Realtime over-voltage flags from the last poll
    pub fn over_voltage_rt(&self) -> u8 {
        self.over_voltage_rt
    }

    /// Raw thermal register from the last poll
    pub fn thermal(&self) -> u8 {
        self.thermal
    }

    /// Realtime thermal flags from the last poll
    pub fn thermal_rt(&self) -> u8 {
        self.thermal_rt
    }

    /// Check if channel `bit` is held by the over-voltage interlock
    pub fn over_voltage_lock(&self, bit: u8) -> bool {
        bits::bit(self.ov_lock, bit)
    }

    /// Check if channel `bit` is held by the thermal interlock
    pub fn thermal_lock(&self, bit: u8) -> bool {
        bits::bit(self.thermal_lock, bit)
    }

    /// Check if a fault clear is waiting for the next good frame
    pub fn clear_faults_pending(&self) -> bool {
        self.clear_faults
    }

    /// Send the fault-clear marker with the next frame
    pub fn request_clear_faults(&mut self) {
        self.clear_faults = true;
    }

    /// Check if the over-voltage interlock runs for this chip
    pub fn over_voltage_protection(&self) -> bool {
        self.ov_protection
    }

    /// Let the over-voltage interlock run for this chip
    pub fn enable_over_voltage_protection(&mut self) {
        self.ov_protection = true;
    }

    /// Read-and-clear the open-load memory of channel `bit`
    pub fn take_open_load(&mut self, bit: u8) -> bool {
        self.open_load_mem.take(bit)
    }

    /// Read-and-clear the over-voltage memory of channel `bit`
    pub fn take_over_voltage(&mut self, bit: u8) -> bool {
        self.over_voltage_mem.take(bit)
    }

    /// Read-and-clear the thermal memory of channel `bit`
    pub fn take_thermal(&mut self, bit: u8) -> bool {
        self.thermal_mem.take(bit)
    }

    /// Send one frame, retrying until a valid echo comes back
    ///
    /// With `confirm`, the frame is followed by a realtime-status frame to
    /// the same chip under the same lock, and the status echo decides.
    fn transfer<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
        command: u8,
        data: u8,
        confirm: bool,
    ) -> Result<[u8; 2], Error> {
        let cs = self.cs;
        let marker = if self.clear_faults { CLEAR_FAULTS } else { 0 };
        let w1 = marker | command;
        let frame = [w1, data, crc7(w1, data)];

        for attempt in 0..attempts {
            let echo = if confirm {
                bus.transaction(|spi| {
                    spi.exchange(cs, frame)?;
                    spi.exchange(cs, STATUS_FRAME)
                })
            } else {
                bus.exchange(cs, frame)
            };

            match echo {
                Ok(echo) if echo_valid(echo) => {
                    self.error = false;
                    if marker != 0 {
                        self.clear_faults = false;
                    }
                    return Ok([echo[0], echo[1]]);
                }
                _ => trace!("output {}: retry {}", cs, attempt),
            }
        }

        self.error = true;
        warn!("output {}: no valid echo for command {=u8:#x}", cs, command);
        Err(Error::Transport)
    }

    /// Read a register, returning the realtime flags and the content
    pub fn read_register<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
        address: u8,
    ) -> Result<(u8, u8), Error> {
        let [a, q] = self.transfer(bus, attempts, cmd::READ_REG, address, false)?;
        Ok((a, q))
    }

    /// Send a confirmed command
    pub fn command<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
        command: u8,
        data: u8,
    ) -> Result<(), Error> {
        self.transfer(bus, attempts, command, data, true).map(|_| ())
    }

    /// Send a configuration command and read the register back
    fn configure<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
        command: u8,
        register: u8,
        value: u8,
    ) -> Result<(), Error> {
        self.command(bus, attempts, command, value)?;
        let (_, readback) = self.read_register(bus, attempts, register)?;
        if readback != value {
            warn!(
                "output {}: register {} reads {=u8:#x}, wrote {=u8:#x}",
                self.cs,
                register,
                readback,
                value
            );
            return Err(Error::Verify);
        }
        Ok(())
    }

    /// Drive channel `bit`, bypassing the interlocks
    pub fn set_output<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
        bit: u8,
        on: bool,
    ) -> Result<(), Error> {
        bits::set_bit(&mut self.outputs, bit, on);
        self.command(bus, attempts, cmd::SET_STATE, self.outputs)
    }

    /// Switch channel `bit` between push-pull and high-side
    pub fn set_push_pull<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
        bit: u8,
        on: bool,
    ) -> Result<(), Error> {
        let value = bits::with_bit(self.push_pull, bit, on);
        self.configure(bus, attempts, cmd::SET_MODE, reg::PP, value)?;
        self.push_pull = value;
        Ok(())
    }

    /// Enable or disable open-load detection on channel `bit`
    pub fn set_open_load_detect<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
        bit: u8,
        on: bool,
    ) -> Result<(), Error> {
        let value = bits::with_bit(self.open_load_detect, bit, on);
        self.configure(bus, attempts, cmd::SET_OL_DET, reg::OL_EN, value)?;
        self.open_load_detect = value;
        Ok(())
    }

    /// Set or clear a bit of the watchdog/join configuration
    pub fn set_join<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
        join_bit: u8,
        on: bool,
    ) -> Result<(), Error> {
        let value = bits::with_bit(self.join, join_bit, on);
        self.configure(bus, attempts, cmd::SET_CONFIG, reg::WD_JN, value)?;
        self.join = value;
        Ok(())
    }

    /// Drive channel `bit` on behalf of the caller
    ///
    /// The request is recorded as the caller's intent in every case. A
    /// request matching the level an active interlock forces is accepted
    /// without touching the bus; a conflicting one fails with
    /// [`Error::Locked`].
    ///
    /// Both interlocks gate this path. Under a thermal lock HIGH is refused
    /// too, not only a return to push-pull, so a high-side channel cannot
    /// be switched back on before the cooldown ends.
    pub fn write<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
        bit: u8,
        on: bool,
    ) -> Result<(), Error> {
        bits::set_bit(&mut self.outputs_user, bit, on);

        for kind in [Lockout::OverVoltage, Lockout::Thermal] {
            if bits::bit(self.locks(kind), bit) {
                return if on == kind.forced_level() {
                    Ok(())
                } else {
                    Err(Error::Locked)
                };
            }
        }

        self.set_output(bus, attempts, bit, on)
    }

    /// Select push-pull or high-side mode on behalf of the caller
    ///
    /// Push-pull is refused while the channel is thermally locked; the
    /// request is still recorded and applied on release.
    pub fn request_mode<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
        bit: u8,
        push_pull: bool,
    ) -> Result<(), Error> {
        bits::set_bit(&mut self.push_pull_user, bit, push_pull);
        if push_pull && self.thermal_lock(bit) {
            return Err(Error::Locked);
        }
        self.set_push_pull(bus, attempts, bit, push_pull)
    }

    /// Re-assert the commanded outputs
    pub fn refresh<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
    ) -> Result<(), Error> {
        self.command(bus, attempts, cmd::SET_STATE, self.outputs)
    }

    /// Read the open-load register and latch the realtime flags
    pub fn poll_open_load<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
    ) -> Result<(), Error> {
        let (rt, content) = self.read_register(bus, attempts, reg::OL)?;
        self.open_load_rt = rt;
        self.open_load = content;
        self.open_load_mem.latch(rt);
        Ok(())
    }

    /// Read the over-voltage register, latch it, run the interlock
    ///
    /// The interlock runs on the last good sample even if this read
    /// failed.
    pub fn poll_over_voltage<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
        now_ms: u32,
        cooldown_ms: u32,
    ) -> Result<(), Error> {
        let read = self.read_register(bus, attempts, reg::OV).map(|(rt, _)| {
            self.over_voltage_rt = rt;
            self.over_voltage_mem.latch(rt);
        });
        if self.ov_protection {
            self.run_lockout(bus, attempts, Lockout::OverVoltage, now_ms, cooldown_ms);
        }
        read
    }

    /// Read the thermal register, latch it, run the interlock
    pub fn poll_thermal<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
        now_ms: u32,
        cooldown_ms: u32,
    ) -> Result<(), Error> {
        let read = self.read_register(bus, attempts, reg::THSD).map(|(rt, content)| {
            self.thermal_rt = rt;
            self.thermal = content;
            self.thermal_mem.latch(rt);
        });
        self.run_lockout(bus, attempts, Lockout::Thermal, now_ms, cooldown_ms);
        read
    }

    fn locks(&self, kind: Lockout) -> u8 {
        match kind {
            Lockout::OverVoltage => self.ov_lock,
            Lockout::Thermal => self.thermal_lock,
        }
    }

    fn locks_mut(&mut self, kind: Lockout) -> &mut u8 {
        match kind {
            Lockout::OverVoltage => &mut self.ov_lock,
            Lockout::Thermal => &mut self.thermal_lock,
        }
    }

    fn raw_fault(&self, kind: Lockout) -> u8 {
        match kind {
            Lockout::OverVoltage => self.over_voltage_rt,
            Lockout::Thermal => self.thermal_rt,
        }
    }

    fn sample(&self, kind: Lockout, bit: u8) -> ChannelSample {
        ChannelSample {
            fault: bits::bit(self.raw_fault(kind), bit),
            push_pull: bits::bit(self.push_pull, bit),
            on: bits::bit(self.outputs, bit),
            locked: bits::bit(self.locks(kind), bit),
            locked_since_ms: self.lock_since_ms[bit as usize],
        }
    }

    /// One interlock pass over all channels
    ///
    /// Bus failures are ignored here; a failed force or restore is retried
    /// on the next pass because the lock state drives it.
    fn run_lockout<M: RawMutex, S: SpiExchange>(
        &mut self,
        bus: &SharedBus<M, S>,
        attempts: u8,
        kind: Lockout,
        now_ms: u32,
        cooldown_ms: u32,
    ) {
        for bit in 0..8u8 {
            let sample = self.sample(kind, bit);
            match kind.evaluate(&sample, now_ms, cooldown_ms) {
                Verdict::Idle => {}
                Verdict::Engage => {
                    match kind {
                        Lockout::OverVoltage => {
                            if !sample.on {
                                let _ = self.set_output(bus, attempts, bit, true);
                            }
                        }
                        Lockout::Thermal => {
                            if sample.push_pull {
                                let _ = self.set_push_pull(bus, attempts, bit, false);
                            }
                            if sample.on {
                                let _ = self.set_output(bus, attempts, bit, false);
                            }
                        }
                    }
                    if !sample.locked {
                        warn!("output {}: {} lock on channel {}", self.cs, kind, bit);
                    }
                    bits::set_bit(self.locks_mut(kind), bit, true);
                    self.lock_since_ms[bit as usize] = now_ms;
                }
                Verdict::Release => {
                    if kind == Lockout::Thermal {
                        let push_pull = bits::bit(self.push_pull_user, bit);
                        let _ = self.set_push_pull(bus, attempts, bit, push_pull);
                    }
                    let on = bits::bit(self.outputs_user, bit);
                    let _ = self.set_output(bus, attempts, bit, on);
                    bits::set_bit(self.locks_mut(kind), bit, false);
                    debug!("output {}: {} lock released on channel {}", self.cs, kind, bit);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use proptest::prelude::*;

    /// Bus whose every exchange fails
    struct DeadBus;

    impl SpiExchange for DeadBus {
        type Error = ();

        fn exchange(&mut self, _cs: ChipSelect, _words: [u8; 3]) -> Result<[u8; 3], ()> {
            Err(())
        }

        fn set_indicator(&mut self, _on: bool) -> Result<(), ()> {
            Err(())
        }
    }

    fn dead_bus() -> SharedBus<NoopRawMutex, DeadBus> {
        SharedBus::new(DeadBus)
    }

    #[test]
    fn test_crc7_vectors() {
        assert_eq!(crc7(0x00, 0x00), 0x03);
        assert_eq!(crc7(cmd::READ_REG, reg::OL), 0x18);
        assert_eq!(crc7(cmd::READ_REG, reg::OV), 0x1D);
        assert_eq!(crc7(cmd::SET_STATE, 0xFF), 0x6C);
        assert_eq!(crc7(CLEAR_FAULTS, 0x00), 0x32);
        assert_eq!(crc7(cmd::SET_MODE, 0x0F), 0x7A);
        assert_eq!(crc7(0xA5, 0x5A), 0x00);
        assert_eq!(crc7(0xFF, 0xFF), 0x6A);
    }

    #[test]
    fn test_status_crc_is_precomputed() {
        assert_eq!(READ_RT_STAT_CRC, 0x44);
        assert!(echo_valid(STATUS_FRAME));
    }

    #[test]
    fn test_chip_crc_error_flag_rejects_echo() {
        let echo = [0x01, 0x02, crc7(0x01, 0x02)];
        assert!(echo_valid(echo));
        assert!(!echo_valid([echo[0], echo[1], echo[2] | CRC_ERROR]));
    }

    #[test]
    fn test_failed_write_keeps_cache_and_sets_error() {
        let bus = dead_bus();
        let mut bank = OutputBank::new(ChipSelect::OutputLow);
        bank.request_clear_faults();

        assert_eq!(bank.set_push_pull(&bus, 3, 2, true), Err(Error::Transport));
        assert!(bank.error());
        assert_eq!(bank.push_pull(), 0);
        // Marker stays pending until a frame gets through
        assert!(bank.clear_faults_pending());
    }

    #[test]
    fn test_over_voltage_lock_accepts_high_without_bus() {
        let bus = dead_bus();
        let mut bank = OutputBank::new(ChipSelect::OutputHigh);
        bank.ov_lock = 0b0000_0100;
        bank.outputs = 0b0000_0100;

        assert_eq!(bank.write(&bus, 3, 2, true), Ok(()));
        assert!(!bank.error());
        assert_eq!(bank.write(&bus, 3, 2, false), Err(Error::Locked));
        // Intent is kept for the release
        assert_eq!(bank.outputs_user(), 0);
        assert_eq!(bank.outputs(), 0b0000_0100);
    }

    #[test]
    fn test_thermal_lock_rejects_high_and_push_pull() {
        let bus = dead_bus();
        let mut bank = OutputBank::new(ChipSelect::OutputLow);
        bank.thermal_lock = 0b1000_0000;

        assert_eq!(bank.write(&bus, 3, 7, false), Ok(()));
        assert_eq!(bank.write(&bus, 3, 7, true), Err(Error::Locked));
        assert_eq!(bank.request_mode(&bus, 3, 7, true), Err(Error::Locked));
        assert_eq!(bank.push_pull_user(), 0b1000_0000);
        assert_eq!(bank.outputs_user(), 0b1000_0000);
        assert!(!bank.error());
    }

    #[test]
    fn test_lockout_engages_without_bus() {
        // Locks are recorded even when the forcing write fails
        let bus = dead_bus();
        let mut bank = OutputBank::new(ChipSelect::OutputLow);
        bank.enable_over_voltage_protection();
        bank.over_voltage_rt = 0b0000_0001;

        assert_eq!(bank.poll_over_voltage(&bus, 1, 500, 10_000), Err(Error::Transport));
        assert!(bank.over_voltage_lock(0));
        assert_eq!(bank.lock_since_ms[0], 500);
        assert_eq!(bank.outputs(), 0b0000_0001);
    }

    proptest! {
        #[test]
        fn prop_own_crc_validates(w1 in any::<u8>(), w0 in any::<u8>()) {
            let crc = crc7(w1, w0);
            prop_assert!(crc <= CRC_MASK);
            prop_assert!(echo_valid([w1, w0, crc]));
        }

        /// Any single flipped payload bit is detected
        #[test]
        fn prop_crc7_detects_single_bit_errors(w1 in any::<u8>(), w0 in any::<u8>(), flip in 0u32..16) {
            let word = (((w1 as u16) << 8) | w0 as u16) ^ (1 << flip);
            let echo = [(word >> 8) as u8, word as u8, crc7(w1, w0)];
            prop_assert!(!echo_valid(echo));
        }
    }
}
