//! Simulated Iono D16 board for integration tests
//!
//! Models both chip families at the frame level: CRC checks on requests,
//! echo framing, register files, the realtime fault flags and the
//! chip-reported CRC error bit. Faults on the wire are injected per chip
//! select.

#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use iono_core::scheduler::PollPhase;
use iono_core::DriverConfig;
use iono_drivers::input::max22190::{self, crc5};
use iono_drivers::output::max14912::{self, cmd, crc7, reg};
use iono_drivers::{IonoD16, SharedBus};
use iono_hal::{ChipSelect, Clock, InputPin, IoPin, OutputPin, SpiExchange};

/// Bus-level failure reported by the fake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFault;

/// Simulated input chip
#[derive(Debug, Default, Clone)]
pub struct FakeInputChip {
    pub regs: [u8; 0x20],
}

impl FakeInputChip {
    pub fn set_fault1(&mut self, value: u8) {
        self.regs[max22190::reg::FAULT1 as usize] = value;
    }

    pub fn set_fault2(&mut self, value: u8) {
        self.regs[max22190::reg::FAULT2 as usize] = value;
    }

    pub fn set_wire_break(&mut self, value: u8) {
        self.regs[max22190::reg::WB as usize] = value;
    }

    pub fn flt(&self, bit: u8) -> u8 {
        self.regs[(max22190::reg::FLT1 + 2 * bit) as usize]
    }

    pub fn fault2_enable(&self) -> u8 {
        self.regs[max22190::reg::FAULT2EN as usize]
    }
}

/// Simulated output driver
#[derive(Debug, Default, Clone)]
pub struct FakeOutputChip {
    pub state: u8,
    pub pp: u8,
    pub ol_en: u8,
    pub wd_jn: u8,
    pub ol_rt: u8,
    pub ov_rt: u8,
    pub thsd_rt: u8,
    /// Configuration commands are acknowledged but not applied
    pub ignore_config: bool,
    /// Frames carrying the fault-clear marker
    pub clear_faults_seen: u32,
    /// Requests rejected for a bad CRC
    pub bad_requests: u32,
    crc_error: bool,
}

impl FakeOutputChip {
    fn respond(&mut self, words: [u8; 3]) -> [u8; 3] {
        let [w1, w0, check] = words;
        if check & 0x7F != crc7(w1, w0) {
            self.crc_error = true;
            self.bad_requests += 1;
            return [0, 0, crc7(0, 0) | max14912::CRC_ERROR];
        }

        if w1 & max14912::CLEAR_FAULTS != 0 {
            self.clear_faults_seen += 1;
        }

        let mut error = false;
        let (a, q) = match w1 & !max14912::CLEAR_FAULTS {
            cmd::SET_STATE => {
                self.state = w0;
                (0, 0)
            }
            cmd::SET_MODE => {
                if !self.ignore_config {
                    self.pp = w0;
                }
                (0, 0)
            }
            cmd::SET_OL_DET => {
                if !self.ignore_config {
                    self.ol_en = w0;
                }
                (0, 0)
            }
            cmd::SET_CONFIG => {
                if !self.ignore_config {
                    self.wd_jn = w0;
                }
                (0, 0)
            }
            cmd::READ_REG => match w0 {
                reg::IN => (0, self.state),
                reg::PP => (0, self.pp),
                reg::OL_EN => (0, self.ol_en),
                reg::WD_JN => (0, self.wd_jn),
                reg::OL => (self.ol_rt, self.ol_rt),
                reg::THSD => (self.thsd_rt, self.thsd_rt),
                reg::OV => (self.ov_rt, self.ov_rt),
                _ => (0, 0),
            },
            cmd::READ_RT_STAT => {
                error = self.crc_error;
                (self.ov_rt | self.thsd_rt, self.ol_rt)
            }
            _ => (0, 0),
        };
        self.crc_error = false;

        let check = crc7(a, q) | if error { max14912::CRC_ERROR } else { 0 };
        [a, q, check]
    }
}

/// Both chip families on one bus, plus the status indicator
#[derive(Debug, Default)]
pub struct FakeBoard {
    pub inputs: [FakeInputChip; 2],
    pub outputs: [FakeOutputChip; 2],
    /// Externally driven terminal levels, index 0 = D1
    pub terminals: [bool; 16],
    pub indicator: bool,
    pub indicator_updates: u32,
    pub fail_indicator: bool,
    /// Requests seen per chip select
    pub frames: [u32; 4],
    /// Commands not immediately followed by their confirmation
    pub interleave_violations: u32,
    corrupt_echoes: [u32; 4],
    corrupt_requests: [u32; 4],
    fail_exchanges: [u32; 4],
    awaiting_confirm: Option<ChipSelect>,
}

impl FakeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive terminal `pin` (1-16) from outside
    pub fn set_terminal(&mut self, pin: u8, level: bool) {
        self.terminals[(pin - 1) as usize] = level;
    }

    /// Flip a data bit in the next `count` echoes from `cs`
    pub fn corrupt_echoes(&mut self, cs: ChipSelect, count: u32) {
        self.corrupt_echoes[cs.index()] = count;
    }

    /// Flip a data bit in the next `count` requests to `cs`
    pub fn corrupt_requests(&mut self, cs: ChipSelect, count: u32) {
        self.corrupt_requests[cs.index()] = count;
    }

    /// Fail the next `count` exchanges with `cs` at bus level
    pub fn fail_exchanges(&mut self, cs: ChipSelect, count: u32) {
        self.fail_exchanges[cs.index()] = count;
    }

    pub fn frames_to(&self, cs: ChipSelect) -> u32 {
        self.frames[cs.index()]
    }

    /// Input levels seen by input chip `bank`
    ///
    /// A terminal reads high if driven from outside or by its own output.
    fn input_levels(&self, bank: usize) -> u8 {
        (0..8).fold(0u8, |levels, k| {
            let external = self.terminals[bank * 8 + k];
            let driven = (self.outputs[bank].state >> k) & 1 == 1;
            if external || driven {
                levels | (1 << (7 - k))
            } else {
                levels
            }
        })
    }

    fn respond_input(&mut self, bank: usize, words: [u8; 3]) -> [u8; 3] {
        let [w1, w0, check] = words;
        let levels = self.input_levels(bank);
        if check & 0x1F != crc5(w1, w0, 0) {
            let bad = crc5(levels, 0, 0) ^ 0x01;
            return [levels, 0, bad];
        }

        let chip = &mut self.inputs[bank];
        let address = (w1 & !max22190::WRITE) as usize % chip.regs.len();
        if w1 & max22190::WRITE != 0 {
            chip.regs[address] = w0;
        }
        let data = chip.regs[address];
        [levels, data, crc5(levels, data, 0)]
    }

    fn track_confirmation(&mut self, cs: ChipSelect, words: [u8; 3]) {
        let is_status = words[0] & !max14912::CLEAR_FAULTS == cmd::READ_RT_STAT;
        if let Some(pending) = self.awaiting_confirm.take() {
            if !(is_status && pending == cs) {
                self.interleave_violations += 1;
            }
        }
        let is_output = matches!(cs, ChipSelect::OutputLow | ChipSelect::OutputHigh);
        let is_command = words[0] & !max14912::CLEAR_FAULTS <= cmd::SET_CONFIG;
        if is_output && is_command {
            self.awaiting_confirm = Some(cs);
        }
    }

    fn take(counter: &mut u32) -> bool {
        if *counter > 0 {
            *counter -= 1;
            true
        } else {
            false
        }
    }
}

impl SpiExchange for FakeBoard {
    type Error = BusFault;

    fn exchange(&mut self, cs: ChipSelect, words: [u8; 3]) -> Result<[u8; 3], BusFault> {
        let index = cs.index();
        if Self::take(&mut self.fail_exchanges[index]) {
            return Err(BusFault);
        }
        self.frames[index] += 1;
        self.track_confirmation(cs, words);

        let mut request = words;
        if Self::take(&mut self.corrupt_requests[index]) {
            request[1] ^= 0x01;
        }

        let mut echo = match cs {
            ChipSelect::InputLow => self.respond_input(0, request),
            ChipSelect::InputHigh => self.respond_input(1, request),
            ChipSelect::OutputLow => self.outputs[0].respond(request),
            ChipSelect::OutputHigh => self.outputs[1].respond(request),
        };

        if Self::take(&mut self.corrupt_echoes[index]) {
            echo[1] ^= 0x01;
        }
        Ok(echo)
    }

    fn set_indicator(&mut self, on: bool) -> Result<(), BusFault> {
        if self.fail_indicator {
            return Err(BusFault);
        }
        self.indicator = on;
        self.indicator_updates += 1;
        Ok(())
    }
}

/// Manually advanced clock
#[derive(Debug, Default)]
pub struct FakeClock {
    us: Cell<u64>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_ms(&self, ms: u32) {
        self.advance_us(ms as u64 * 1_000);
    }

    pub fn advance_us(&self, us: u64) {
        self.us.set(self.us.get() + us);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u32 {
        (self.us.get() / 1_000) as u32
    }

    fn now_us(&self) -> u32 {
        self.us.get() as u32
    }
}

#[derive(Debug, Default)]
pub struct FakePinState {
    pub level: Cell<bool>,
    pub is_output: Cell<bool>,
}

/// Auxiliary pin; clones share state so the test keeps a handle
#[derive(Debug, Default, Clone)]
pub struct FakePin(pub Rc<FakePinState>);

impl FakePin {
    /// Drive the pin from outside
    pub fn drive(&self, level: bool) {
        self.0.level.set(level);
    }

    pub fn level(&self) -> bool {
        self.0.level.get()
    }

    pub fn is_output(&self) -> bool {
        self.0.is_output.get()
    }
}

impl OutputPin for FakePin {
    fn set_high(&mut self) {
        self.0.level.set(true);
    }

    fn set_low(&mut self) {
        self.0.level.set(false);
    }
}

impl InputPin for FakePin {
    fn is_high(&self) -> bool {
        self.0.level.get()
    }
}

impl IoPin for FakePin {
    fn set_as_input(&mut self) {
        self.0.is_output.set(false);
    }

    fn set_as_output(&mut self) {
        self.0.is_output.set(true);
    }
}

pub type TestBus = SharedBus<NoopRawMutex, FakeBoard>;
pub type TestDevice<'a> = IonoD16<'a, NoopRawMutex, FakeBoard, FakePin, &'a FakeClock>;

pub fn bus() -> TestBus {
    SharedBus::new(FakeBoard::new())
}

/// Four auxiliary pins and handles to them
pub fn aux_pins() -> ([FakePin; 4], [FakePin; 4]) {
    let pins: [FakePin; 4] = Default::default();
    let handles = pins.clone();
    (pins, handles)
}

/// Device that went through setup
pub fn device<'a>(bus: &'a TestBus, clock: &'a FakeClock) -> TestDevice<'a> {
    let (pins, _) = aux_pins();
    device_with_aux(bus, clock, pins)
}

pub fn device_with_aux<'a>(
    bus: &'a TestBus,
    clock: &'a FakeClock,
    aux: [FakePin; 4],
) -> TestDevice<'a> {
    let mut device = IonoD16::new(bus, aux, clock, DriverConfig::default());
    device.setup().expect("setup");
    device
}

/// Tick in poll-interval steps until `phase` has run
pub fn run_phase(device: &mut TestDevice<'_>, clock: &FakeClock, phase: PollPhase) {
    for _ in 0..5 {
        let next = device.poll_phase();
        clock.advance_ms(device.config().poll_interval_ms);
        device.process();
        if next == phase {
            return;
        }
    }
    panic!("phase {:?} never ran", phase);
}

/// Inspect or modify the board between ticks
pub fn with_board<R>(bus: &TestBus, f: impl FnOnce(&mut FakeBoard) -> R) -> R {
    bus.transaction(f)
}
