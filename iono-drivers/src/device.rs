//! Iono D16 device state and pin-level API
//!
//! [`IonoD16`] owns every bank driver and table of the module and is the
//! only way to reach them. The host calls [`IonoD16::process`] at least
//! once per poll interval; everything else is on-demand.
//!
//! # Tick
//!
//! 1. Wire-break register of both input chips (refreshes the input levels)
//! 2. At most one phase of the fault polling cycle
//! 3. Subscriptions, then link rules, then auxiliary subscriptions
//! 4. Software PWM edges
//! 5. Status indicator, if the requested state changed
//!
//! A failing chip only sets its own error flag; the tick carries on.

use embassy_sync::blocking_mutex::raw::RawMutex;
use iono_core::pins::{
    self, input_channel, output_channel, AUX_PIN_COUNT, BANK_COUNT, DT1, PIN_COUNT,
};
use iono_core::scheduler::{PollPhase, PollScheduler};
use iono_core::signal::{EdgeCallback, LinkAction, LinkMode, LinkRule, PwmChannel, Subscription};
use iono_core::{DriverConfig, Error, Pin, PinMode};
use iono_hal::{ChipSelect, Clock, IoPin, SpiExchange};

use crate::bus::SharedBus;
use crate::input::InputBank;
use crate::output::OutputBank;

/// The Iono D16 module
///
/// `bus` is shared with any other context that talks to the chips; `aux`
/// are the DT1-DT4 MCU pins in order.
pub struct IonoD16<'a, M: RawMutex, S: SpiExchange, P: IoPin, C: Clock> {
    bus: &'a SharedBus<M, S>,
    aux: [P; AUX_PIN_COUNT],
    clock: C,
    config: DriverConfig,
    ready: bool,
    modes: [PinMode; PIN_COUNT],
    aux_modes: [PinMode; AUX_PIN_COUNT],
    inputs: [InputBank; BANK_COUNT],
    outputs: [OutputBank; BANK_COUNT],
    scheduler: PollScheduler,
    subscriptions: [Option<Subscription>; PIN_COUNT],
    aux_subscriptions: [Option<Subscription>; AUX_PIN_COUNT],
    /// Indexed `[input][output]`
    links: [[LinkRule; PIN_COUNT]; PIN_COUNT],
    pwm: [PwmChannel; PIN_COUNT],
    led_requested: bool,
    led_applied: bool,
}

impl<'a, M, S, P, C> IonoD16<'a, M, S, P, C>
where
    M: RawMutex,
    S: SpiExchange,
    P: IoPin,
    C: Clock,
{
    /// Create the device; nothing touches the bus until [`setup`](Self::setup)
    pub fn new(
        bus: &'a SharedBus<M, S>,
        aux: [P; AUX_PIN_COUNT],
        clock: C,
        config: DriverConfig,
    ) -> Self {
        let scheduler = PollScheduler::new(config.poll_interval_ms, clock.now_ms());
        Self {
            bus,
            aux,
            clock,
            config,
            ready: false,
            modes: [PinMode::Unconfigured; PIN_COUNT],
            aux_modes: [PinMode::Unconfigured; AUX_PIN_COUNT],
            inputs: [
                InputBank::new(ChipSelect::InputLow),
                InputBank::new(ChipSelect::InputHigh),
            ],
            outputs: [
                OutputBank::new(ChipSelect::OutputLow),
                OutputBank::new(ChipSelect::OutputHigh),
            ],
            scheduler,
            subscriptions: [None; PIN_COUNT],
            aux_subscriptions: [None; AUX_PIN_COUNT],
            links: [[LinkRule::DISABLED; PIN_COUNT]; PIN_COUNT],
            pwm: [PwmChannel::disabled(); PIN_COUNT],
            led_requested: false,
            led_applied: false,
        }
    }

    /// Bring the chips up and run the first tick
    ///
    /// Enables every fault register 2 source on both input chips. The
    /// device is ready afterwards even if a chip did not answer; the
    /// first failure is returned.
    pub fn setup(&mut self) -> Result<(), Error> {
        let attempts = self.config.attempts();
        let mut result = Ok(());
        for bank in self.inputs.iter_mut() {
            result = result.and(bank.enable_fault2(self.bus, attempts));
        }

        self.led_requested = true;
        self.led_applied = false;
        self.ready = true;
        debug!("iono: setup done");

        self.process();
        result
    }

    /// Check if [`setup`](Self::setup) has run
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Active configuration
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Fault polling phase that runs on the next qualifying tick
    pub fn poll_phase(&self) -> PollPhase {
        self.scheduler.pending()
    }

    /// Periodic tick
    pub fn process(&mut self) {
        if !self.ready {
            return;
        }

        let attempts = self.config.attempts();
        for bank in self.inputs.iter_mut() {
            let _ = bank.refresh(self.bus, attempts);
        }

        let now_ms = self.clock.now_ms();
        if let Some(phase) = self.scheduler.poll(now_ms) {
            self.run_phase(phase, now_ms);
        }

        self.process_signals();
        self.process_pwm();
        self.process_indicator();
    }

    fn run_phase(&mut self, phase: PollPhase, now_ms: u32) {
        let bus = self.bus;
        let attempts = self.config.attempts();
        let cooldown_ms = self.config.lockout_ms;
        trace!("iono: poll phase {}", phase);

        match phase {
            PollPhase::InputFaults => {
                for bank in self.inputs.iter_mut() {
                    let _ = bank.poll_faults(bus, attempts);
                }
            }
            PollPhase::OpenLoad => {
                for bank in self.outputs.iter_mut() {
                    let _ = bank.poll_open_load(bus, attempts);
                }
            }
            PollPhase::OverVoltage => {
                for bank in self.outputs.iter_mut() {
                    let _ = bank.poll_over_voltage(bus, attempts, now_ms, cooldown_ms);
                }
            }
            PollPhase::Refresh => {
                for bank in self.outputs.iter_mut() {
                    let _ = bank.refresh(bus, attempts);
                }
            }
            PollPhase::Thermal => {
                for bank in self.outputs.iter_mut() {
                    let _ = bank.poll_thermal(bus, attempts, now_ms, cooldown_ms);
                }
            }
        }
    }

    fn process_signals(&mut self) {
        let now_ms = self.clock.now_ms();

        for input in 0..PIN_COUNT {
            let level = self.terminal_level(input);
            let number = Pin::D(input as u8).number();
            if let Some(subscription) = self.subscriptions[input].as_mut() {
                subscription.update(number, level, now_ms);
            }
            for output in 0..PIN_COUNT {
                if let Some(action) = self.links[input][output].update(level, now_ms) {
                    // Link writes obey the same guards as user writes
                    let _ = match action {
                        LinkAction::Write(on) => self.write_terminal(output, on),
                        LinkAction::Toggle => self.toggle_terminal(output),
                    };
                }
            }
        }

        for index in 0..AUX_PIN_COUNT {
            if let Some(subscription) = self.aux_subscriptions[index].as_mut() {
                let level = self.aux[index].is_high();
                subscription.update(DT1 + index as u8, level, now_ms);
            }
        }
    }

    fn process_pwm(&mut self) {
        let now_us = self.clock.now_us();
        let attempts = self.config.attempts();

        for index in 0..PIN_COUNT {
            if let Some(level) = self.pwm[index].poll(now_us) {
                let ch = output_channel(index);
                let _ = self.outputs[ch.bank].write(self.bus, attempts, ch.bit, level);
            }
        }
    }

    fn process_indicator(&mut self) {
        if self.led_requested == self.led_applied {
            return;
        }
        match self.bus.set_indicator(self.led_requested) {
            Ok(()) => self.led_applied = self.led_requested,
            Err(_) => warn!("iono: indicator update failed"),
        }
    }

    /// Configure a pin
    ///
    /// D1-D16 accept [`PinMode::Input`] (`detect` enables wire-break
    /// detection), [`PinMode::OutputHighSide`] (`detect` enables open-load
    /// detection) and [`PinMode::OutputPushPull`] (`detect` must be false).
    /// DT1-DT4 accept [`PinMode::Input`] and [`PinMode::Output`].
    ///
    /// The mode table only changes when every step succeeded.
    pub fn pin_mode(&mut self, pin: u8, mode: PinMode, detect: bool) -> Result<(), Error> {
        match Pin::from_number(pin).ok_or(Error::InvalidPin)? {
            Pin::Dt(index) => self.aux_pin_mode(index as usize, mode),
            Pin::D(index) => self.terminal_pin_mode(index as usize, mode, detect),
        }
    }

    fn aux_pin_mode(&mut self, index: usize, mode: PinMode) -> Result<(), Error> {
        match mode {
            PinMode::Input => self.aux[index].set_as_input(),
            PinMode::Output => self.aux[index].set_as_output(),
            _ => return Err(Error::InvalidMode),
        }
        self.aux_modes[index] = mode;
        Ok(())
    }

    fn terminal_pin_mode(
        &mut self,
        index: usize,
        mode: PinMode,
        detect: bool,
    ) -> Result<(), Error> {
        let bus = self.bus;
        let attempts = self.config.attempts();
        let ich = input_channel(index);
        let och = output_channel(index);

        match mode {
            PinMode::Input => {
                // Park the driver: high-side, no open-load detection, off
                let out = &mut self.outputs[och.bank];
                out.set_open_load_detect(bus, attempts, och.bit, false)?;
                out.request_mode(bus, attempts, och.bit, false)?;
                out.write(bus, attempts, och.bit, false)?;
                self.inputs[ich.bank].configure_wire_break(bus, attempts, ich.bit, detect)?;
            }
            PinMode::OutputHighSide | PinMode::OutputPushPull => {
                let push_pull = mode == PinMode::OutputPushPull;
                if push_pull && detect {
                    // Open-load detection needs high-side mode
                    return Err(Error::InvalidMode);
                }
                self.inputs[ich.bank].configure_wire_break(bus, attempts, ich.bit, false)?;
                let out = &mut self.outputs[och.bank];
                out.enable_over_voltage_protection();
                out.set_open_load_detect(bus, attempts, och.bit, detect)?;
                out.request_mode(bus, attempts, och.bit, push_pull)?;
            }
            _ => return Err(Error::InvalidMode),
        }

        self.modes[index] = mode;
        self.pwm[index].disable();
        debug!("iono: D{} -> {}", index + 1, mode);
        Ok(())
    }

    /// Configured mode of a pin
    pub fn mode(&self, pin: u8) -> Result<PinMode, Error> {
        match Pin::from_number(pin).ok_or(Error::InvalidPin)? {
            Pin::D(index) => Ok(self.modes[index as usize]),
            Pin::Dt(index) => Ok(self.aux_modes[index as usize]),
        }
    }

    /// Join or unjoin the output group of a pin
    ///
    /// Joining requires the group's join pair in high-side mode and the
    /// other pair in high-side or input mode.
    pub fn outputs_join(&mut self, pin: u8, join: bool) -> Result<(), Error> {
        let index = Pin::terminal(pin)?;
        if join && !pins::joinable(&self.modes, index) {
            return Err(Error::NotJoinable);
        }
        let ch = output_channel(index);
        let attempts = self.config.attempts();
        self.outputs[ch.bank].set_join(self.bus, attempts, pins::join_bit(ch.bit), join)
    }

    /// Read a pin level
    ///
    /// D1-D16 return the level sensed by the input chip on the last tick.
    pub fn read(&self, pin: u8) -> Result<bool, Error> {
        match Pin::from_number(pin).ok_or(Error::InvalidPin)? {
            Pin::D(index) => Ok(self.terminal_level(index as usize)),
            Pin::Dt(index) => Ok(self.aux[index as usize].is_high()),
        }
    }

    /// Drive a pin
    ///
    /// D1-D16 must be configured as outputs and are subject to the
    /// protection interlocks.
    pub fn write(&mut self, pin: u8, on: bool) -> Result<(), Error> {
        match Pin::from_number(pin).ok_or(Error::InvalidPin)? {
            Pin::D(index) => self.write_terminal(index as usize, on),
            Pin::Dt(index) => {
                self.aux[index as usize].set_state(on);
                Ok(())
            }
        }
    }

    /// Drive a pin to the inverse of its current level
    pub fn toggle(&mut self, pin: u8) -> Result<(), Error> {
        let level = self.read(pin)?;
        self.write(pin, !level)
    }

    fn terminal_level(&self, index: usize) -> bool {
        let ch = input_channel(index);
        self.inputs[ch.bank].level(ch.bit)
    }

    fn write_terminal(&mut self, index: usize, on: bool) -> Result<(), Error> {
        if !self.modes[index].is_output() {
            return Err(Error::InvalidMode);
        }
        let ch = output_channel(index);
        let attempts = self.config.attempts();
        self.outputs[ch.bank].write(self.bus, attempts, ch.bit, on)
    }

    fn toggle_terminal(&mut self, index: usize) -> Result<(), Error> {
        let level = self.terminal_level(index);
        self.write_terminal(index, !level)
    }

    /// Read-and-clear the wire-break memory of a pin
    pub fn wire_break(&mut self, pin: u8) -> Result<bool, Error> {
        let ch = input_channel(Pin::terminal(pin)?);
        Ok(self.inputs[ch.bank].take_wire_break(ch.bit))
    }

    /// Read-and-clear the open-load memory of a pin
    pub fn open_load(&mut self, pin: u8) -> Result<bool, Error> {
        let ch = output_channel(Pin::terminal(pin)?);
        Ok(self.outputs[ch.bank].take_open_load(ch.bit))
    }

    /// Read-and-clear the over-voltage memory of a pin
    pub fn over_voltage(&mut self, pin: u8) -> Result<bool, Error> {
        let ch = output_channel(Pin::terminal(pin)?);
        Ok(self.outputs[ch.bank].take_over_voltage(ch.bit))
    }

    /// Check if a pin is held on by the over-voltage interlock
    pub fn over_voltage_lock(&self, pin: u8) -> Result<bool, Error> {
        let ch = output_channel(Pin::terminal(pin)?);
        Ok(self.outputs[ch.bank].over_voltage_lock(ch.bit))
    }

    /// Read-and-clear the thermal shutdown memory of a pin
    ///
    /// Covers both the output driver's thermal shutdown and the input
    /// chip's over-temperature shutdown; both memories are cleared.
    pub fn thermal_shutdown(&mut self, pin: u8) -> Result<bool, Error> {
        let index = Pin::terminal(pin)?;
        let och = output_channel(index);
        let ich = input_channel(index);
        let driver = self.outputs[och.bank].take_thermal(och.bit);
        let input = self.inputs[ich.bank].take_over_temperature(ich.bit);
        Ok(driver || input)
    }

    /// Check if a pin is held off by the thermal interlock
    pub fn thermal_shutdown_lock(&self, pin: u8) -> Result<bool, Error> {
        let ch = output_channel(Pin::terminal(pin)?);
        Ok(self.outputs[ch.bank].thermal_lock(ch.bit))
    }

    /// Read-and-clear the temperature alarm 1 memory of a pin
    pub fn alarm_t1(&mut self, pin: u8) -> Result<bool, Error> {
        let ch = input_channel(Pin::terminal(pin)?);
        Ok(self.inputs[ch.bank].take_alarm_t1(ch.bit))
    }

    /// Read-and-clear the temperature alarm 2 memory of a pin
    pub fn alarm_t2(&mut self, pin: u8) -> Result<bool, Error> {
        let ch = input_channel(Pin::terminal(pin)?);
        Ok(self.inputs[ch.bank].take_alarm_t2(ch.bit))
    }

    /// Ask the output driver of a pin to clear its latched faults
    ///
    /// The request rides on the next frame sent to that chip.
    pub fn outputs_clear_faults(&mut self, pin: u8) -> Result<(), Error> {
        let ch = output_channel(Pin::terminal(pin)?);
        self.outputs[ch.bank].request_clear_faults();
        Ok(())
    }

    /// Subscribe to debounced level changes of a pin
    ///
    /// `None` removes the subscription.
    pub fn subscribe(
        &mut self,
        pin: u8,
        debounce_ms: u32,
        callback: Option<EdgeCallback>,
    ) -> Result<(), Error> {
        let now_ms = self.clock.now_ms();
        let slot = match Pin::from_number(pin).ok_or(Error::InvalidPin)? {
            Pin::D(index) => &mut self.subscriptions[index as usize],
            Pin::Dt(index) => &mut self.aux_subscriptions[index as usize],
        };
        *slot = callback.map(|callback| Subscription::new(callback, debounce_ms, now_ms));
        Ok(())
    }

    /// Drive `output_pin` from debounced changes of `input_pin`
    ///
    /// [`LinkMode::None`] removes the link.
    pub fn link(
        &mut self,
        input_pin: u8,
        output_pin: u8,
        mode: LinkMode,
        debounce_ms: u32,
    ) -> Result<(), Error> {
        let input = Pin::terminal(input_pin)?;
        let output = Pin::terminal(output_pin)?;
        self.links[input][output] = LinkRule::new(mode, debounce_ms, self.clock.now_ms());
        Ok(())
    }

    /// Generate software PWM on a push-pull pin
    ///
    /// `duty` is a fraction of 65535; 0 drives the pin LOW and stops the
    /// generator.
    pub fn pwm_set(&mut self, pin: u8, freq_hz: u32, duty: u16) -> Result<(), Error> {
        let index = Pin::terminal(pin)?;
        if self.modes[index] != PinMode::OutputPushPull {
            return Err(Error::InvalidMode);
        }
        let level = self.pwm[index].configure(freq_hz, duty, self.clock.now_us())?;
        let ch = output_channel(index);
        let attempts = self.config.attempts();
        self.outputs[ch.bank].write(self.bus, attempts, ch.bit, level)
    }

    /// PWM state of a pin
    pub fn pwm(&self, pin: u8) -> Result<&PwmChannel, Error> {
        Ok(&self.pwm[Pin::terminal(pin)?])
    }

    /// Request the status indicator state; applied on the next tick
    pub fn led_set(&mut self, on: bool) {
        self.led_requested = on;
    }

    /// Requested status indicator state
    pub fn led(&self) -> bool {
        self.led_requested
    }

    /// Input chip `index` (0 = D1-D8, 1 = D9-D16)
    pub fn input_bank(&self, index: usize) -> Option<&InputBank> {
        self.inputs.get(index)
    }

    /// Output driver `index` (0 = D1-D8, 1 = D9-D16)
    pub fn output_bank(&self, index: usize) -> Option<&OutputBank> {
        self.outputs.get(index)
    }
}
