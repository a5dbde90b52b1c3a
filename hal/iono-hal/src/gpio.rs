//! GPIO pin abstractions
//!
//! The auxiliary DT pins are plain MCU GPIOs that the application can switch
//! between input and output at runtime.

/// Digital output pin
pub trait OutputPin {
    /// Set the pin high (logic 1)
    fn set_high(&mut self);

    /// Set the pin low (logic 0)
    fn set_low(&mut self);

    /// Set the pin to a specific state
    fn set_state(&mut self, high: bool) {
        if high {
            self.set_high();
        } else {
            self.set_low();
        }
    }
}

/// Digital input pin
pub trait InputPin {
    /// Check if the pin reads high (logic 1)
    fn is_high(&self) -> bool;

    /// Check if the pin reads low (logic 0)
    fn is_low(&self) -> bool {
        !self.is_high()
    }
}

/// Pin that can be switched between input and output at runtime
pub trait IoPin: OutputPin + InputPin {
    /// Reconfigure as a floating input
    fn set_as_input(&mut self);

    /// Reconfigure as a push-pull output
    fn set_as_output(&mut self);
}
