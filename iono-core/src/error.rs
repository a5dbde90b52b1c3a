//! Driver error type

/// Reasons a pin-level operation can fail
///
/// No operation panics or unwinds; every failure is reported through this
/// value and leaves previously cached device state intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Pin number outside the valid set for this operation
    InvalidPin,
    /// Mode not allowed for this pin, or operation not allowed in the
    /// pin's current mode
    InvalidMode,
    /// Output group cannot be joined with the current pin modes
    NotJoinable,
    /// PWM frequency out of range
    InvalidFrequency,
    /// Frame check failed (or the bus errored) on every retry
    Transport,
    /// Configuration read-back did not match the written value
    Verify,
    /// Request conflicts with an active protection lockout
    Locked,
}

impl Error {
    /// Check if the failure came from the bus rather than the arguments
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport | Error::Verify)
    }
}
