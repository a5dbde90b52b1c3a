//! Per-channel bit helpers
//!
//! Every chip register handled by the driver is one byte with one bit per
//! channel.

/// Read bit `index` of `value`
#[inline]
pub const fn bit(value: u8, index: u8) -> bool {
    (value >> index) & 1 == 1
}

/// Return `value` with bit `index` forced to `on`
#[inline]
pub const fn with_bit(value: u8, index: u8, on: bool) -> u8 {
    let mask = 1 << index;
    if on {
        value | mask
    } else {
        value & !mask
    }
}

/// Set bit `index` of `target` to `on`
#[inline]
pub fn set_bit(target: &mut u8, index: u8, on: bool) {
    *target = with_bit(*target, index, on);
}

/// Latched fault memory, one bit per channel
///
/// Bits are only ever added by the polling cycle and only removed by an
/// explicit [`take`](StickyBits::take) from the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StickyBits(u8);

impl StickyBits {
    /// Create an empty memory
    pub const fn new() -> Self {
        Self(0)
    }

    /// OR a raw sample into the memory
    pub fn latch(&mut self, raw: u8) {
        self.0 |= raw;
    }

    /// Latch every channel when a chip-wide condition is raised
    pub fn latch_all_if(&mut self, raised: bool) {
        if raised {
            self.0 = 0xFF;
        }
    }

    /// Read-and-clear a single channel
    pub fn take(&mut self, index: u8) -> bool {
        let was = bit(self.0, index);
        set_bit(&mut self.0, index, false);
        was
    }

    /// Read a channel without clearing it
    pub fn peek(&self, index: u8) -> bool {
        bit(self.0, index)
    }

    /// Raw memory contents
    pub fn raw(&self) -> u8 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_helpers() {
        assert!(bit(0b0000_0100, 2));
        assert!(!bit(0b0000_0100, 3));
        assert_eq!(with_bit(0, 7, true), 0x80);
        assert_eq!(with_bit(0xFF, 0, false), 0xFE);

        let mut v = 0u8;
        set_bit(&mut v, 4, true);
        assert_eq!(v, 0x10);
        set_bit(&mut v, 4, false);
        assert_eq!(v, 0);
    }

    #[test]
    fn test_sticky_latches_until_taken() {
        let mut mem = StickyBits::new();
        mem.latch(0b0000_0010);
        // A later clean sample must not clear the memory
        mem.latch(0);
        assert!(mem.peek(1));

        assert!(mem.take(1));
        assert!(!mem.take(1));
        assert_eq!(mem.raw(), 0);
    }

    #[test]
    fn test_sticky_take_is_per_channel() {
        let mut mem = StickyBits::new();
        mem.latch(0b1000_0001);
        assert!(mem.take(0));
        assert!(mem.peek(7));
        assert_eq!(mem.raw(), 0x80);
    }

    #[test]
    fn test_chip_wide_latch() {
        let mut mem = StickyBits::new();
        mem.latch_all_if(false);
        assert_eq!(mem.raw(), 0);
        mem.latch_all_if(true);
        assert_eq!(mem.raw(), 0xFF);
    }
}
