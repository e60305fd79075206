//! Timing helpers for protocols that clock bits over GPIO themselves.

/// Detects rising edges on a sampled line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EdgeDetector {
    last: bool,
}

impl EdgeDetector {
    #[must_use]
    pub const fn new(level: bool) -> Self {
        Self { last: level }
    }

    /// Feed a sample. Returns `true` on a low-to-high transition.
    pub fn rising(&mut self, level: bool) -> bool {
        let edge = level && !self.last;
        self.last = level;
        edge
    }

    pub fn reset(&mut self, level: bool) {
        self.last = level;
    }
}

/// Nominal timing of a latched shift-register read.
///
/// The bus master holds the latch for `latch_us`, then pulses the clock once
/// per `period_us` until every bit has been read. The slave only follows the
/// edges; the schedule bounds how long a read may take and how often the lines
/// must be sampled so that no pulse is missed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ShiftSchedule {
    pub latch_us: u32,
    pub period_us: u32,
    pub bits: u8,
}

impl ShiftSchedule {
    #[must_use]
    pub const fn new(latch_us: u32, period_us: u32, bits: u8) -> Self {
        Self {
            latch_us,
            period_us,
            bits,
        }
    }

    /// Total duration of the read.
    #[must_use]
    pub const fn duration_us(&self) -> u64 {
        self.latch_us as u64 + (self.bits as u64).saturating_sub(1) * self.period_us as u64
    }

    /// Longest sampling interval that still sees every latch pulse and both
    /// halves of every clock period.
    #[must_use]
    pub const fn sample_interval_us(&self) -> u32 {
        let shortest = if self.latch_us < self.period_us {
            self.latch_us
        } else {
            self.period_us
        };
        if shortest < 2 {
            1
        } else {
            shortest / 2
        }
    }
}

/// Level of bit `slot` of a 16-bit word shifted out MSB first.
#[inline]
#[must_use]
pub const fn msb_first_bit(word: u16, slot: u8) -> bool {
    slot < 16 && word & (0x8000 >> slot) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rising_edge() {
        let mut e = EdgeDetector::new(false);
        assert!(!e.rising(false));
        assert!(e.rising(true));
        assert!(!e.rising(true));
        assert!(!e.rising(false));
        assert!(e.rising(true));
    }

    #[test]
    fn test_schedule_bounds() {
        let s = ShiftSchedule::new(12, 12, 16);
        assert_eq!(s.duration_us(), 12 + 15 * 12);
        assert_eq!(s.sample_interval_us(), 6);
        assert_eq!(ShiftSchedule::new(40, 10, 16).sample_interval_us(), 5);
        assert_eq!(ShiftSchedule::new(1, 1, 16).sample_interval_us(), 1);
    }

    #[test]
    fn test_msb_first_bit() {
        assert!(msb_first_bit(0x8000, 0));
        assert!(!msb_first_bit(0x8000, 1));
        assert!(msb_first_bit(0x0001, 15));
        assert!(!msb_first_bit(0xFFFF, 16));
    }
}
