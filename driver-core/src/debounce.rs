//! Pin-level debouncing.

/// Debounce state for a single pin.
///
/// Keeps the last raw sample and the accepted (debounced) level. A raw change
/// restarts the window; the debounced level only follows once the raw level
/// has held for the whole window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Debouncer {
    raw: bool,
    stable: bool,
    last_change_us: u64,
    window_us: u64,
}

impl Debouncer {
    /// Start with `level` already accepted.
    #[must_use]
    pub const fn new(level: bool, window_ms: u32, now_us: u64) -> Self {
        Self {
            raw: level,
            stable: level,
            last_change_us: now_us,
            window_us: window_ms as u64 * 1000,
        }
    }

    /// Feed a raw sample. Returns `true` if the debounced level changed.
    pub fn update(&mut self, raw: bool, now_us: u64) -> bool {
        if raw != self.raw {
            self.raw = raw;
            self.last_change_us = now_us;
        }

        if now_us.saturating_sub(self.last_change_us) >= self.window_us {
            let changed = self.stable != self.raw;
            self.stable = self.raw;
            changed
        } else {
            false
        }
    }

    /// Accepted level.
    #[inline]
    #[must_use]
    pub const fn level(&self) -> bool {
        self.stable
    }

    /// Last raw sample, possibly still bouncing.
    #[inline]
    #[must_use]
    pub const fn raw(&self) -> bool {
        self.raw
    }

    #[inline]
    #[must_use]
    pub const fn window_us(&self) -> u64 {
        self.window_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_window_follows_raw() {
        let mut d = Debouncer::new(false, 0, 0);
        assert!(d.update(true, 10));
        assert!(d.level());
        assert!(!d.update(true, 20));
    }

    #[test]
    fn test_change_accepted_after_window() {
        let mut d = Debouncer::new(false, 5, 0);
        assert!(!d.update(true, 1_000));
        assert!(!d.update(true, 5_999));
        assert!(!d.level());
        assert!(d.update(true, 6_000));
        assert!(d.level());
    }

    #[test]
    fn test_bounce_restarts_window() {
        let mut d = Debouncer::new(false, 5, 0);
        d.update(true, 1_000);
        d.update(false, 3_000);
        d.update(true, 4_000);
        // 5 ms after the first edge, but only 2 ms after the last one.
        assert!(!d.update(true, 6_000));
        assert!(!d.level());
        assert!(d.update(true, 9_000));
    }

    #[test]
    fn test_glitch_shorter_than_window_is_ignored() {
        let mut d = Debouncer::new(true, 2, 0);
        d.update(false, 100);
        d.update(true, 500);
        assert!(!d.update(true, 10_000));
        assert!(d.level());
        assert!(d.raw());
    }
}
