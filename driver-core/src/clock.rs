//! Monotonic time source.

/// Microsecond monotonic clock.
///
/// Implementations wrap the platform timer (embassy-time on the RP2040);
/// tests drive a manual clock. Values must never go backwards.
pub trait Clock {
    fn now_us(&self) -> u64;

    #[inline]
    fn elapsed_us(&self, since_us: u64) -> u64 {
        self.now_us().saturating_sub(since_us)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    #[inline]
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}
