// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Time source used by every bounded poll

/// Monotonic millisecond clock plus a blocking delay.
///
/// Polls (core halt, reset, flash busy) measure their bounds against
/// [`Timer::now_ms`] and sleep between reads with [`Timer::delay_ms`].  Both
/// must busy-wait: nothing in this crate expects to yield.
///
/// Firmware typically implements this over the chip's system timer; tests
/// use a simulated clock that advances only when delayed, so a timeout can
/// be exercised without real time passing.
pub trait Timer {
    /// Milliseconds since an arbitrary fixed point.
    fn now_ms(&self) -> u64;

    /// Blocks for at least `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);

    /// Milliseconds elapsed since `start`, a value previously returned by
    /// [`Timer::now_ms`].
    fn elapsed_ms(&self, start: u64) -> u64 {
        self.now_ms().saturating_sub(start)
    }
}
