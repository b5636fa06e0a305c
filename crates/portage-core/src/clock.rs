#![forbid(unsafe_code)]

//! Monotonic time source.
//!
//! The runtime never reads the wall clock directly; it asks a [`Clock`]. Hosts
//! use [`SystemClock`]; tests substitute a manually advanced clock so that the
//! minimum operation gap and the watchdog can be exercised deterministically.

use web_time::Instant;

/// Source of monotonic instants.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
