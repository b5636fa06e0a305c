#![forbid(unsafe_code)]

//! Manually advanced clock.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use portage_core::Clock;
use web_time::Instant;

/// Clock that only moves when told to.
///
/// Clones share the same time, so a test can hand one clone to a context and
/// keep another to advance it.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Rc<Cell<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset.get()
    }
}
