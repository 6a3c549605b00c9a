//! A manually-advanced clock for credit-shaping and timeout tests that
//! need to cross real time windows without sleeping the test thread.

use std::time::{Duration, Instant};

pub struct ManualClock {
    now: Instant,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { now: Instant::now() }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn advance(&mut self, by: Duration) -> Instant {
        self.now += by;
        self.now
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}
