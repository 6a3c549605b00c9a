//! TX credit shaping: a token bucket refilled once per `credit_usec`
//! window, bounding the bytes one interface may send to `credit_bytes`
//! per window plus at most one more packet (spec §3 "Credit invariant",
//! §4.7 step 2, §8 property 5).

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Admitted,
    /// Not enough credit remains this window; the caller should stop
    /// scheduling the interface and rearm a timer for `retry_at`.
    Deferred { retry_at: Instant },
}

pub struct CreditShaper {
    credit_bytes: u64,
    credit_usec: u64,
    remaining: u64,
    deadline: Instant,
}

impl CreditShaper {
    /// `now` is taken explicitly rather than read internally so the
    /// whole admission path stays driven by one clock reading per
    /// tasklet pass (and so it can be tested without real sleeps).
    pub fn new(credit_bytes: u64, credit_usec: u64, now: Instant) -> Self {
        Self {
            credit_bytes,
            credit_usec,
            remaining: credit_bytes,
            deadline: now + Duration::from_micros(credit_usec.max(1)),
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// A `CreditLimit` control message updates the window without
    /// resetting the currently accrued allowance (spec §6 control
    /// messages: `CreditLimit(handle, bytes, usec)`).
    pub fn set_limit(&mut self, credit_bytes: u64, credit_usec: u64) {
        self.credit_bytes = credit_bytes;
        self.credit_usec = credit_usec;
    }

    /// Admit `size` bytes at `now`, replenishing the bucket if `now`
    /// has crossed the deadline (spec §4.7 step 2).
    pub fn admit(&mut self, size: u64, now: Instant) -> CreditOutcome {
        if now >= self.deadline {
            self.remaining = self.credit_bytes;
            self.deadline = now + Duration::from_micros(self.credit_usec.max(1));
        }
        if size > self.remaining {
            return CreditOutcome::Deferred { retry_at: self.deadline };
        }
        self.remaining -= size;
        CreditOutcome::Admitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scenario S4: credit_bytes=10000, credit_usec=100000, 20 packets
    /// of 1500 B. The first window admits floor(10000/1500) = 6.
    #[test]
    fn s4_credit_shaping_admits_six_then_defers() {
        let t0 = Instant::now();
        let mut shaper = CreditShaper::new(10_000, 100_000, t0);

        let mut admitted = 0;
        for _ in 0..20 {
            match shaper.admit(1500, t0) {
                CreditOutcome::Admitted => admitted += 1,
                CreditOutcome::Deferred { .. } => break,
            }
        }
        assert_eq!(admitted, 6);
        assert_eq!(shaper.remaining(), 1000);

        // Past the deadline the bucket replenishes and more are admitted.
        let t1 = t0 + Duration::from_micros(100_000);
        assert_eq!(shaper.admit(1500, t1), CreditOutcome::Admitted);
        assert_eq!(shaper.remaining(), 8_500);
    }

    #[test]
    fn oversized_single_packet_still_defers_until_replenished() {
        let t0 = Instant::now();
        let mut shaper = CreditShaper::new(1000, 1000, t0);
        assert_eq!(shaper.admit(1500, t0), CreditOutcome::Deferred { retry_at: shaper.deadline() });
        let t1 = t0 + Duration::from_micros(1000);
        assert_eq!(shaper.admit(1500, t1), CreditOutcome::Deferred { retry_at: shaper.deadline() });
    }
}
