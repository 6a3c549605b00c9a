//! Event-channel notification policy (spec §4.1 "Notification policy").
//!
//! The ring crate does not own the doorbell itself - that's
//! `xsplit-evtchn`'s job - but it does own the threshold math that decides
//! *when* a doorbell is due, since that's part of the ring protocol, not
//! the transport underneath it.

/// The peer side of the notification doorbell. Implemented by
/// `xsplit-evtchn::EventChannel` in the real stack; trivial
/// implementations are useful for tests.
pub trait RingNotify {
    fn notify(&self);
}

/// A notifier that does nothing - useful when exercising the ring
/// protocol without a real event channel.
pub struct NullNotify;

impl RingNotify for NullNotify {
    fn notify(&self) {}
}

impl<F: Fn()> RingNotify for F {
    fn notify(&self) {
        self()
    }
}

/// Compute the next notification threshold after consuming up to
/// `consumed` with the producer currently at `producer`.
///
/// Spec §4.1: "the producer computes a new event threshold equal to
/// approximately one-half of the outstanding window
/// (`prod + (req_prod - prod)/2 + 1`) so that batching amortises
/// doorbells while guaranteeing at least one notification per window."
#[inline]
pub fn next_event_threshold(consumed: u64, producer: u64) -> u64 {
    let outstanding = producer.saturating_sub(consumed);
    consumed + outstanding / 2 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_the_outstanding_window() {
        assert_eq!(next_event_threshold(0, 0), 1);
        assert_eq!(next_event_threshold(10, 10), 11);
        assert_eq!(next_event_threshold(0, 10), 6);
        assert_eq!(next_event_threshold(5, 9), 7);
    }

    #[test]
    fn at_least_one_notification_per_window() {
        // Even with a huge backlog the threshold is strictly ahead of
        // `consumed`, so the consumer is guaranteed to be notified again.
        let t = next_event_threshold(100, 100_000);
        assert!(t > 100);
        assert!(t <= 100_000);
    }
}
