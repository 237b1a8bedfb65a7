//! Write coalescing.
//!
//! A device only ever needs its most recent target position. [`PendingWrite`]
//! keeps that target next to the last value handed to the transport, and a
//! flush sends at most one write carrying the latest target.
//!
//! "Written" means accepted for dispatch, not acknowledged by the peripheral.
//! A write the transport accepted but the peripheral dropped is not re-sent
//! until a different value is requested.

/// Outcome of a flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing to send: no target, or the target was already sent.
    Idle,
    /// The transport accepted a write of this value.
    Sent(u32),
    /// The transport refused to queue a write of this value.
    Rejected(u32),
}

/// Requested and dispatched values for one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingWrite {
    to_write: Option<u32>,
    written: Option<u32>,
}

impl PendingWrite {
    /// Create an empty pending write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new target, replacing any earlier unsent one.
    pub fn request(&mut self, value: u32) {
        self.to_write = Some(value);
    }

    /// The most recently requested value.
    pub fn to_write(&self) -> Option<u32> {
        self.to_write
    }

    /// The last value accepted by the transport.
    pub fn written(&self) -> Option<u32> {
        self.written
    }

    /// The value a flush would send, if any.
    pub fn pending(&self) -> Option<u32> {
        match self.to_write {
            Some(value) if self.written != Some(value) => Some(value),
            _ => None,
        }
    }

    /// Send the pending value through `dispatch`.
    ///
    /// `dispatch` returns whether the transport accepted the write; only then
    /// is the value recorded as written.
    pub fn flush(&mut self, dispatch: impl FnOnce(u32) -> bool) -> FlushOutcome {
        let Some(value) = self.pending() else {
            return FlushOutcome::Idle;
        };
        if dispatch(value) {
            self.written = Some(value);
            FlushOutcome::Sent(value)
        } else {
            FlushOutcome::Rejected(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_is_idle() {
        let mut pending = PendingWrite::new();
        assert_eq!(pending.pending(), None);
        assert_eq!(pending.flush(|_| panic!("nothing to send")), FlushOutcome::Idle);
    }

    #[test]
    fn test_burst_collapses_to_latest() {
        let mut pending = PendingWrite::new();
        pending.request(50);
        pending.request(25);

        let mut sent = Vec::new();
        let outcome = pending.flush(|v| {
            sent.push(v);
            true
        });
        assert_eq!(outcome, FlushOutcome::Sent(25));
        assert_eq!(sent, vec![25]);
        assert_eq!(pending.written(), Some(25));
    }

    #[test]
    fn test_same_value_is_not_resent() {
        let mut pending = PendingWrite::new();
        pending.request(75);
        assert_eq!(pending.flush(|_| true), FlushOutcome::Sent(75));

        pending.request(75);
        assert_eq!(pending.flush(|_| panic!("already written")), FlushOutcome::Idle);
    }

    #[test]
    fn test_rejected_write_stays_pending() {
        let mut pending = PendingWrite::new();
        pending.request(100);
        assert_eq!(pending.flush(|_| false), FlushOutcome::Rejected(100));
        assert_eq!(pending.written(), None);
        assert_eq!(pending.pending(), Some(100));

        assert_eq!(pending.flush(|_| true), FlushOutcome::Sent(100));
        assert_eq!(pending.pending(), None);
    }

    #[test]
    fn test_return_to_earlier_value_is_sent() {
        let mut pending = PendingWrite::new();
        pending.request(0);
        pending.flush(|_| true);
        pending.request(50);
        pending.flush(|_| true);
        pending.request(0);
        assert_eq!(pending.flush(|_| true), FlushOutcome::Sent(0));
    }

    proptest! {
        #[test]
        fn flush_sends_only_the_last_request(values in proptest::collection::vec(any::<u32>(), 1..20)) {
            let mut pending = PendingWrite::new();
            for v in &values {
                pending.request(*v);
            }
            let mut sent = Vec::new();
            pending.flush(|v| { sent.push(v); true });
            prop_assert_eq!(sent, vec![*values.last().unwrap()]);
            prop_assert_eq!(pending.pending(), None);
        }
    }
}
