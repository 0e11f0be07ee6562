//! Single-slot deadline timer.
//!
//! A `TimerSlot` holds at most one pending deadline tagged with a kind.
//! Arming always replaces whatever was pending, so a burst of requests yields
//! exactly one expiry, measured from the last request.  Nothing here sleeps:
//! the owner asks for the deadline and reports the current time back, which
//! lets tests drive it with a virtual clock.

use std::time::Instant;

#[derive(Debug, Clone)]
pub struct TimerSlot<K> {
    pending: Option<(K, Instant)>,
}

impl<K> Default for TimerSlot<K> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<K: Copy> TimerSlot<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the slot, returning the kind that was cancelled, if any.
    pub fn arm(&mut self, kind: K, deadline: Instant) -> Option<K> {
        self.pending.replace((kind, deadline)).map(|(k, _)| k)
    }

    pub fn cancel(&mut self) -> Option<K> {
        self.pending.take().map(|(k, _)| k)
    }

    pub fn kind(&self) -> Option<K> {
        self.pending.map(|(k, _)| k)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, d)| d)
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Disarm and return the kind if its deadline has passed.
    pub fn take_expired(&mut self, now: Instant) -> Option<K> {
        match self.pending {
            Some((kind, deadline)) if deadline <= now => {
                self.pending = None;
                Some(kind)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_arm_replaces_pending() {
        let t0 = Instant::now();
        let mut slot = TimerSlot::new();
        assert_eq!(slot.arm('a', t0 + Duration::from_millis(100)), None);
        assert_eq!(slot.arm('b', t0 + Duration::from_millis(300)), Some('a'));
        assert_eq!(slot.kind(), Some('b'));
        assert_eq!(slot.deadline(), Some(t0 + Duration::from_millis(300)));
    }

    #[test]
    fn test_take_expired_only_at_deadline() {
        let t0 = Instant::now();
        let mut slot = TimerSlot::new();
        slot.arm((), t0 + Duration::from_millis(100));
        assert_eq!(slot.take_expired(t0 + Duration::from_millis(99)), None);
        assert!(slot.is_armed());
        assert_eq!(slot.take_expired(t0 + Duration::from_millis(100)), Some(()));
        assert!(!slot.is_armed());
        assert_eq!(slot.take_expired(t0 + Duration::from_millis(200)), None);
    }

    #[test]
    fn test_cancel() {
        let mut slot: TimerSlot<u8> = TimerSlot::new();
        assert_eq!(slot.cancel(), None);
        slot.arm(7u8, Instant::now());
        assert_eq!(slot.cancel(), Some(7));
        assert_eq!(slot.deadline(), None);
    }
}
