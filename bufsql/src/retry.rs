//! Fingerprints of lines that failed to decode.

use std::collections::{HashSet, VecDeque};

pub const DEFAULT_CAPACITY: usize = 10_000;

/// Bounded set of trimmed lines that failed decoding in an earlier cycle.
/// Lines are kept as raw bytes, so text that is not UTF-8 is tracked too.
///
/// Once `capacity` is reached the oldest fingerprint is evicted, after which
/// that text is treated as a fresh line again.
#[derive(Debug, Clone)]
pub struct RetryTracker {
    known: HashSet<Vec<u8>>,
    order: VecDeque<Vec<u8>>,
    capacity: usize,
}

impl Default for RetryTracker {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl RetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            known: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Never evicts.
    pub fn unbounded() -> Self {
        Self::with_capacity(usize::MAX)
    }

    pub fn is_known_failure(&self, trimmed: impl AsRef<[u8]>) -> bool {
        self.known.contains(trimmed.as_ref())
    }

    /// Track a failed line. Returns false if it was already tracked.
    pub fn record_failure(&mut self, trimmed: impl AsRef<[u8]>) -> bool {
        let trimmed = trimmed.as_ref();
        if self.known.contains(trimmed) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.known.remove(&oldest);
            }
        }
        self.known.insert(trimmed.to_vec());
        self.order.push_back(trimmed.to_vec());
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_lookup() {
        let mut tracker = RetryTracker::new();
        assert!(tracker.record_failure("foo;bar:baz"));
        assert!(!tracker.record_failure("foo;bar:baz"));
        assert!(tracker.is_known_failure("foo;bar:baz"));
        assert!(!tracker.is_known_failure("foo;bar:qux"));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_evicts_oldest() {
        let mut tracker = RetryTracker::with_capacity(2);
        tracker.record_failure("a");
        tracker.record_failure("b");
        tracker.record_failure("c");

        assert!(!tracker.is_known_failure("a"));
        assert!(tracker.is_known_failure("b"));
        assert!(tracker.is_known_failure("c"));
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_tracks_raw_bytes() {
        let mut tracker = RetryTracker::new();
        tracker.record_failure(b"bad\xffline");

        assert!(tracker.is_known_failure(b"bad\xffline"));
        assert!(!tracker.is_known_failure("bad\u{fffd}line"));
    }

    #[test]
    fn test_unbounded_keeps_everything() {
        let mut tracker = RetryTracker::unbounded();
        for i in 0..(DEFAULT_CAPACITY + 5) {
            tracker.record_failure(i.to_string());
        }
        assert_eq!(tracker.len(), DEFAULT_CAPACITY + 5);
        assert!(tracker.is_known_failure("0"));
    }
}
