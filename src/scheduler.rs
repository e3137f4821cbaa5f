use std::time::{Duration, Instant};

/// Deferred tasks keyed by target. Scheduling a key again replaces the
/// pending task for it, so at most one task per key is ever outstanding.
///
/// The scheduler owns no timers: the host passes the current time in and
/// collects whatever is due.
#[derive(Debug)]
pub struct TaskScheduler<K> {
    delay: Duration,
    pending: Vec<(K, Instant)>,
}

impl<K: PartialEq + Clone> TaskScheduler<K> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Vec::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedules `key` to become due after the configured delay. Returns
    /// `true` if a pending task for the same key was cancelled.
    pub fn schedule(&mut self, key: K, now: Instant) -> bool {
        let replaced = self.cancel(&key);
        self.pending.push((key, now + self.delay));
        replaced
    }

    pub fn cancel(&mut self, key: &K) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(pending, _)| pending != key);
        self.pending.len() != before
    }

    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.iter().any(|(pending, _)| pending == key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|(_, deadline)| *deadline).min()
    }

    /// Removes and returns every key due at `now`, earliest deadline first.
    pub fn take_due(&mut self, now: Instant) -> Vec<K> {
        let mut due: Vec<(K, Instant)> = Vec::new();
        let mut idx = 0;
        while idx < self.pending.len() {
            if self.pending[idx].1 <= now {
                due.push(self.pending.remove(idx));
            } else {
                idx += 1;
            }
        }
        due.sort_by_key(|(_, deadline)| *deadline);
        due.into_iter().map(|(key, _)| key).collect()
    }
}
