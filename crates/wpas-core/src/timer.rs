// ── Virtual-clock timer queue ──
//
// Each state machine keeps its own queue of named timeouts measured on a
// virtual clock. At most one deadline exists per key: `schedule` always
// replaces, so every call site is cancel-then-reschedule. The owner
// drives time forward with `pop_due` and dispatches whatever fires.

use std::hash::Hash;
use std::time::Duration;

use indexmap::IndexMap;

#[derive(Debug, Clone)]
pub struct TimerQueue<K> {
    now: Duration,
    deadlines: IndexMap<K, Duration>,
}

impl<K> Default for TimerQueue<K> {
    fn default() -> Self {
        Self {
            now: Duration::ZERO,
            deadlines: IndexMap::new(),
        }
    }
}

impl<K: Copy + Eq + Hash> TimerQueue<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Arm `key` to fire `delay` from now, replacing any earlier arming.
    pub fn schedule(&mut self, key: K, delay: Duration) {
        self.deadlines.insert(key, self.now + delay);
    }

    /// Returns whether the key was armed.
    pub fn cancel(&mut self, key: K) -> bool {
        self.deadlines.shift_remove(&key).is_some()
    }

    pub fn is_pending(&self, key: K) -> bool {
        self.deadlines.contains_key(&key)
    }

    /// Time left before `key` fires.
    pub fn remaining(&self, key: K) -> Option<Duration> {
        self.deadlines
            .get(&key)
            .map(|at| at.saturating_sub(self.now))
    }

    /// Earliest deadline of any armed key, as an absolute virtual time.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return the earliest key due at or before `limit`,
    /// moving the clock to its deadline. Ties fire in arming order.
    pub fn pop_due(&mut self, limit: Duration) -> Option<K> {
        let (idx, at) = self
            .deadlines
            .values()
            .enumerate()
            .filter(|(_, at)| **at <= limit)
            .min_by_key(|(i, at)| (**at, *i))
            .map(|(i, at)| (i, *at))?;
        let (key, _) = self.deadlines.shift_remove_index(idx)?;
        self.now = self.now.max(at);
        Some(key)
    }

    /// Move the clock forward without firing anything.
    pub fn set_now(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }

    pub fn pending(&self) -> impl Iterator<Item = (K, Duration)> + '_ {
        self.deadlines.iter().map(|(k, at)| (*k, *at))
    }
}
