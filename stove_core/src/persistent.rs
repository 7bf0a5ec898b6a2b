//! A value that remembers when it was last written.
//!
//! Bridges discrete user actions ("I just set the valve", "I just added wood")
//! into continuous duration signals the fuzzy rules can read.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use stove_traits::Clock;

struct Slot<V> {
    value: V,
    changed_at: Option<Instant>,
}

/// Shared, timestamped state. Clones observe the same slot.
pub struct PersistentStateWithTimestamp<V> {
    slot: Arc<Mutex<Slot<V>>>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl<V> Clone for PersistentStateWithTimestamp<V> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<V: Clone> PersistentStateWithTimestamp<V> {
    /// A state holding `initial` that has never been written.
    pub fn new(initial: V, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                value: initial,
                changed_at: None,
            })),
            clock,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot<V>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set(&self, value: V) {
        let now = self.clock.now();
        let mut slot = self.slot();
        slot.value = value;
        slot.changed_at = Some(now);
    }

    pub fn get(&self) -> V {
        self.slot().value.clone()
    }

    pub fn last_changed(&self) -> Option<Instant> {
        self.slot().changed_at
    }

    /// Time since the last `set`; `Duration::MAX` if it was never written.
    pub fn time_since_last_change(&self) -> Duration {
        match self.last_changed() {
            Some(at) => self.clock.since(at),
            None => Duration::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stove_traits::ManualClock;

    #[test]
    fn never_written_is_infinitely_old() {
        let clock = Arc::new(ManualClock::new());
        let s = PersistentStateWithTimestamp::new(None::<f64>, clock);
        assert_eq!(s.time_since_last_change(), Duration::MAX);
        assert_eq!(s.get(), None);
    }

    #[test]
    fn tracks_time_since_write() {
        let clock = Arc::new(ManualClock::new());
        let s = PersistentStateWithTimestamp::new(None, clock.clone());
        s.set(Some(0.3));
        clock.advance(Duration::from_secs(300));
        assert_eq!(s.get(), Some(0.3));
        assert_eq!(s.time_since_last_change(), Duration::from_secs(300));
        let other = s.clone();
        other.set(Some(0.5));
        assert_eq!(s.time_since_last_change(), Duration::ZERO);
        assert_eq!(s.get(), Some(0.5));
    }
}
