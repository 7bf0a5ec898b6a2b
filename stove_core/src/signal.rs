//! Observable "current value" cells with push notification.
//!
//! A `Signal` keeps the last published `TimestampedValue` for readers that
//! want the replayed current value, and fans every new value out to
//! subscribers that want to block until something new arrives.

use crossbeam_channel as xch;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use stove_traits::Clock;

use crate::timeseries::TimestampedValue;

struct Inner<V> {
    name: String,
    current: RwLock<Option<TimestampedValue<V>>>,
    subscribers: Mutex<Vec<xch::Sender<TimestampedValue<V>>>>,
}

/// Single-writer, multi-reader observable value. Clones share the same cell.
pub struct Signal<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for Signal<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> std::fmt::Debug for Signal<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<V: Clone + Send + 'static> Signal<V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                current: RwLock::new(None),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Replace the current value and notify subscribers. Disconnected
    /// subscribers are dropped.
    pub fn publish(&self, sample: TimestampedValue<V>) {
        {
            let mut cur = self
                .inner
                .current
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *cur = Some(sample.clone());
        }
        lock(&self.inner.subscribers).retain(|tx| tx.send(sample.clone()).is_ok());
    }

    /// The last published value regardless of its age.
    pub fn latest(&self) -> Option<TimestampedValue<V>> {
        self.inner
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The last published value, or `None` if nothing was published within `validity`.
    pub fn value_if_fresh(&self, now: Instant, validity: Duration) -> Option<V> {
        self.latest()
            .and_then(|tv| tv.value_if_fresh(now, validity).cloned())
    }

    /// Receive every value published from now on.
    pub fn subscribe(&self) -> xch::Receiver<TimestampedValue<V>> {
        let (tx, rx) = xch::unbounded();
        lock(&self.inner.subscribers).push(tx);
        rx
    }

    /// Block until a value is published after this call, or `timeout` expires.
    pub fn next(&self, timeout: Duration) -> Option<TimestampedValue<V>> {
        self.subscribe().recv_timeout(timeout).ok()
    }

    /// Block until the current value is fresh and satisfies `condition`, or `timeout` expires.
    pub fn wait_for(
        &self,
        clock: &dyn Clock,
        validity: Duration,
        timeout: Duration,
        mut condition: impl FnMut(&V) -> bool,
    ) -> Option<V> {
        let rx = self.subscribe();
        if let Some(v) = self.value_if_fresh(clock.now(), validity)
            && condition(&v)
        {
            return Some(v);
        }
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(tv) => {
                    if tv.age(clock.now()) <= validity && condition(&tv.value) {
                        return Some(tv.value);
                    }
                }
                Err(_) => return None,
            }
        }
    }
}
