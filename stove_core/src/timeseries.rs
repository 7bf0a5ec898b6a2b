//! Timestamped values and the stateful stream stages built on them.
//!
//! Each stage is a plain struct fed one sample at a time; the pipeline thread
//! chains them. Windows are anchored on the newest sample's timestamp so a
//! recorded trace replays exactly like live data.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::util::{hours_between, midpoint};

/// A value together with the instant it was observed or derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampedValue<V> {
    pub value: V,
    pub at: Instant,
}

impl<V> TimestampedValue<V> {
    pub fn new(value: V, at: Instant) -> Self {
        Self { value, at }
    }

    pub fn map<W>(self, f: impl FnOnce(V) -> W) -> TimestampedValue<W> {
        TimestampedValue {
            value: f(self.value),
            at: self.at,
        }
    }

    /// Age relative to `now`; zero for values stamped in the future.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.at)
    }

    /// The value, unless it is older than `validity`.
    pub fn value_if_fresh(&self, now: Instant, validity: Duration) -> Option<&V> {
        (self.age(now) <= validity).then_some(&self.value)
    }
}

/// Sliding window keeping samples younger than `span` relative to the newest one.
#[derive(Debug, Clone)]
pub struct TimeWindow<V> {
    span: Duration,
    buf: VecDeque<TimestampedValue<V>>,
}

impl<V> TimeWindow<V> {
    pub fn new(span: Duration) -> Self {
        Self {
            span,
            buf: VecDeque::new(),
        }
    }

    /// Append a sample and evict everything that fell out of the window.
    pub fn push(&mut self, sample: TimestampedValue<V>) -> &VecDeque<TimestampedValue<V>> {
        let newest = sample.at;
        self.buf.push_back(sample);
        while let Some(front) = self.buf.front() {
            if newest.saturating_duration_since(front.at) >= self.span {
                self.buf.pop_front();
            } else {
                break;
            }
        }
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn latest(&self) -> Option<&TimestampedValue<V>> {
        self.buf.back()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.buf.iter().map(|s| &s.value)
    }

    /// Reduce the window's values, stamped with the newest sample's time.
    pub fn aggregate<W>(&self, reduce: impl FnOnce(&mut dyn Iterator<Item = &V>) -> W) -> Option<TimestampedValue<W>> {
        let at = self.latest()?.at;
        let mut it = self.values();
        Some(TimestampedValue::new(reduce(&mut it), at))
    }
}

impl TimeWindow<f64> {
    /// Arithmetic mean over the window, stamped with the newest sample's time.
    pub fn average(&self) -> Option<TimestampedValue<f64>> {
        let n = self.len();
        self.aggregate(|values| values.sum::<f64>() / n as f64)
    }
}

/// Lets a sample through only when at least `period` passed since the last one let through.
#[derive(Debug, Clone)]
pub struct Resampler {
    period: Duration,
    last_emitted: Option<Instant>,
}

impl Resampler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_emitted: None,
        }
    }

    pub fn offer<V>(&mut self, sample: TimestampedValue<V>) -> Option<TimestampedValue<V>> {
        let due = match self.last_emitted {
            None => true,
            Some(last) => sample.at.saturating_duration_since(last) >= self.period,
        };
        if due {
            self.last_emitted = Some(sample.at);
            Some(sample)
        } else {
            None
        }
    }
}

/// Emits each consecutive pair `(previous, current)`; the first sample only primes it.
#[derive(Debug, Clone, Default)]
pub struct Pairwise<V> {
    previous: Option<V>,
}

impl<V: Clone> Pairwise<V> {
    pub fn new() -> Self {
        Self { previous: None }
    }

    pub fn push(&mut self, current: V) -> Option<(V, V)> {
        let prev = self.previous.replace(current.clone());
        prev.map(|p| (p, current))
    }
}

/// Rate of change between two samples in units per hour, stamped at their midpoint.
///
/// Pairs that are not strictly increasing in time yield a rate of 0 at `b`'s time.
pub fn rate_per_hour(
    a: &TimestampedValue<f64>,
    b: &TimestampedValue<f64>,
) -> TimestampedValue<f64> {
    if b.at > a.at {
        TimestampedValue::new(
            (b.value - a.value) / hours_between(a.at, b.at),
            midpoint(a.at, b.at),
        )
    } else {
        TimestampedValue::new(0.0, b.at)
    }
}
