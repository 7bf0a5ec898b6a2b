//! Periodic snapshots of everything worth keeping a history of.
//!
//! The core only gathers values; where they end up is the sink's business.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stove_traits::Clock;

use crate::config::HistoryCfg;
use crate::error::Result;
use crate::signal::Signal;
use crate::tasks::{Shutdown, TaskGroup};

#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Number(f64),
    Text(String),
}

impl From<f64> for SampleValue {
    fn from(v: f64) -> Self {
        SampleValue::Number(v)
    }
}

impl From<String> for SampleValue {
    fn from(v: String) -> Self {
        SampleValue::Text(v)
    }
}

impl From<&str> for SampleValue {
    fn from(v: &str) -> Self {
        SampleValue::Text(v.to_owned())
    }
}

pub type Sample = BTreeMap<String, SampleValue>;

/// Anything that can describe its current state as named values.
///
/// Values older than `validity` must be left out rather than reported stale.
pub trait Sampleable: Send + Sync {
    fn sample(&self, validity: Duration) -> Sample;
}

/// A numeric signal sampled under its own name.
pub struct SignalSource {
    signal: Signal<f64>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl SignalSource {
    pub fn new(signal: Signal<f64>, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self { signal, clock }
    }
}

impl Sampleable for SignalSource {
    fn sample(&self, validity: Duration) -> Sample {
        let mut out = Sample::new();
        if let Some(v) = self.signal.value_if_fresh(self.clock.now(), validity) {
            out.insert(self.signal.name().to_owned(), SampleValue::Number(v));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub taken_at: Instant,
    /// Time since the recorder was created.
    pub uptime: Duration,
    pub values: Sample,
}

pub trait HistorySink: Send {
    fn record(&mut self, snapshot: &Snapshot) -> Result<()>;
}

/// In-memory sink, mostly for tests and replays.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub snapshots: Vec<Snapshot>,
}

impl HistorySink for MemorySink {
    fn record(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }
}

pub struct HistoryRecorder {
    sources: Vec<Arc<dyn Sampleable>>,
    clock: Arc<dyn Clock + Send + Sync>,
    cfg: HistoryCfg,
    started: Instant,
}

impl HistoryRecorder {
    pub fn new(cfg: HistoryCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let started = clock.now();
        Self {
            sources: Vec::new(),
            clock,
            cfg,
            started,
        }
    }

    pub fn add_source(&mut self, source: Arc<dyn Sampleable>) {
        self.sources.push(source);
    }

    /// Merge every source's sample. Later sources win on key collisions.
    pub fn snapshot(&self) -> Snapshot {
        let taken_at = self.clock.now();
        let mut values = Sample::new();
        for source in &self.sources {
            values.extend(source.sample(self.cfg.validity));
        }
        Snapshot {
            taken_at,
            uptime: taken_at.saturating_duration_since(self.started),
            values,
        }
    }

    /// Record one snapshot per period until shutdown. Sink errors are logged, not fatal.
    pub fn run(self, mut sink: Box<dyn HistorySink>, shutdown: Shutdown) {
        while shutdown.sleep(self.cfg.period) {
            let snapshot = self.snapshot();
            if let Err(e) = sink.record(&snapshot) {
                tracing::warn!(error = %e, "history sink failed");
            }
        }
    }

    pub fn spawn_into(self, group: &mut TaskGroup, sink: Box<dyn HistorySink>) -> Result<()> {
        group.spawn("history", move |shutdown| self.run(sink, shutdown))
    }
}
