//! Raw temperature stream → smoothed temperature and smoothed rate of change.
//!
//! Stages, in order: 30 s sliding average on every raw sample, 30 s resampling,
//! pairwise differencing into °/h, 5 min sliding average on every rate sample.

use crossbeam_channel as xch;

use crate::config::PipelineCfg;
use crate::error::Result;
use crate::signal::Signal;
use crate::tasks::{Shutdown, TaskGroup};
use crate::timeseries::{Pairwise, Resampler, TimeWindow, TimestampedValue, rate_per_hour};

/// The three observable temperature signals of a stove.
#[derive(Debug, Clone)]
pub struct StoveSignals {
    /// Rounded sensor readings, one per successful sample.
    pub raw_temperature: Signal<f64>,
    /// Sliding-average temperature (°C).
    pub temperature: Signal<f64>,
    /// Smoothed rate of change (°C/h).
    pub rate: Signal<f64>,
}

impl StoveSignals {
    pub fn new() -> Self {
        Self {
            raw_temperature: Signal::new("raw-temperature"),
            temperature: Signal::new("temperature"),
            rate: Signal::new("fumes-evolution"),
        }
    }
}

impl Default for StoveSignals {
    fn default() -> Self {
        Self::new()
    }
}

/// Output of one raw sample. `rate` is set only when the resampler let a point through.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineStep {
    pub temperature: TimestampedValue<f64>,
    pub rate: Option<TimestampedValue<f64>>,
}

/// The stateful stages, fed one raw sample at a time.
#[derive(Debug, Clone)]
pub struct TemperaturePipeline {
    smoothing: TimeWindow<f64>,
    resampler: Resampler,
    pairs: Pairwise<TimestampedValue<f64>>,
    rates: TimeWindow<f64>,
}

impl TemperaturePipeline {
    pub fn new(cfg: &PipelineCfg) -> Self {
        Self {
            smoothing: TimeWindow::new(cfg.smoothing_window),
            resampler: Resampler::new(cfg.resample_period),
            pairs: Pairwise::new(),
            rates: TimeWindow::new(cfg.rate_window),
        }
    }

    /// Advance every stage with one raw sample. Non-finite readings are dropped.
    pub fn push(&mut self, raw: TimestampedValue<f64>) -> Option<PipelineStep> {
        if !raw.value.is_finite() {
            tracing::warn!(celsius = raw.value, "dropping non-finite temperature sample");
            return None;
        }
        self.smoothing.push(raw);
        let temperature = self.smoothing.average()?;
        let rate = self
            .resampler
            .offer(temperature)
            .and_then(|point| self.pairs.push(point))
            .and_then(|(a, b)| {
                self.rates.push(rate_per_hour(&a, &b));
                self.rates.average()
            });
        Some(PipelineStep { temperature, rate })
    }

    /// Push `raw` and publish whatever it produced.
    pub fn feed(&mut self, raw: TimestampedValue<f64>, signals: &StoveSignals) {
        if let Some(step) = self.push(raw) {
            signals.temperature.publish(step.temperature);
            if let Some(rate) = step.rate {
                tracing::trace!(
                    celsius = step.temperature.value,
                    rate_per_hour = rate.value,
                    "pipeline rate"
                );
                signals.rate.publish(rate);
            }
        }
    }

    /// Consume `raw` until shutdown or until every publisher is gone.
    pub fn run(
        mut self,
        raw: xch::Receiver<TimestampedValue<f64>>,
        signals: StoveSignals,
        shutdown: Shutdown,
    ) {
        loop {
            xch::select! {
                recv(raw) -> msg => match msg {
                    Ok(sample) => self.feed(sample, &signals),
                    Err(_) => break,
                },
                recv(shutdown.receiver()) -> _ => break,
            }
        }
    }

    /// Subscribe to the raw signal now, then run the stages on a group task.
    pub fn spawn_into(self, group: &mut TaskGroup, signals: &StoveSignals) -> Result<()> {
        let raw = signals.raw_temperature.subscribe();
        let signals = signals.clone();
        group.spawn("pipeline", move |shutdown| self.run(raw, signals, shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn at(t0: Instant, secs: u64) -> Instant {
        t0 + Duration::from_secs(secs)
    }

    #[test]
    fn first_samples_only_smooth() {
        let t0 = Instant::now();
        let mut p = TemperaturePipeline::new(&PipelineCfg::default());
        let s1 = p.push(TimestampedValue::new(20.0, t0)).expect("step");
        assert_eq!(s1.temperature.value, 20.0);
        assert!(s1.rate.is_none());
        let s2 = p.push(TimestampedValue::new(22.0, at(t0, 10))).expect("step");
        assert!((s2.temperature.value - 21.0).abs() < 1e-12);
        assert!(s2.rate.is_none());
    }

    #[test]
    fn linear_ramp_yields_its_slope() {
        // 1 °C every 10 s = 360 °C/h
        let t0 = Instant::now();
        let mut p = TemperaturePipeline::new(&PipelineCfg::default());
        let mut last_rate = None;
        for i in 0..120u64 {
            let step = p
                .push(TimestampedValue::new(20.0 + i as f64, at(t0, i * 10)))
                .expect("step");
            if step.rate.is_some() {
                last_rate = step.rate;
            }
        }
        let rate = last_rate.expect("rate after 20 minutes");
        assert!((rate.value - 360.0).abs() < 1e-6, "rate {}", rate.value);
    }

    #[test]
    fn nan_samples_are_skipped() {
        let t0 = Instant::now();
        let mut p = TemperaturePipeline::new(&PipelineCfg::default());
        assert!(p.push(TimestampedValue::new(f64::NAN, t0)).is_none());
        let s = p.push(TimestampedValue::new(30.0, at(t0, 1))).expect("step");
        assert_eq!(s.temperature.value, 30.0);
    }

    #[test]
    fn feed_publishes_to_signals() {
        let t0 = Instant::now();
        let signals = StoveSignals::new();
        let mut p = TemperaturePipeline::new(&PipelineCfg::default());
        for i in 0..10u64 {
            p.feed(TimestampedValue::new(100.0, at(t0, i * 15)), &signals);
        }
        assert_eq!(signals.temperature.latest().map(|t| t.value), Some(100.0));
        assert_eq!(signals.rate.latest().map(|t| t.value), Some(0.0));
    }

    #[test]
    fn pipeline_task_follows_raw_signal() {
        let signals = StoveSignals::new();
        let mut group = TaskGroup::new();
        TemperaturePipeline::new(&PipelineCfg::default())
            .spawn_into(&mut group, &signals)
            .expect("spawn");
        let updates = signals.temperature.subscribe();
        signals
            .raw_temperature
            .publish(TimestampedValue::new(55.0, Instant::now()));
        let got = updates
            .recv_timeout(Duration::from_secs(5))
            .expect("smoothed value");
        assert_eq!(got.value, 55.0);
        group.shutdown();
    }
}
