//! Background temperature sampling.
//!
//! Spawns a thread that owns the sensor, publishes rounded readings to the raw
//! temperature signal, and tracks the last successful read for watchdog logic.
//!
//! Each `Sampler` spawns exactly one thread, shut down and joined when the
//! `Sampler` is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use stove_traits::{Clock, TemperatureSensor};

use crate::config::SamplerCfg;
use crate::hw_error::map_hw_error;
use crate::signal::Signal;
use crate::timeseries::TimestampedValue;

/// Round `v` to `decimals` decimal places.
#[inline]
pub fn round_to_precision(v: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals.min(9) as i32);
    (v * scale).round() / scale
}

pub struct Sampler {
    /// Milliseconds since `epoch` of the last good read; 0 = none yet.
    last_ok: Arc<AtomicU64>,
    epoch: Instant,
    clock: Arc<dyn Clock + Send + Sync>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Sampler {
    pub fn spawn<S: TemperatureSensor + Send + 'static>(
        mut sensor: S,
        cfg: SamplerCfg,
        clock: Arc<dyn Clock + Send + Sync>,
        out: Signal<f64>,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let last_ok = Arc::new(AtomicU64::new(0));
        let last_ok_clone = last_ok.clone();
        let epoch = clock.now();
        let thread_clock = Arc::clone(&clock);

        let join_handle = std::thread::spawn(move || {
            let clock = thread_clock;
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("sampler thread received shutdown signal");
                    break;
                }

                match sensor.read_celsius(cfg.read_timeout) {
                    Ok(v) if v.is_finite() => {
                        let now = clock.now();
                        out.publish(TimestampedValue::new(round_to_precision(v, cfg.precision), now));
                        // +1 keeps a read at the epoch distinguishable from "never"
                        let ms = now.saturating_duration_since(epoch).as_millis() + 1;
                        last_ok_clone.store(ms.min(u128::from(u64::MAX)) as u64, Ordering::Relaxed);
                    }
                    Ok(v) => {
                        tracing::warn!(celsius = v, "sensor returned a non-finite reading");
                    }
                    Err(e) => {
                        // Skip the sample; consumers see a growing staleness age
                        tracing::warn!(error = %map_hw_error(&*e), "temperature read failed");
                    }
                }

                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(cfg.period);
            }
            tracing::trace!("sampler thread exiting cleanly");
        });

        Self {
            last_ok,
            epoch,
            clock,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Time since the last successful read, or since the sampler started if none.
    pub fn stalled_for(&self) -> Duration {
        let since_epoch = self.clock.since(self.epoch);
        match self.last_ok.load(Ordering::Relaxed) {
            0 => since_epoch,
            ms => since_epoch.saturating_sub(Duration::from_millis(ms - 1)),
        }
    }

    pub fn has_read(&self) -> bool {
        self.last_ok.load(Ordering::Relaxed) != 0
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // Exits after the current read or sleep completes
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("sampler thread joined"),
                Err(e) => tracing::warn!(?e, "sampler thread panicked during shutdown"),
            }
        }
    }
}
