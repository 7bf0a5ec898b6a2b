//! Runtime configuration types for the stove engine.
//!
//! These are the structs the core consumes. They are separate from the
//! TOML-deserialized config in `stove_config`; see `conversions` for the bridge.

use std::time::Duration;

/// Signal pipeline windows.
#[derive(Debug, Clone)]
pub struct PipelineCfg {
    /// Sliding window averaged over each raw sample. Default: 30 s.
    pub smoothing_window: Duration,
    /// Minimum spacing between differenced points. Default: 30 s.
    pub resample_period: Duration,
    /// Sliding window averaged over each rate sample. Default: 5 min.
    pub rate_window: Duration,
}

impl Default for PipelineCfg {
    fn default() -> Self {
        Self {
            smoothing_window: Duration::from_secs(30),
            resample_period: Duration::from_secs(30),
            rate_window: Duration::from_secs(300),
        }
    }
}

/// Valve calibration.
#[derive(Debug, Clone)]
pub struct ValveCfg {
    /// Motor run time from fully closed to fully open. Default: 150 s.
    pub time_for_full_motion: Duration,
    /// Added to any move that targets exactly 0 or 1 so the valve seats. Default: 10 s.
    pub extra_time_for_safety: Duration,
}

impl Default for ValveCfg {
    fn default() -> Self {
        Self {
            time_for_full_motion: Duration::from_secs(150),
            extra_time_for_safety: Duration::from_secs(10),
        }
    }
}

/// Auto mode poll loop.
#[derive(Debug, Clone)]
pub struct AutoModeCfg {
    pub enabled: bool,
    /// Default: 30 s.
    pub poll_period: Duration,
    /// Results below this confidence keep the previous rate. Default: 0.5.
    pub min_confidence: f64,
    /// Target rates are rounded to this step. Default: 0.1.
    pub rate_step: f64,
    /// Pipeline outputs older than this count as unknown. Default: 2 min.
    pub validity: Duration,
}

impl Default for AutoModeCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_period: Duration::from_secs(30),
            min_confidence: 0.5,
            rate_step: 0.1,
            validity: Duration::from_secs(120),
        }
    }
}

/// Periodic history snapshots.
#[derive(Debug, Clone)]
pub struct HistoryCfg {
    /// Default: 5 min.
    pub period: Duration,
    /// Values older than this are left out of a snapshot. Default: 5 min.
    pub validity: Duration,
}

impl Default for HistoryCfg {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(300),
            validity: Duration::from_secs(300),
        }
    }
}

/// Temperature sampling thread.
#[derive(Debug, Clone)]
pub struct SamplerCfg {
    /// Default: 1 s.
    pub period: Duration,
    /// Per-read timeout handed to the sensor. Default: 500 ms.
    pub read_timeout: Duration,
    /// Decimals kept from each reading. Default: 1.
    pub precision: u32,
}

impl Default for SamplerCfg {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            read_timeout: Duration::from_millis(500),
            precision: 1,
        }
    }
}
