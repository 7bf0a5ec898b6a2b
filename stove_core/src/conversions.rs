//! `From` implementations bridging `stove_config` types to `stove_core` types.

use std::time::Duration;

use crate::config::{AutoModeCfg, HistoryCfg, PipelineCfg, SamplerCfg, ValveCfg};

/// Seconds from config to `Duration`; negative or non-finite values become zero
/// (`Config::validate` rejects them earlier).
fn secs_f64(s: f64) -> Duration {
    Duration::try_from_secs_f64(s).unwrap_or(Duration::ZERO)
}

// ── PipelineCfg ──────────────────────────────────────────────────────────────

impl From<&stove_config::PipelineCfg> for PipelineCfg {
    fn from(c: &stove_config::PipelineCfg) -> Self {
        Self {
            smoothing_window: Duration::from_secs(c.smoothing_window_s),
            resample_period: Duration::from_secs(c.resample_period_s),
            rate_window: Duration::from_secs(c.rate_window_s),
        }
    }
}

// ── ValveCfg ─────────────────────────────────────────────────────────────────

impl From<&stove_config::ValveCfg> for ValveCfg {
    fn from(c: &stove_config::ValveCfg) -> Self {
        Self {
            time_for_full_motion: secs_f64(c.full_motion_s),
            extra_time_for_safety: secs_f64(c.safety_margin_s),
        }
    }
}

// ── AutoModeCfg ──────────────────────────────────────────────────────────────

impl From<&stove_config::AutoModeCfg> for AutoModeCfg {
    fn from(c: &stove_config::AutoModeCfg) -> Self {
        Self {
            enabled: c.enabled,
            poll_period: Duration::from_secs(c.poll_s),
            min_confidence: c.min_confidence,
            rate_step: c.rate_step,
            validity: Duration::from_secs(c.validity_s),
        }
    }
}

// ── HistoryCfg ───────────────────────────────────────────────────────────────

impl From<&stove_config::HistoryCfg> for HistoryCfg {
    fn from(c: &stove_config::HistoryCfg) -> Self {
        Self {
            period: Duration::from_secs(c.period_s),
            validity: Duration::from_secs(c.validity_s),
        }
    }
}

// ── SamplerCfg ───────────────────────────────────────────────────────────────

impl From<&stove_config::SensorCfg> for SamplerCfg {
    fn from(c: &stove_config::SensorCfg) -> Self {
        Self {
            period: Duration::from_millis(c.sampling_ms),
            read_timeout: Duration::from_millis(c.read_timeout_ms),
            precision: c.precision,
        }
    }
}
