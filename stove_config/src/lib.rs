#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and trace parsing for the stove controller.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - The temperature trace loader reads `seconds,celsius` CSV recordings for
//!   offline replays of the control rules.
use serde::Deserialize;

/// One row of a recorded temperature trace.
///
/// Expected headers:
/// seconds,celsius
///
/// Example:
/// seconds,celsius
/// 0,21.5
/// 30,24.0
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct TraceRow {
    /// Seconds since the start of the recording.
    pub seconds: f64,
    pub celsius: f64,
}

/// BCM GPIO numbers.
#[derive(Debug, Deserialize)]
pub struct Pins {
    /// Switches the valve motor on and off.
    pub power_relay: u8,
    /// Selects opening (engaged) or closing (idle).
    pub direction_relay: u8,
    pub open_button: Option<u8>,
    pub close_button: Option<u8>,
    pub auto_button: Option<u8>,
    pub recharge_button: Option<u8>,
    /// Rotary encoder around the open button; ticks open or close by one step.
    pub rotary_clk: Option<u8>,
    pub rotary_dt: Option<u8>,
    /// Relay boards driven low to engage. Default: true.
    #[serde(default = "default_true")]
    pub relays_active_low: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SensorCfg {
    /// SPI chip-select of the MAX31855 thermocouple amplifier (0 or 1).
    pub spi_channel: u8,
    pub sampling_ms: u64,
    pub read_timeout_ms: u64,
    /// Decimals kept from each reading.
    pub precision: u32,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            spi_channel: 0,
            sampling_ms: 1000,
            read_timeout_ms: 500,
            precision: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PipelineCfg {
    pub smoothing_window_s: u64,
    pub resample_period_s: u64,
    pub rate_window_s: u64,
}

impl Default for PipelineCfg {
    fn default() -> Self {
        Self {
            smoothing_window_s: 30,
            resample_period_s: 30,
            rate_window_s: 300,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ValveCfg {
    /// Motor run time from fully closed to fully open.
    pub full_motion_s: f64,
    /// Extra run time for moves ending fully open or fully closed.
    pub safety_margin_s: f64,
}

impl Default for ValveCfg {
    fn default() -> Self {
        Self {
            full_motion_s: 150.0,
            safety_margin_s: 10.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AutoModeCfg {
    pub enabled: bool,
    pub poll_s: u64,
    /// Results below this confidence keep the previous rate (0.0..=1.0).
    pub min_confidence: f64,
    /// Accepted rates are rounded to this step (0.0, 1.0].
    pub rate_step: f64,
    /// Pipeline values older than this are treated as unknown.
    pub validity_s: u64,
}

impl Default for AutoModeCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_s: 30,
            min_confidence: 0.5,
            rate_step: 0.1,
            validity_s: 120,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HistoryCfg {
    /// JSON lines file; no history is kept when absent.
    pub file: Option<String>,
    pub period_s: u64,
    pub validity_s: u64,
}

impl Default for HistoryCfg {
    fn default() -> Self {
        Self {
            file: None,
            period_s: 300,
            validity_s: 300,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub sensor: SensorCfg,
    #[serde(default)]
    pub pipeline: PipelineCfg,
    #[serde(default)]
    pub valve: ValveCfg,
    #[serde(default)]
    pub auto_mode: AutoModeCfg,
    #[serde(default)]
    pub history: HistoryCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read a `seconds,celsius` trace. Rows must be in non-decreasing time order.
pub fn load_trace_csv(path: &std::path::Path) -> eyre::Result<Vec<TraceRow>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open trace CSV {:?}: {}", path, e))?;
    read_trace(rdr).map_err(|e| e.wrap_err(format!("trace CSV {}", path.display())))
}

/// Same as `load_trace_csv`, from any reader.
pub fn parse_trace<R: std::io::Read>(reader: R) -> eyre::Result<Vec<TraceRow>> {
    read_trace(
        csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader),
    )
}

fn read_trace<R: std::io::Read>(mut rdr: csv::Reader<R>) -> eyre::Result<Vec<TraceRow>> {
    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers: {}", e))?
        .clone();
    let expected = ["seconds", "celsius"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "trace CSV must have headers 'seconds,celsius', got: {}",
            actual.join(",")
        );
    }

    let mut rows: Vec<TraceRow> = Vec::new();
    for (idx, rec) in rdr.deserialize::<TraceRow>().enumerate() {
        let row = match rec {
            Ok(row) => row,
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        };
        if !row.seconds.is_finite() || row.seconds < 0.0 {
            eyre::bail!("row {}: seconds must be a finite value >= 0", idx + 2);
        }
        if let Some(prev) = rows.last()
            && row.seconds < prev.seconds
        {
            eyre::bail!(
                "row {}: time goes backwards ({} after {})",
                idx + 2,
                row.seconds,
                prev.seconds
            );
        }
        rows.push(row);
    }
    if rows.is_empty() {
        eyre::bail!("trace CSV has no rows");
    }
    Ok(rows)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Pins
        if self.pins.power_relay == self.pins.direction_relay {
            eyre::bail!("pins.power_relay and pins.direction_relay must differ");
        }
        let mut used = vec![self.pins.power_relay, self.pins.direction_relay];
        for (name, pin) in [
            ("open_button", self.pins.open_button),
            ("close_button", self.pins.close_button),
            ("auto_button", self.pins.auto_button),
            ("recharge_button", self.pins.recharge_button),
            ("rotary_clk", self.pins.rotary_clk),
            ("rotary_dt", self.pins.rotary_dt),
        ] {
            if let Some(p) = pin {
                if used.contains(&p) {
                    eyre::bail!("pins.{name} reuses GPIO {p}");
                }
                used.push(p);
            }
        }
        if self.pins.rotary_clk.is_some() != self.pins.rotary_dt.is_some() {
            eyre::bail!("pins.rotary_clk and pins.rotary_dt must be set together");
        }
        if self.pins.rotary_clk.is_some() && self.pins.open_button.is_none() {
            eyre::bail!("pins.rotary_clk requires pins.open_button");
        }

        // Sensor
        if self.sensor.spi_channel > 1 {
            eyre::bail!("sensor.spi_channel must be 0 or 1");
        }
        if self.sensor.sampling_ms == 0 {
            eyre::bail!("sensor.sampling_ms must be >= 1");
        }
        if self.sensor.read_timeout_ms == 0 {
            eyre::bail!("sensor.read_timeout_ms must be >= 1");
        }
        if self.sensor.precision > 3 {
            eyre::bail!("sensor.precision must be <= 3");
        }

        // Pipeline
        if self.pipeline.smoothing_window_s == 0 {
            eyre::bail!("pipeline.smoothing_window_s must be >= 1");
        }
        if self.pipeline.resample_period_s == 0 {
            eyre::bail!("pipeline.resample_period_s must be >= 1");
        }
        if self.pipeline.rate_window_s < self.pipeline.resample_period_s {
            eyre::bail!("pipeline.rate_window_s must be >= pipeline.resample_period_s");
        }

        // Valve
        if !(self.valve.full_motion_s.is_finite() && self.valve.full_motion_s > 0.0) {
            eyre::bail!("valve.full_motion_s must be > 0");
        }
        if self.valve.full_motion_s > 3600.0 {
            eyre::bail!("valve.full_motion_s is unreasonably large (>1h)");
        }
        if !(self.valve.safety_margin_s.is_finite() && self.valve.safety_margin_s >= 0.0) {
            eyre::bail!("valve.safety_margin_s must be >= 0");
        }

        // Auto mode
        if self.auto_mode.poll_s == 0 {
            eyre::bail!("auto_mode.poll_s must be >= 1");
        }
        if !(0.0..=1.0).contains(&self.auto_mode.min_confidence) {
            eyre::bail!("auto_mode.min_confidence must be in [0.0, 1.0]");
        }
        if !(self.auto_mode.rate_step > 0.0 && self.auto_mode.rate_step <= 1.0) {
            eyre::bail!("auto_mode.rate_step must be in (0.0, 1.0]");
        }
        if self.auto_mode.validity_s == 0 {
            eyre::bail!("auto_mode.validity_s must be >= 1");
        }

        // History
        if self.history.period_s == 0 {
            eyre::bail!("history.period_s must be >= 1");
        }
        if self.history.validity_s == 0 {
            eyre::bail!("history.validity_s must be >= 1");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        Ok(())
    }
}
