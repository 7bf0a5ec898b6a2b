//! `stove run`: control the stove until interrupted.

use eyre::{Result, WrapErr};
use std::path::Path;
use std::time::{Duration, Instant};
use stove_config::Config;
use stove_core::StartOptions;
use stove_core::history::HistorySink;
use stove_core::tasks::Shutdown;

use crate::devices::builder_from_config;
use crate::history_jsonl::JsonlHistory;

const WATCHDOG_PERIOD: Duration = Duration::from_secs(1);

/// Readings may lag this many sampling periods before we complain.
const STALL_PERIODS: u32 = 10;

pub fn run(cfg: &mut Config, duration: Option<Duration>, manual: bool, json: bool) -> Result<()> {
    if manual {
        cfg.auto_mode.enabled = false;
    }
    let stove = builder_from_config(cfg)?.try_build()?;

    let shutdown = Shutdown::new();
    let on_signal = shutdown.clone();
    ctrlc::set_handler(move || on_signal.request()).wrap_err("install Ctrl-C handler")?;

    let history_sink: Option<Box<dyn HistorySink>> = match cfg.history.file.as_deref() {
        Some(file) => Some(Box::new(JsonlHistory::create(Path::new(file))?)),
        None => None,
    };
    let display: Box<dyn FnMut(&[String]) + Send> = Box::new(|elements: &[String]| {
        let line = stove_ui::status_line(elements);
        tracing::info!(display = %line, "status");
    });

    let running = stove.start(StartOptions {
        history_sink,
        display: Some(display),
        shutdown: Some(shutdown.clone()),
    })?;

    let stall_limit = Duration::from_millis(cfg.sensor.sampling_ms) * STALL_PERIODS;
    let started = Instant::now();
    let mut warned = false;
    while shutdown.sleep(WATCHDOG_PERIOD) {
        if let Some(stalled) = running.sensor_stalled_for() {
            if stalled > stall_limit && !warned {
                tracing::warn!(stalled_ms = stalled.as_millis() as u64, "no temperature reading lately");
                warned = true;
            } else if stalled <= stall_limit {
                warned = false;
            }
        }
        if duration.is_some_and(|d| started.elapsed() >= d) {
            tracing::info!("run duration reached");
            shutdown.request();
        }
    }

    let valve = running.controller().valve().state().to_string();
    let auto = running.controller().auto_mode().enabled();
    running.wait();

    if json {
        println!("{}", serde_json::json!({ "stopped": true, "valve": valve, "auto_mode": auto }));
    } else {
        println!("Stopped. Valve: {valve}");
    }
    Ok(())
}
