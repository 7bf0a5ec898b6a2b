//! Human-readable error descriptions and structured JSON error formatting.

use stove_core::error::{BuildError, StoveError};
use stove_hardware::HwError;

/// First error of type `E` anywhere in the chain.
fn find<E: std::error::Error + 'static>(err: &eyre::Report) -> Option<&E> {
    err.chain().find_map(|e| e.downcast_ref::<E>())
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = find::<BuildError>(err) {
        return match be {
            BuildError::MissingSensor => {
                "What happened: No temperature sensor was provided to the controller.\nLikely causes: The thermocouple failed to initialize or was not wired into the builder.\nHow to fix: Check the SPI wiring and sensor.spi_channel, then rerun `stove self-check`.".to_string()
            }
            BuildError::MissingPowerRelay | BuildError::MissingDirectionRelay => format!(
                "What happened: {be}.\nLikely causes: A relay pin failed to initialize.\nHow to fix: Check pins.power_relay and pins.direction_relay in the config."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/stove_config.toml for a sample."
            ),
        };
    }

    if let Some(se) = find::<StoveError>(err) {
        return match se {
            StoveError::Config(msg) => format!(
                "What happened: The configuration could not be used ({msg}).\nLikely causes: Wrong --config path, TOML syntax error, or an out-of-range value.\nHow to fix: Fix the file and rerun; see etc/stove_config.toml for a sample."
            ),
            StoveError::Timeout => "What happened: The thermocouple did not answer in time.\nLikely causes: SPI not enabled, wrong chip-select, or a read timeout set too low.\nHow to fix: Enable SPI, check sensor.spi_channel and raise sensor.read_timeout_ms.".to_string(),
            StoveError::HardwareFault(msg) | StoveError::Hardware(msg) => format!(
                "What happened: Hardware error ({msg}).\nLikely causes: Loose thermocouple, wiring fault, or missing GPIO/SPI permissions.\nHow to fix: Check the probe and wiring, and that the user may access /dev/gpiomem and /dev/spidev*."
            ),
            StoveError::State(msg) => format!(
                "What happened: {msg}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(hw) = find::<HwError>(err) {
        return match hw {
            HwError::Thermocouple(fault) => format!(
                "What happened: The thermocouple amplifier reports a fault ({fault}).\nLikely causes: Probe disconnected or its leads shorted.\nHow to fix: Check the probe connector and leads."
            ),
            HwError::Timeout => "What happened: The thermocouple did not answer in time.\nLikely causes: SPI not enabled or wrong chip-select.\nHow to fix: Enable SPI and check sensor.spi_channel.".to_string(),
            other => format!(
                "What happened: Failed to initialize hardware ({other}).\nLikely causes: Incorrect pin numbers or insufficient GPIO/SPI permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process may access GPIO and SPI."
            ),
        };
    }

    // String-based heuristics for errors coming from the trace loader
    let msg = err.to_string();
    let lower = format!("{err:#}").to_ascii_lowercase();
    if lower.contains("trace csv") {
        if lower.contains("headers") {
            return "Invalid headers in trace CSV. Expected 'seconds,celsius'.".to_string();
        }
        return format!(
            "What happened: The temperature trace could not be read.\nLikely causes: Wrong path, non-numeric values, or rows out of time order.\nHow to fix: Check the file. Details: {err:#}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.chain().nth(1) {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 configuration, 4 hardware, 5 trace input, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    reason(err).1
}

fn reason(err: &eyre::Report) -> (&'static str, i32) {
    if find::<BuildError>(err).is_some() {
        return ("Config", 3);
    }
    if let Some(se) = find::<StoveError>(err) {
        return match se {
            StoveError::Config(_) => ("Config", 3),
            StoveError::Timeout => ("Timeout", 4),
            StoveError::Hardware(_) | StoveError::HardwareFault(_) => ("Hardware", 4),
            StoveError::State(_) => ("Error", 1),
        };
    }
    if let Some(hw) = find::<HwError>(err) {
        return match hw {
            HwError::Timeout => ("Timeout", 4),
            _ => ("Hardware", 4),
        };
    }
    if format!("{err:#}").to_ascii_lowercase().contains("trace csv") {
        return ("Trace", 5);
    }
    ("Error", 1)
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    let (reason, exit_code) = reason(err);
    serde_json::json!({ "reason": reason, "exit_code": exit_code, "message": humanize(err) }).to_string()
}
