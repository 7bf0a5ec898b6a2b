mod cli;
mod devices;
mod error_fmt;
mod history_jsonl;
mod logging;
mod replay;
mod run;

use clap::Parser;
use eyre::Result;
use std::path::Path;
use std::time::Duration;
use stove_config::Config;
use stove_core::StoveError;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::devices::builder_from_config;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(cli) {
        let json = JSON_MODE.get().copied().unwrap_or(false);
        if json {
            eprintln!("{}", error_fmt::format_error_json(&e));
        } else {
            eprintln!("{}", error_fmt::humanize(&e));
        }
        std::process::exit(error_fmt::exit_code_for_error(&e));
    }
}

fn config_error(msg: String) -> eyre::Report {
    eyre::Report::new(StoveError::Config(msg))
}

/// Read, parse and validate the TOML config.
fn load_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| config_error(format!("read {}: {e}", path.display())))?;
    let cfg = stove_config::load_toml(&text)
        .map_err(|e| config_error(format!("parse {}: {e}", path.display())))?;
    cfg.validate().map_err(|e| config_error(format!("{e}")))?;
    Ok(cfg)
}

fn real_main(cli: Cli) -> Result<()> {
    let mut cfg = load_config(&cli.config)?;
    let level = cli
        .log_level
        .as_deref()
        .or(cfg.logging.level.as_deref())
        .unwrap_or("info")
        .to_owned();
    let _log_guard = logging::init(cli.json, &level, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match cli.cmd {
        Commands::Run { duration_s, manual } => run::run(
            &mut cfg,
            duration_s.map(Duration::from_secs),
            manual,
            cli.json,
        ),
        Commands::Replay { trace, poll_s } => replay::replay(&trace, &cfg, poll_s, cli.json),
        Commands::SelfCheck => self_check(&cfg, cli.json),
    }
}

/// Build every device and read the sensor once.
fn self_check(cfg: &Config, json: bool) -> Result<()> {
    let mut stove = builder_from_config(cfg)?.try_build()?;
    let celsius = stove.probe_temperature()?;
    if json {
        println!("{}", serde_json::json!({ "ok": true, "celsius": celsius }));
    } else {
        println!("sensor ok: {celsius:.1}°C");
    }
    Ok(())
}
