//! Building a `StoveBuilder` from the config, with real or simulated devices.

use eyre::Result;
use std::sync::Arc;
use stove_config::Config;
use stove_core::StoveBuilder;
use stove_core::config::{AutoModeCfg, HistoryCfg, PipelineCfg, SamplerCfg, ValveCfg};
use stove_traits::{Clock, MonotonicClock};

/// Settings shared by both backends.
fn configured(cfg: &Config, clock: Arc<dyn Clock + Send + Sync>) -> StoveBuilder {
    StoveBuilder::default()
        .with_clock(clock)
        .with_pipeline(PipelineCfg::from(&cfg.pipeline))
        .with_valve(ValveCfg::from(&cfg.valve))
        .with_auto_mode(AutoModeCfg::from(&cfg.auto_mode))
        .with_history(HistoryCfg::from(&cfg.history))
        .with_sampler(SamplerCfg::from(&cfg.sensor))
}

/// GPIO relays and buttons plus the SPI thermocouple.
#[cfg(feature = "hardware")]
pub fn builder_from_config(cfg: &Config) -> Result<StoveBuilder> {
    use eyre::WrapErr;
    use stove_core::ButtonRole;
    use stove_hardware::{ConsoleUserCommunication, GpioButton, GpioRelay, SpiThermocouple};

    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let gpio = stove_hardware::gpio::open_gpio().wrap_err("open GPIO")?;
    let pins = &cfg.pins;
    let sensor = SpiThermocouple::new(cfg.sensor.spi_channel).wrap_err("open MAX31855 on SPI")?;
    let power = GpioRelay::new(&gpio, pins.power_relay, pins.relays_active_low)
        .wrap_err("open power relay pin")?;
    let direction = GpioRelay::new(&gpio, pins.direction_relay, pins.relays_active_low)
        .wrap_err("open direction relay pin")?;

    let mut builder = configured(cfg, clock)
        .with_sensor(sensor)
        .with_power_relay(power)
        .with_direction_relay(direction)
        .with_feedback(ConsoleUserCommunication);

    for (role, pin) in [
        (ButtonRole::Open, pins.open_button),
        (ButtonRole::Close, pins.close_button),
        (ButtonRole::Auto, pins.auto_button),
        (ButtonRole::Recharge, pins.recharge_button),
    ] {
        let Some(pin) = pin else { continue };
        let mut button = GpioButton::new(&gpio, pin)
            .wrap_err_with(|| format!("open {} button pin", role.as_str()))?;
        if role == ButtonRole::Open
            && let (Some(clk), Some(dt)) = (pins.rotary_clk, pins.rotary_dt)
        {
            button = button
                .with_rotary(&gpio, clk, dt)
                .wrap_err("open rotary encoder pins")?;
        }
        builder = builder.with_button(role, button);
    }
    Ok(builder)
}

/// Simulated stove: a repeating three-hour burn and logging relays. No buttons.
#[cfg(not(feature = "hardware"))]
pub fn builder_from_config(cfg: &Config) -> Result<StoveBuilder> {
    use std::time::Duration;
    use stove_hardware::{BurnCurve, ConsoleUserCommunication, SimulatedRelay, SimulatedThermocouple};

    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let curve = BurnCurve {
        cycle: Some(Duration::from_secs(3 * 3600)),
        ..BurnCurve::default()
    };
    tracing::info!(peak = curve.peak, "using simulated stove");
    Ok(configured(cfg, Arc::clone(&clock))
        .with_sensor(SimulatedThermocouple::new(curve, clock))
        .with_power_relay(SimulatedRelay::new("power"))
        .with_direction_relay(SimulatedRelay::new("direction"))
        .with_feedback(ConsoleUserCommunication))
}
