//! Raspberry Pi drivers: relay boards and buttons on GPIO, MAX31855 on SPI.

use rppal::gpio::{Gpio, InputPin, OutputPin};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use stove_traits::{Button, ButtonEvent, DeviceError, ElectricRelay, RelayState, TemperatureSensor};

use crate::error::{HwError, Result};
use crate::input::{DEBOUNCE, Debouncer, PressTracker, RotaryDecoder};
use crate::max31855;

const SPI_CLOCK_HZ: u32 = 500_000;
const BUTTON_POLL: Duration = Duration::from_millis(2);

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

pub fn open_gpio() -> Result<Gpio> {
    Gpio::new().map_err(gpio_err)
}

/// Relay driven by one output pin. Most boards engage when the pin is low.
pub struct GpioRelay {
    pin: OutputPin,
    active_low: bool,
    state: RelayState,
}

impl GpioRelay {
    /// Claims `bcm` and leaves the relay idle.
    pub fn new(gpio: &Gpio, bcm: u8, active_low: bool) -> Result<Self> {
        let pin = gpio.get(bcm).map_err(gpio_err)?;
        let pin = if active_low {
            pin.into_output_high()
        } else {
            pin.into_output_low()
        };
        Ok(Self {
            pin,
            active_low,
            state: RelayState::Idle,
        })
    }
}

impl ElectricRelay for GpioRelay {
    fn set(&mut self, state: RelayState) -> std::result::Result<(), DeviceError> {
        let high = (state == RelayState::Engaged) != self.active_low;
        if high {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        self.state = state;
        tracing::trace!(pin = self.pin.pin(), ?state, "relay set");
        Ok(())
    }

    fn state(&self) -> RelayState {
        self.state
    }
}

struct Rotary {
    clk: InputPin,
    dt: InputPin,
    decoder: RotaryDecoder,
}

/// Push button wired to ground (internal pull-up), optionally with a rotary
/// encoder around it.
pub struct GpioButton {
    switch: InputPin,
    debounce: Debouncer,
    press: PressTracker,
    rotary: Option<Rotary>,
    pending: VecDeque<ButtonEvent>,
}

impl GpioButton {
    pub fn new(gpio: &Gpio, bcm: u8) -> Result<Self> {
        let switch = gpio.get(bcm).map_err(gpio_err)?.into_input_pullup();
        let debounce = Debouncer::new(switch.is_low(), Instant::now(), DEBOUNCE);
        Ok(Self {
            switch,
            debounce,
            press: PressTracker::default(),
            rotary: None,
            pending: VecDeque::new(),
        })
    }

    pub fn with_rotary(mut self, gpio: &Gpio, clk: u8, dt: u8) -> Result<Self> {
        self.rotary = Some(Rotary {
            clk: gpio.get(clk).map_err(gpio_err)?.into_input_pulldown(),
            dt: gpio.get(dt).map_err(gpio_err)?.into_input_pulldown(),
            decoder: RotaryDecoder::new(),
        });
        Ok(self)
    }

    fn sample(&mut self, now: Instant) {
        if let Some(r) = self.rotary.as_mut()
            && let Some(step) = r.decoder.update(r.clk.is_high(), r.dt.is_high())
        {
            self.pending.push_back(ButtonEvent::Tick(step));
        }
        let pressed = self.debounce.update(self.switch.is_low(), now);
        if let Some(ev) = self.press.update(pressed, now) {
            self.pending.push_back(ev);
        }
    }
}

impl Button for GpioButton {
    fn wait_event(&mut self, timeout: Duration) -> std::result::Result<Option<ButtonEvent>, DeviceError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(ev) = self.pending.pop_front() {
                return Ok(Some(ev));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            self.sample(now);
            if self.pending.is_empty() {
                std::thread::sleep(BUTTON_POLL);
            }
        }
    }
}

/// MAX31855 on SPI0.
pub struct SpiThermocouple {
    spi: Spi,
}

impl SpiThermocouple {
    /// `channel` is the chip select, 0 or 1.
    pub fn new(channel: u8) -> Result<Self> {
        let ss = match channel {
            0 => SlaveSelect::Ss0,
            1 => SlaveSelect::Ss1,
            other => return Err(HwError::Spi(format!("no chip select {other} on SPI0"))),
        };
        let spi = Spi::new(Bus::Spi0, ss, SPI_CLOCK_HZ, Mode::Mode0)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        Ok(Self { spi })
    }

    fn read_frame(&mut self) -> Result<max31855::Max31855Reading> {
        let mut frame = [0u8; 4];
        let n = self
            .spi
            .read(&mut frame)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        if n != frame.len() {
            return Err(HwError::Spi(format!("short read: {n} bytes")));
        }
        max31855::decode(frame)
    }
}

impl TemperatureSensor for SpiThermocouple {
    fn read_celsius(&mut self, timeout: Duration) -> std::result::Result<f64, DeviceError> {
        // The chip converts every ~100 ms; faults are often a single bad conversion
        let deadline = Instant::now() + timeout;
        let max_attempts = 3;
        let mut attempts = 0;
        loop {
            match self.read_frame() {
                Ok(r) => {
                    tracing::trace!(celsius = r.thermocouple, internal = r.internal, "max31855 sample");
                    return Ok(r.thermocouple);
                }
                Err(e) if attempts < max_attempts && Instant::now() < deadline => {
                    attempts += 1;
                    tracing::warn!(retries = attempts, error = %e, "thermocouple read failed, retrying");
                    std::thread::sleep(Duration::from_millis(20));
                }
                Err(e) => {
                    tracing::error!(error = %e, "thermocouple read error");
                    return Err(Box::new(e));
                }
            }
        }
    }
}
