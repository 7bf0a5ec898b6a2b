//! Simulated collaborators for running the controller without a stove.

use std::sync::Arc;
use std::time::{Duration, Instant};
use stove_traits::{Clock, DeviceError, ElectricRelay, RelayState, TemperatureSensor, UserCommunication};

/// Shape of one simulated burn: a rise to `peak` followed by exponential decay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurnCurve {
    pub ambient: f64,
    pub peak: f64,
    pub rise: Duration,
    /// Time constant of the decay after the peak.
    pub decay: Duration,
    /// A new load of wood every `cycle`, if set.
    pub cycle: Option<Duration>,
}

impl Default for BurnCurve {
    fn default() -> Self {
        Self {
            ambient: 20.0,
            peak: 280.0,
            rise: Duration::from_secs(25 * 60),
            decay: Duration::from_secs(90 * 60),
            cycle: None,
        }
    }
}

impl BurnCurve {
    /// Flue temperature `elapsed` after lighting.
    pub fn celsius_at(&self, elapsed: Duration) -> f64 {
        let elapsed = match self.cycle {
            Some(c) if !c.is_zero() => Duration::from_nanos((elapsed.as_nanos() % c.as_nanos()) as u64),
            _ => elapsed,
        };
        let span = self.peak - self.ambient;
        let t = elapsed.as_secs_f64();
        let rise = self.rise.as_secs_f64();
        if t < rise {
            // smoothstep
            let x = t / rise;
            self.ambient + span * x * x * (3.0 - 2.0 * x)
        } else {
            let tau = self.decay.as_secs_f64().max(1.0);
            self.ambient + span * (-(t - rise) / tau).exp()
        }
    }
}

/// Thermocouple following a `BurnCurve` on the given clock.
pub struct SimulatedThermocouple {
    curve: BurnCurve,
    clock: Arc<dyn Clock + Send + Sync>,
    lit_at: Instant,
    reads: u64,
}

impl SimulatedThermocouple {
    pub fn new(curve: BurnCurve, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let lit_at = clock.now();
        Self {
            curve,
            clock,
            lit_at,
            reads: 0,
        }
    }
}

impl TemperatureSensor for SimulatedThermocouple {
    fn read_celsius(&mut self, _timeout: Duration) -> Result<f64, DeviceError> {
        self.reads += 1;
        // Deterministic ±0.25 °C of quantisation-like noise
        let jitter = ((self.reads * 7919) % 11) as f64 / 20.0 - 0.25;
        let v = self.curve.celsius_at(self.clock.since(self.lit_at)) + jitter;
        tracing::trace!(celsius = v, "simulated thermocouple");
        Ok(v)
    }
}

/// Relay that only logs its transitions.
#[derive(Debug)]
pub struct SimulatedRelay {
    name: String,
    state: RelayState,
}

impl SimulatedRelay {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RelayState::Idle,
        }
    }
}

impl ElectricRelay for SimulatedRelay {
    fn set(&mut self, state: RelayState) -> Result<(), DeviceError> {
        if state != self.state {
            tracing::info!(relay = %self.name, ?state, "relay (simulated)");
        }
        self.state = state;
        Ok(())
    }

    fn state(&self) -> RelayState {
        self.state
    }
}

/// Writes feedback to stderr, keeping stdout for data.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleUserCommunication;

impl UserCommunication for ConsoleUserCommunication {
    fn acknowledge(&self) {
        eprintln!("[stove] ok");
    }

    fn alert(&self) {
        eprintln!("[stove] attention!");
    }

    fn welcome(&self) {
        eprintln!("[stove] hello");
    }

    fn goodbye(&self) {
        eprintln!("[stove] bye");
    }
}
