//! Position control for a two-relay air-intake valve without position feedback.
//!
//! The power relay switches the motor, the direction relay selects closing
//! (engaged) or opening (idle). Position is estimated from motor run time;
//! after a restart the valve is driven fully open once to find a reference.
//!
//! Every read-modify-write of the state happens under one mutex, so concurrent
//! `set_open_rate_to` calls see a serialized sequence of transitions. A call
//! whose request was overtaken by a later one returns `false` and leaves the
//! motor to the newer request.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use stove_traits::{Clock, ElectricRelay, RelayState};

use crate::config::ValveCfg;
use crate::history::{Sample, SampleValue, Sampleable};
use crate::hw_error::map_hw_error;
use crate::util::clamp_unit;

/// Rates closer than this are considered equal.
const RATE_EPSILON: f64 = 1e-6;

/// Step used by `open_more` / `close_more`.
pub const RATE_STEP: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValveState {
    /// Position not established yet.
    Unknown,
    /// Driving fully open to establish the reference; `target` is applied afterwards.
    Resetting { target: f64, started_at: Instant },
    Opening {
        start: f64,
        target: f64,
        started_at: Instant,
    },
    Closing {
        start: f64,
        target: f64,
        started_at: Instant,
    },
    Stopped { rate: f64 },
}

impl ValveState {
    pub fn is_moving(&self) -> bool {
        matches!(
            self,
            ValveState::Opening { .. } | ValveState::Closing { .. }
        )
    }

    /// Where the valve is headed, if anywhere.
    pub fn target(&self) -> Option<f64> {
        match *self {
            ValveState::Resetting { target, .. }
            | ValveState::Opening { target, .. }
            | ValveState::Closing { target, .. } => Some(target),
            ValveState::Unknown | ValveState::Stopped { .. } => None,
        }
    }

    /// Best position estimate at `now`; `None` while unknown or resetting.
    pub fn estimate(&self, now: Instant, full_motion: Duration) -> Option<f64> {
        match *self {
            ValveState::Unknown | ValveState::Resetting { .. } => None,
            ValveState::Stopped { rate } => Some(rate),
            ValveState::Opening {
                start,
                target,
                started_at,
            }
            | ValveState::Closing {
                start,
                target,
                started_at,
            } => {
                let travelled = if full_motion.is_zero() {
                    1.0
                } else {
                    now.saturating_duration_since(started_at).as_secs_f64()
                        / full_motion.as_secs_f64()
                };
                let rate = if target >= start {
                    (start + travelled).min(target)
                } else {
                    (start - travelled).max(target)
                };
                Some(clamp_unit(rate))
            }
        }
    }
}

fn percent(rate: f64) -> String {
    format!("{:.0}%", rate * 100.0)
}

impl fmt::Display for ValveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ValveState::Unknown => f.write_str("?"),
            ValveState::Resetting { target, .. } => write!(f, "?>{}", percent(target)),
            ValveState::Opening { start, target, .. } | ValveState::Closing { start, target, .. } => {
                write!(f, "{:.0}>{}", start * 100.0, percent(target))
            }
            ValveState::Stopped { rate } if rate <= RATE_EPSILON => f.write_str("closed"),
            ValveState::Stopped { rate } if rate >= 1.0 - RATE_EPSILON => f.write_str("open"),
            ValveState::Stopped { rate } => f.write_str(&percent(rate)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Motion {
    Open,
    Close,
    Stop,
}

type Observer = Box<dyn Fn(&ValveState) + Send + Sync>;

struct Inner {
    state: ValveState,
    power: Box<dyn ElectricRelay + Send>,
    direction: Box<dyn ElectricRelay + Send>,
    observers: Vec<Observer>,
    /// Sequence number of the latest `set_open_rate_to` call.
    latest_request: u64,
    halted: bool,
}

impl Inner {
    fn set_state(&mut self, state: ValveState) {
        self.state = state;
        for observer in &self.observers {
            observer(&self.state);
        }
    }

    fn drive(&mut self, motion: Motion) {
        match motion {
            Motion::Stop => {
                self.command("power", RelayState::Idle);
                self.command("direction", RelayState::Idle);
            }
            Motion::Open | Motion::Close => {
                let direction = if motion == Motion::Close {
                    RelayState::Engaged
                } else {
                    RelayState::Idle
                };
                // Direction is only switched with the motor off
                if self.direction.state() != direction {
                    self.command("power", RelayState::Idle);
                    self.command("direction", direction);
                }
                self.command("power", RelayState::Engaged);
            }
        }
    }

    /// Set one relay unless it is already there. Failures are logged; the
    /// state machine keeps its estimate.
    fn command(&mut self, relay: &'static str, wanted: RelayState) {
        let target = if relay == "power" {
            &mut self.power
        } else {
            &mut self.direction
        };
        if target.state() == wanted {
            return;
        }
        if let Err(e) = target.set(wanted) {
            let err = map_hw_error(&*e);
            tracing::error!(relay, ?wanted, error = %err, "relay command failed");
        }
    }
}

struct Shared {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock + Send + Sync>,
    cfg: ValveCfg,
}

/// Cloneable handle to the valve; clones drive the same hardware.
#[derive(Clone)]
pub struct ValveController {
    shared: Arc<Shared>,
}

impl fmt::Debug for ValveController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValveController")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ValveController {
    /// Takes ownership of both relays. The state starts `Unknown`.
    pub fn new(
        power: Box<dyn ElectricRelay + Send>,
        direction: Box<dyn ElectricRelay + Send>,
        cfg: ValveCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: ValveState::Unknown,
                    power,
                    direction,
                    observers: Vec::new(),
                    latest_request: 0,
                    halted: false,
                }),
                clock,
                cfg,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> ValveState {
        self.lock().state
    }

    /// Current position estimate, `None` until the reference is established.
    pub fn estimated_rate(&self) -> Option<f64> {
        let now = self.shared.clock.now();
        self.lock()
            .state
            .estimate(now, self.shared.cfg.time_for_full_motion)
    }

    /// Called synchronously on every state write, with the state lock held.
    /// Observers must not call back into the controller.
    pub fn on_change(&self, observer: impl Fn(&ValveState) + Send + Sync + 'static) {
        self.lock().observers.push(Box::new(observer));
    }

    fn seating_margin(&self, target: f64) -> Duration {
        if target <= RATE_EPSILON || target >= 1.0 - RATE_EPSILON {
            self.shared.cfg.extra_time_for_safety
        } else {
            Duration::ZERO
        }
    }

    /// Move the valve to `target` (clamped to [0, 1]) and block until it gets there.
    ///
    /// Returns `true` when the valve reached `target`, `false` when a later call
    /// took over or the controller was halted. Never retries.
    pub fn set_open_rate_to(&self, target: f64) -> bool {
        let target = clamp_unit(target);
        let clock = &self.shared.clock;
        let cfg = &self.shared.cfg;
        let full_reset = cfg.time_for_full_motion + cfg.extra_time_for_safety;

        let (request, reset_wait) = {
            let mut g = self.lock();
            if g.halted {
                return false;
            }
            g.latest_request += 1;
            let request = g.latest_request;
            let reset_wait = match g.state {
                ValveState::Unknown => {
                    tracing::info!(target_rate = target, "valve position unknown, resetting to fully open");
                    g.drive(Motion::Open);
                    g.set_state(ValveState::Resetting {
                        target,
                        started_at: clock.now(),
                    });
                    Some(full_reset)
                }
                ValveState::Resetting { started_at, .. } => {
                    // Retarget only; the calibration run is never shortened
                    g.set_state(ValveState::Resetting { target, started_at });
                    Some(full_reset.saturating_sub(clock.since(started_at)))
                }
                _ => None,
            };
            (request, reset_wait)
        };

        if let Some(wait) = reset_wait {
            clock.sleep(wait);
            let mut g = self.lock();
            if g.halted {
                return false;
            }
            if matches!(g.state, ValveState::Resetting { .. }) {
                g.drive(Motion::Stop);
                g.set_state(ValveState::Stopped { rate: 1.0 });
                tracing::debug!("valve reference established at fully open");
            }
            if g.latest_request != request {
                tracing::debug!(target_rate = target, "reset request superseded");
                return false;
            }
        }

        let wait = {
            let mut g = self.lock();
            if g.halted || g.latest_request != request {
                return false;
            }
            let now = clock.now();
            let Some(current) = g.state.estimate(now, cfg.time_for_full_motion) else {
                // Another caller restarted a reset in between; it owns the valve now
                return false;
            };
            if matches!(g.state, ValveState::Stopped { rate } if (rate - target).abs() < RATE_EPSILON) {
                return true;
            }
            let distance = (target - current).abs();
            let margin = self.seating_margin(target);
            if distance < RATE_EPSILON && margin.is_zero() {
                g.drive(Motion::Stop);
                g.set_state(ValveState::Stopped { rate: target });
                return true;
            }
            let motion = if target > current || (distance < RATE_EPSILON && target >= 1.0 - RATE_EPSILON) {
                Motion::Open
            } else {
                Motion::Close
            };
            g.drive(motion);
            g.set_state(if motion == Motion::Open {
                ValveState::Opening {
                    start: current,
                    target,
                    started_at: now,
                }
            } else {
                ValveState::Closing {
                    start: current,
                    target,
                    started_at: now,
                }
            });
            cfg.time_for_full_motion.mul_f64(distance) + margin
        };

        clock.sleep(wait);

        let mut g = self.lock();
        if g.halted {
            return false;
        }
        if g.state.is_moving() && g.latest_request == request {
            g.drive(Motion::Stop);
            g.set_state(ValveState::Stopped { rate: target });
            tracing::debug!(rate = target, "valve reached target");
            true
        } else {
            tracing::debug!(target_rate = target, state = %g.state, "valve move superseded");
            false
        }
    }

    pub fn open(&self) -> bool {
        self.set_open_rate_to(1.0)
    }

    pub fn close(&self) -> bool {
        self.set_open_rate_to(0.0)
    }

    pub fn open_more(&self) -> bool {
        self.set_open_rate_to(self.reference_rate() + RATE_STEP)
    }

    pub fn close_more(&self) -> bool {
        self.set_open_rate_to(self.reference_rate() - RATE_STEP)
    }

    /// The rate relative steps start from: the pending target of a move in
    /// progress, else the stopped rate, else fully open (where a reset ends).
    pub fn reference_rate(&self) -> f64 {
        match self.state() {
            ValveState::Stopped { rate } => rate,
            other => other.target().map_or(1.0, clamp_unit),
        }
    }

    /// Motor off for good. Keeps the best position estimate; later moves are refused.
    pub fn halt(&self) {
        let now = self.shared.clock.now();
        let mut g = self.lock();
        if g.halted {
            return;
        }
        g.halted = true;
        g.drive(Motion::Stop);
        let next = match g.state.estimate(now, self.shared.cfg.time_for_full_motion) {
            Some(rate) => ValveState::Stopped { rate },
            None => ValveState::Unknown,
        };
        g.set_state(next);
        tracing::info!(state = %g.state, "valve halted");
    }

    pub fn is_halted(&self) -> bool {
        self.lock().halted
    }
}

impl Sampleable for ValveController {
    fn sample(&self, _validity: Duration) -> Sample {
        let state = self.state();
        let mut out = Sample::from([("state".to_owned(), SampleValue::Text(state.to_string()))]);
        let now = self.shared.clock.now();
        if let Some(rate) = state.estimate(now, self.shared.cfg.time_for_full_motion) {
            out.insert("open-rate".to_owned(), SampleValue::Number(rate));
        }
        out
    }
}
