//! Periodic evaluation of the combustion rules driving the valve.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use stove_traits::Clock;

use crate::config::AutoModeCfg;
use crate::error::Result;
use crate::fuzzy::ConfidenceValue;
use crate::history::{Sample, SampleValue, Sampleable};
use crate::rules::{CombustionRules, Phase};
use crate::signal::Signal;
use crate::tasks::{Shutdown, TaskGroup};
use crate::util::{clamp_unit, round_to_step};
use crate::valve::ValveController;

/// One evaluation of the rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub at: Instant,
    pub phases: [(Phase, f64); 6],
    pub target: Option<ConfidenceValue<f64>>,
}

/// What a poll decided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PollOutcome {
    Disabled,
    /// Every rule had zero confidence or an unknown value.
    NoSignal,
    /// Below the configured minimum; the previous rate stays.
    LowConfidence(ConfidenceValue<f64>),
    Unchanged(f64),
    /// A new rate was accepted and should be sent to the valve.
    Changed(f64),
}

#[derive(Default)]
struct State {
    accepted: Option<f64>,
    last: Option<Evaluation>,
}

struct Shared {
    rules: CombustionRules,
    valve: ValveController,
    rate: Signal<f64>,
    clock: Arc<dyn Clock + Send + Sync>,
    cfg: AutoModeCfg,
    enabled: AtomicBool,
    state: Mutex<State>,
}

/// Cloneable handle; clones share the enabled flag and the accepted rate.
#[derive(Clone)]
pub struct AutoModeController {
    shared: Arc<Shared>,
}

impl AutoModeController {
    pub fn new(
        rules: CombustionRules,
        valve: ValveController,
        rate: Signal<f64>,
        cfg: AutoModeCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let enabled = AtomicBool::new(cfg.enabled);
        Self {
            shared: Arc::new(Shared {
                rules,
                valve,
                rate,
                clock,
                cfg,
                enabled,
                state: Mutex::new(State::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn rules(&self) -> &CombustionRules {
        &self.shared.rules
    }

    pub fn enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Flip the mode; returns the new value. Re-enabling forgets the accepted
    /// rate so the next poll commands the valve again.
    pub fn toggle(&self) -> bool {
        let now_enabled = !self.shared.enabled.fetch_xor(true, Ordering::SeqCst);
        if now_enabled {
            self.state().accepted = None;
        }
        tracing::info!(enabled = now_enabled, "auto mode toggled");
        now_enabled
    }

    pub fn accepted_rate(&self) -> Option<f64> {
        self.state().accepted
    }

    pub fn last_evaluation(&self) -> Option<Evaluation> {
        self.state().last
    }

    /// Evaluate the rules once and decide. Does not move the valve.
    pub fn poll_once(&self) -> PollOutcome {
        let rules = &self.shared.rules;
        let evaluation = Evaluation {
            at: self.shared.clock.now(),
            phases: rules.phase_confidences(),
            target: rules.target_rate(),
        };
        let mut state = self.state();
        state.last = Some(evaluation);
        if !self.enabled() {
            return PollOutcome::Disabled;
        }
        let Some(target) = evaluation.target else {
            tracing::debug!("no rule carries any confidence, keeping rate");
            return PollOutcome::NoSignal;
        };
        if target.confidence < self.shared.cfg.min_confidence {
            tracing::debug!(
                target_rate = target.value,
                confidence = target.confidence,
                "confidence too low, keeping rate"
            );
            return PollOutcome::LowConfidence(target);
        }
        let rate = round_to_step(clamp_unit(target.value), self.shared.cfg.rate_step);
        if state.accepted == Some(rate) {
            return PollOutcome::Unchanged(rate);
        }
        state.accepted = Some(rate);
        let (phase, phase_confidence) = rules.dominant_phase();
        tracing::info!(
            target_rate = rate,
            confidence = target.confidence,
            %phase,
            phase_confidence,
            phases = ?evaluation.phases,
            "auto mode changed target rate"
        );
        PollOutcome::Changed(rate)
    }

    /// Send `rate` to the valve on its own thread so polling keeps its cadence.
    pub fn command_valve(&self, rate: f64) -> Result<std::thread::JoinHandle<bool>> {
        let valve = self.shared.valve.clone();
        let handle = std::thread::Builder::new()
            .name("auto-valve".into())
            .spawn(move || {
                let reached = valve.set_open_rate_to(rate);
                if !reached {
                    tracing::debug!(target_rate = rate, "auto mode valve move did not complete");
                }
                reached
            })?;
        Ok(handle)
    }

    /// Poll every period until shutdown.
    pub fn run(&self, shutdown: Shutdown) {
        loop {
            if let PollOutcome::Changed(rate) = self.poll_once()
                && let Err(e) = self.command_valve(rate)
            {
                tracing::error!(error = %e, "could not start valve move");
            }
            if !shutdown.sleep(self.shared.cfg.poll_period) {
                break;
            }
        }
    }

    pub fn spawn_into(&self, group: &mut TaskGroup) -> Result<()> {
        let this = self.clone();
        group.spawn("auto-mode", move |shutdown| this.run(shutdown))
    }

    fn fresh_rate(&self) -> Option<f64> {
        self.shared
            .rate
            .value_if_fresh(self.shared.clock.now(), self.shared.cfg.validity)
    }

    /// Short status for the display: `"+120°/h ON"`, or the rate auto mode
    /// would apply when it is off (`"+120°/h (40%)"`).
    pub fn state_message(&self) -> String {
        let rate = self
            .fresh_rate()
            .map_or_else(|| "?°/h".to_owned(), |r| format!("{r:+.0}°/h"));
        if self.enabled() {
            return format!("{rate} ON");
        }
        match self.last_evaluation().and_then(|e| e.target) {
            Some(t) => format!(
                "{rate} ({:.0}%)",
                round_to_step(clamp_unit(t.value), self.shared.cfg.rate_step) * 100.0
            ),
            None => format!("{rate} OFF"),
        }
    }
}

impl Sampleable for AutoModeController {
    fn sample(&self, validity: Duration) -> Sample {
        let mut out = Sample::new();
        if let Some(r) = self
            .shared
            .rate
            .value_if_fresh(self.shared.clock.now(), validity)
        {
            out.insert("fumes-evolution".to_owned(), SampleValue::Number(r));
        }
        out.insert(
            "auto-mode".to_owned(),
            SampleValue::from(if self.enabled() { "on" } else { "off" }),
        );
        if let Some(t) = self.last_evaluation().and_then(|e| e.target) {
            out.insert("target-rate".to_owned(), SampleValue::Number(t.value));
            out.insert("confidence".to_owned(), SampleValue::Number(t.confidence));
        }
        out
    }
}
