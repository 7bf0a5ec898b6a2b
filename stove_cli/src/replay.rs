//! `stove replay`: run a recorded temperature trace through the pipeline and
//! the combustion rules on a manual clock, printing every decision.

use eyre::{Result, WrapErr};
use serde_json::{Map, Value, json};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use stove_config::{Config, TraceRow};
use stove_core::auto_mode::Evaluation;
use stove_core::config::{AutoModeCfg, PipelineCfg, ValveCfg};
use stove_core::persistent::PersistentStateWithTimestamp;
use stove_core::{
    AutoModeController, CombustionRules, PollOutcome, RuleInputs, StoveSignals, TemperaturePipeline,
    TimestampedValue, ValveController,
};
use stove_hardware::SimulatedRelay;
use stove_traits::{Clock, ManualClock};

/// One auto mode poll during a replay.
#[derive(Debug, Clone)]
pub struct ReplayStep {
    pub at: Duration,
    pub celsius: Option<f64>,
    pub rate_per_hour: Option<f64>,
    pub evaluation: Option<Evaluation>,
    pub outcome: PollOutcome,
    pub accepted: Option<f64>,
}

impl ReplayStep {
    fn outcome_name(&self) -> &'static str {
        match self.outcome {
            PollOutcome::Disabled => "disabled",
            PollOutcome::NoSignal => "no-signal",
            PollOutcome::LowConfidence(_) => "low-confidence",
            PollOutcome::Unchanged(_) => "unchanged",
            PollOutcome::Changed(_) => "changed",
        }
    }

    pub fn to_json(&self) -> Value {
        let phases: Map<String, Value> = self
            .evaluation
            .map(|e| {
                e.phases
                    .iter()
                    .map(|(p, c)| (p.as_str().to_owned(), json!(c)))
                    .collect()
            })
            .unwrap_or_default();
        let dominant = self.evaluation.and_then(|e| {
            e.phases
                .iter()
                .copied()
                .fold(None::<(stove_core::Phase, f64)>, |best, cur| match best {
                    Some(b) if b.1 >= cur.1 => Some(b),
                    _ => Some(cur),
                })
        });
        let target = self.evaluation.and_then(|e| e.target);
        json!({
            "t_s": self.at.as_secs_f64(),
            "celsius": self.celsius,
            "rate_per_hour": self.rate_per_hour,
            "phases": phases,
            "dominant": dominant.map(|(p, _)| p.as_str()),
            "target": target.map(|t| t.value),
            "confidence": target.map(|t| t.confidence),
            "outcome": self.outcome_name(),
            "accepted": self.accepted,
        })
    }

    pub fn to_text(&self) -> String {
        let minutes = self.at.as_secs_f64() / 60.0;
        let celsius = self
            .celsius
            .map_or_else(|| "?".to_owned(), |c| format!("{c:.1}"));
        let rate = self
            .rate_per_hour
            .map_or_else(|| "?".to_owned(), |r| format!("{r:+.0}"));
        let decision = match self.outcome {
            PollOutcome::Changed(r) => format!("-> {:.0}%", r * 100.0),
            PollOutcome::Unchanged(r) => format!("   {:.0}%", r * 100.0),
            PollOutcome::LowConfidence(t) => {
                format!("   keep ({:.0}% @{:.2})", t.value * 100.0, t.confidence)
            }
            PollOutcome::NoSignal => "   keep (no signal)".to_owned(),
            PollOutcome::Disabled => "   off".to_owned(),
        };
        format!("{minutes:>7.1} min  {celsius:>6}°C  {rate:>6}°/h  {decision}")
    }
}

/// Replay `rows`, polling the rules every `poll` of trace time.
///
/// Auto mode is always enabled and nobody touches the buttons, so the
/// recharge and user-override inputs stay at "never".
pub fn replay_rows(rows: &[TraceRow], cfg: &Config, poll: Duration) -> Result<Vec<ReplayStep>> {
    if poll.is_zero() {
        eyre::bail!("replay poll period must be > 0");
    }
    let manual = ManualClock::new();
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(manual.clone());
    let mut auto_cfg = AutoModeCfg::from(&cfg.auto_mode);
    auto_cfg.enabled = true;
    let validity = auto_cfg.validity;

    let signals = StoveSignals::new();
    let mut pipeline = TemperaturePipeline::new(&PipelineCfg::from(&cfg.pipeline));
    let rules = CombustionRules::new(RuleInputs::live(
        &signals,
        Arc::clone(&clock),
        validity,
        PersistentStateWithTimestamp::new((), Arc::clone(&clock)),
        PersistentStateWithTimestamp::new(None, Arc::clone(&clock)),
    ));
    // Never commanded; poll_once only decides
    let valve = ValveController::new(
        Box::new(SimulatedRelay::new("replay-power")),
        Box::new(SimulatedRelay::new("replay-direction")),
        ValveCfg::from(&cfg.valve),
        Arc::new(ManualClock::new()),
    );
    let auto = AutoModeController::new(rules, valve, signals.rate.clone(), auto_cfg, Arc::clone(&clock));

    let mut steps = Vec::new();
    let mut next_poll = Duration::ZERO;
    for row in rows {
        let at = Duration::try_from_secs_f64(row.seconds)
            .wrap_err_with(|| format!("trace time {} out of range", row.seconds))?;
        manual.set_offset(at);
        pipeline.feed(TimestampedValue::new(row.celsius, clock.now()), &signals);
        if at < next_poll {
            continue;
        }
        let outcome = auto.poll_once();
        let now = clock.now();
        steps.push(ReplayStep {
            at,
            celsius: signals.temperature.value_if_fresh(now, validity),
            rate_per_hour: signals.rate.value_if_fresh(now, validity),
            evaluation: auto.last_evaluation(),
            outcome,
            accepted: auto.accepted_rate(),
        });
        while next_poll <= at {
            next_poll += poll;
        }
    }
    Ok(steps)
}

pub fn replay(trace: &Path, cfg: &Config, poll_s: Option<u64>, json: bool) -> Result<()> {
    let rows = stove_config::load_trace_csv(trace)?;
    let poll = Duration::from_secs(poll_s.unwrap_or(cfg.auto_mode.poll_s));
    let steps = replay_rows(&rows, cfg, poll)?;
    let changes = steps
        .iter()
        .filter(|s| matches!(s.outcome, PollOutcome::Changed(_)))
        .count();
    let span = steps.last().map_or(Duration::ZERO, |s| s.at);
    tracing::info!(samples = rows.len(), polls = steps.len(), changes, "replay done");

    for step in &steps {
        if json {
            println!("{}", step.to_json());
        } else {
            println!("{}", step.to_text());
        }
    }
    if json {
        println!(
            "{}",
            json!({ "summary": { "samples": rows.len(), "polls": steps.len(), "changes": changes, "span_s": span.as_secs_f64() } })
        );
    } else {
        println!(
            "Replayed {} samples over {:.0} min: {} polls, {} rate changes",
            rows.len(),
            span.as_secs_f64() / 60.0,
            steps.len(),
            changes
        );
    }
    Ok(())
}
