use std::sync::Arc;
use std::time::Duration;
use stove_core::config::{AutoModeCfg, ValveCfg};
use stove_core::mocks::RecordingRelay;
use stove_core::persistent::PersistentStateWithTimestamp;
use stove_core::{
    AutoModeController, CombustionRules, PollOutcome, RuleInputs, StoveSignals, TimestampedValue,
    ValveController,
};
use stove_traits::{Clock, ManualClock};

struct Rig {
    clock: ManualClock,
    signals: StoveSignals,
    recharged: PersistentStateWithTimestamp<()>,
    user_rate: PersistentStateWithTimestamp<Option<f64>>,
    auto: AutoModeController,
}

impl Rig {
    fn new(cfg: AutoModeCfg) -> Self {
        let clock = ManualClock::new();
        let shared: Arc<dyn Clock + Send + Sync> = Arc::new(clock.clone());
        let signals = StoveSignals::new();
        let recharged = PersistentStateWithTimestamp::new((), Arc::clone(&shared));
        let user_rate = PersistentStateWithTimestamp::new(None, Arc::clone(&shared));
        let rules = CombustionRules::new(RuleInputs::live(
            &signals,
            Arc::clone(&shared),
            cfg.validity,
            recharged.clone(),
            user_rate.clone(),
        ));
        // The valve runs on its own clock so polls never wait on motion
        let valve = ValveController::new(
            Box::new(RecordingRelay::new()),
            Box::new(RecordingRelay::new()),
            ValveCfg::default(),
            Arc::new(ManualClock::new()),
        );
        let auto = AutoModeController::new(rules, valve, signals.rate.clone(), cfg, shared);
        Self {
            clock,
            signals,
            recharged,
            user_rate,
            auto,
        }
    }

    fn observe(&self, celsius: f64, rate: f64) {
        let now = self.clock.now();
        self.signals.temperature.publish(TimestampedValue::new(celsius, now));
        self.signals.rate.publish(TimestampedValue::new(rate, now));
    }
}

#[test]
fn cold_stove_is_closed_then_left_alone() {
    let rig = Rig::new(AutoModeCfg::default());
    rig.observe(20.0, 0.0);
    assert_eq!(rig.auto.poll_once(), PollOutcome::Changed(0.0));
    assert_eq!(rig.auto.accepted_rate(), Some(0.0));

    rig.clock.advance(Duration::from_secs(30));
    rig.observe(20.5, 1.0);
    assert_eq!(rig.auto.poll_once(), PollOutcome::Unchanged(0.0));
}

#[test]
fn fire_taking_off_opens_fully() {
    let rig = Rig::new(AutoModeCfg::default());
    rig.observe(260.0, 500.0);
    assert_eq!(rig.auto.poll_once(), PollOutcome::Changed(1.0));
    let evaluation = rig.auto.last_evaluation().expect("evaluated");
    let target = evaluation.target.expect("signal");
    assert!(target.confidence > 0.5);
}

#[test]
fn nothing_known_keeps_the_rate() {
    let rig = Rig::new(AutoModeCfg::default());
    assert_eq!(rig.auto.poll_once(), PollOutcome::NoSignal);
    assert_eq!(rig.auto.accepted_rate(), None);
}

#[test]
fn stale_pipeline_values_count_as_unknown() {
    let rig = Rig::new(AutoModeCfg::default());
    rig.observe(20.0, 0.0);
    rig.clock.advance(Duration::from_secs(600));
    assert_eq!(rig.auto.poll_once(), PollOutcome::NoSignal);
}

#[test]
fn ambiguous_phase_below_threshold_is_ignored() {
    let rig = Rig::new(AutoModeCfg {
        min_confidence: 0.9,
        ..AutoModeCfg::default()
    });
    rig.recharged.set(());
    rig.clock.advance(Duration::from_secs(60 * 60));
    rig.observe(250.0, 0.0);
    match rig.auto.poll_once() {
        PollOutcome::LowConfidence(cv) => assert!(cv.confidence < 0.9),
        other => panic!("expected low confidence, got {other:?}"),
    }
    assert_eq!(rig.auto.accepted_rate(), None);
}

#[test]
fn recent_user_choice_pulls_the_target() {
    let rig = Rig::new(AutoModeCfg {
        min_confidence: 0.0,
        ..AutoModeCfg::default()
    });
    rig.recharged.set(());
    rig.clock.advance(Duration::from_secs(55 * 60));
    rig.user_rate.set(Some(0.3));
    rig.clock.advance(Duration::from_secs(5 * 60));
    rig.observe(250.0, 0.0);
    assert_eq!(rig.auto.poll_once(), PollOutcome::Changed(0.4));
}

#[test]
fn disabled_mode_still_evaluates() {
    let rig = Rig::new(AutoModeCfg {
        enabled: false,
        ..AutoModeCfg::default()
    });
    rig.observe(260.0, 500.0);
    assert_eq!(rig.auto.poll_once(), PollOutcome::Disabled);
    assert!(rig.auto.last_evaluation().is_some());
    assert_eq!(rig.auto.accepted_rate(), None);
    assert_eq!(rig.auto.state_message(), "+500°/h (100%)");
}

#[test]
fn toggling_back_on_commands_again() {
    let rig = Rig::new(AutoModeCfg::default());
    rig.observe(20.0, 0.0);
    assert_eq!(rig.auto.poll_once(), PollOutcome::Changed(0.0));

    assert!(!rig.auto.toggle());
    assert_eq!(rig.auto.poll_once(), PollOutcome::Disabled);
    assert!(rig.auto.toggle());
    assert_eq!(rig.auto.accepted_rate(), None);
    assert_eq!(rig.auto.poll_once(), PollOutcome::Changed(0.0));
}

#[test]
fn state_message_shows_rate_and_mode() {
    let rig = Rig::new(AutoModeCfg::default());
    assert_eq!(rig.auto.state_message(), "?°/h ON");
    rig.observe(180.0, 120.0);
    assert_eq!(rig.auto.state_message(), "+120°/h ON");
    rig.observe(180.0, -35.4);
    assert_eq!(rig.auto.state_message(), "-35°/h ON");
    rig.auto.toggle();
    rig.clock.advance(Duration::from_secs(600));
    assert_eq!(rig.auto.state_message(), "?°/h OFF");
}
