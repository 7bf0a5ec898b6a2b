//! Combustion phases and the target valve rate derived from them.
//!
//! Every predicate reads its inputs live, so one `CombustionRules` value lasts
//! the whole process and each evaluation sees the current stove.

use std::sync::Arc;
use std::time::Duration;

use stove_traits::Clock;

use crate::fuzzy::{Condition, ConfidenceValue, Consequence, Membership, Reading, Valued};
use crate::persistent::PersistentStateWithTimestamp;
use crate::pipeline::StoveSignals;
use crate::util::Linear;

/// A live elapsed-time input. `None` means unknown.
pub type Elapsed = Arc<dyn Fn() -> Option<Duration> + Send + Sync>;

/// The five inputs the rules are written against.
#[derive(Clone)]
pub struct RuleInputs {
    /// Smoothed temperature (°C).
    pub temperature: Reading,
    /// Smoothed rate of change (°C/h).
    pub rate: Reading,
    pub since_recharge: Elapsed,
    pub since_user_change: Elapsed,
    /// Last rate the user set by hand, if any.
    pub last_user_rate: Reading,
}

impl RuleInputs {
    /// Inputs read from the pipeline signals and the user-action states.
    /// Pipeline values older than `validity` read as unknown.
    pub fn live(
        signals: &StoveSignals,
        clock: Arc<dyn Clock + Send + Sync>,
        validity: Duration,
        recharged: PersistentStateWithTimestamp<()>,
        user_rate: PersistentStateWithTimestamp<Option<f64>>,
    ) -> Self {
        let (temperature, c) = (signals.temperature.clone(), Arc::clone(&clock));
        let (rate, c2) = (signals.rate.clone(), clock);
        let user_changed = user_rate.clone();
        Self {
            temperature: Arc::new(move || temperature.value_if_fresh(c.now(), validity)),
            rate: Arc::new(move || rate.value_if_fresh(c2.now(), validity)),
            since_recharge: Arc::new(move || Some(recharged.time_since_last_change())),
            since_user_change: Arc::new(move || Some(user_changed.time_since_last_change())),
            last_user_rate: Arc::new(move || user_rate.get()),
        }
    }

    /// Inputs frozen at the given values; handy for replays and benchmarks.
    pub fn constant(
        temperature: f64,
        rate: f64,
        since_recharge: Duration,
        since_user_change: Duration,
        last_user_rate: Option<f64>,
    ) -> Self {
        Self {
            temperature: Arc::new(move || Some(temperature)),
            rate: Arc::new(move || Some(rate)),
            since_recharge: Arc::new(move || Some(since_recharge)),
            since_user_change: Arc::new(move || Some(since_user_change)),
            last_user_rate: Arc::new(move || last_user_rate),
        }
    }
}

/// The named combustion phases. Not mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Ignition,
    FullFire,
    DyingFlames,
    Embers,
    Discharging,
    Idle,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Ignition,
        Phase::FullFire,
        Phase::DyingFlames,
        Phase::Embers,
        Phase::Discharging,
        Phase::Idle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Ignition => "ignition",
            Phase::FullFire => "full-fire",
            Phase::DyingFlames => "dying-flames",
            Phase::Embers => "embers",
            Phase::Discharging => "discharging",
            Phase::Idle => "idle",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum open rate the user may impose while the fire is at full blast.
pub const FULL_FIRE_USER_FLOOR: f64 = 0.4;

/// Phase predicates and the target-rate aggregate over one set of inputs.
#[derive(Clone)]
pub struct CombustionRules {
    pub burning_hot: Condition,
    pub hot: Condition,
    pub warm: Condition,
    pub cold: Condition,
    pub fast_cooling: Condition,
    pub gentle_cooling: Condition,
    pub stable: Condition,
    pub warming: Condition,
    pub recharging: Condition,
    pub user_override: Condition,
    phases: [(Phase, Condition); 6],
    target: Valued,
}

impl CombustionRules {
    pub fn new(inputs: RuleInputs) -> Self {
        let temp = |name: &str, m: Membership| {
            let input = Arc::clone(&inputs.temperature);
            Condition::atom(name, m, move || input())
        };
        let rate = |name: &str, m: Membership| {
            let input = Arc::clone(&inputs.rate);
            Condition::atom(name, m, move || input())
        };

        let burning_hot = temp("burning-hot", Membership::true_from(250.0, 20.0));
        let hot = temp("hot", Membership::true_in_range(150.0, 250.0, 20.0));
        let warm = temp("warm", Membership::true_in_range(50.0, 150.0, 20.0));
        let cold = temp("cold", Membership::true_until(50.0, 20.0));

        let fast_cooling = rate("fast-cooling", Membership::true_until(-100.0, 20.0));
        let gentle_cooling = rate("gentle-cooling", Membership::true_in_range(-100.0, -20.0, 10.0));
        let stable = rate("stable", Membership::true_in_range(-20.0, 20.0, 10.0));
        let warming = rate("warming", Membership::true_from(20.0, 10.0));

        let since_recharge = Arc::clone(&inputs.since_recharge);
        let recharging = Condition::duration_atom(
            "recharging",
            Membership::true_until_duration(Duration::from_secs(30 * 60), Duration::from_secs(10 * 60)),
            move || since_recharge(),
        );
        let since_user = Arc::clone(&inputs.since_user_change);
        let user_override = Condition::duration_atom(
            "user-override",
            Membership::true_until_duration(Duration::from_secs(10 * 60), Duration::from_secs(60)),
            move || since_user(),
        );

        let settled = stable.clone() | gentle_cooling.clone();
        let ignition = recharging.clone() | warming.clone();
        let full_fire = burning_hot.clone();
        let dying_flames = hot.clone() & fast_cooling.clone() & !recharging.clone();
        let embers = hot.clone() & settled.clone() & !recharging.clone();
        let discharging = warm.clone() & settled & !recharging.clone();
        let idle = cold.clone() & stable.clone() & !recharging.clone();

        let target = Self::target_rules(
            &inputs,
            &ignition,
            &full_fire,
            &dying_flames,
            &embers,
            &discharging,
            &idle,
            &user_override,
        );

        Self {
            burning_hot,
            hot,
            warm,
            cold,
            fast_cooling,
            gentle_cooling,
            stable,
            warming,
            recharging,
            user_override,
            phases: [
                (Phase::Ignition, ignition),
                (Phase::FullFire, full_fire),
                (Phase::DyingFlames, dying_flames),
                (Phase::Embers, embers),
                (Phase::Discharging, discharging),
                (Phase::Idle, idle),
            ],
            target,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn target_rules(
        inputs: &RuleInputs,
        ignition: &Condition,
        full_fire: &Condition,
        dying_flames: &Condition,
        embers: &Condition,
        discharging: &Condition,
        idle: &Condition,
        user_override: &Condition,
    ) -> Valued {
        let embers_line = Linear::through((250.0, 0.5), (120.0, 0.0));
        let dying_line = Linear::through((250.0, 0.9), (180.0, 0.6));
        let ignition_line = Linear::through((0.0, 0.3), (200.0, 1.0));

        let t = Arc::clone(&inputs.temperature);
        let embers_rate = Consequence::live(move || t().map(|c| embers_line.y(c).clamp(0.0, 0.5)));
        let t = Arc::clone(&inputs.temperature);
        let dying_rate = Consequence::live(move || t().map(|c| dying_line.y(c).clamp(0.6, 0.9)));
        let (t, r) = (Arc::clone(&inputs.temperature), Arc::clone(&inputs.rate));
        let ignition_rate = Consequence::live(move || {
            let by_temp = t().map_or(0.0, |c| embers_line.y(c).clamp(0.0, 0.5));
            // Right after start the rate is still unknown; temperature alone decides
            let by_speed = r().map_or(by_temp, |rate| ignition_line.y(rate));
            Some(by_speed.max(by_temp).clamp(0.3, 1.0))
        });
        let u = Arc::clone(&inputs.last_user_rate);
        let user_rate = Consequence::live(move || Some(u().unwrap_or(1.0)));
        let u = Arc::clone(&inputs.last_user_rate);
        let user_rate_floored =
            Consequence::live(move || Some(u().unwrap_or(1.0).max(FULL_FIRE_USER_FLOOR)));

        let automatic = !user_override.clone();
        Valued::weighted_or(vec![
            (ignition.clone() & !full_fire.clone()).implies(ignition_rate),
            (full_fire.clone() & automatic.clone()).implies(1.0),
            (dying_flames.clone() & automatic.clone()).implies(dying_rate),
            (embers.clone() & automatic.clone()).implies(embers_rate),
            ((discharging.clone() | idle.clone()) & automatic).implies(0.0),
            (!full_fire.clone() & user_override.clone()).implies(user_rate),
            (full_fire.clone() & user_override.clone()).implies(user_rate_floored),
        ])
    }

    pub fn phase(&self, phase: Phase) -> &Condition {
        // `phases` is built in `Phase::ALL` order
        &self.phases[phase as usize].1
    }

    /// Current confidence of every phase, in `Phase::ALL` order.
    pub fn phase_confidences(&self) -> [(Phase, f64); 6] {
        self.phases.each_ref().map(|(p, c)| (*p, c.confidence()))
    }

    /// The most confident phase. Ties go to the earlier phase in `Phase::ALL`.
    pub fn dominant_phase(&self) -> (Phase, f64) {
        self.phase_confidences()
            .into_iter()
            .fold((Phase::Ignition, f64::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 { cur } else { best }
            })
    }

    /// The aggregated target open rate, `None` when no rule carries any confidence.
    pub fn target_rate(&self) -> Option<ConfidenceValue<f64>> {
        self.target.evaluate()
    }
}

impl std::fmt::Debug for CombustionRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_map();
        for (phase, c) in self.phase_confidences() {
            d.entry(&phase.as_str(), &c);
        }
        d.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const NEVER: Duration = Duration::MAX;

    fn minutes(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    fn rules(celsius: f64, rate: f64, since_recharge: Duration) -> CombustionRules {
        CombustionRules::new(RuleInputs::constant(celsius, rate, since_recharge, NEVER, None))
    }

    #[rstest]
    #[case(20.0, 0.0, Phase::Idle)]
    #[case(48.0, -5.0, Phase::Idle)]
    #[case(110.0, -16.0, Phase::Discharging)]
    #[case(130.0, -23.0, Phase::Discharging)]
    #[case(190.0, -54.0, Phase::Embers)]
    #[case(200.0, -200.0, Phase::DyingFlames)]
    #[case(300.0, 0.0, Phase::FullFire)]
    fn dominant_phase_without_recharge(#[case] celsius: f64, #[case] rate: f64, #[case] expected: Phase) {
        let (phase, c) = rules(celsius, rate, minutes(12 * 60)).dominant_phase();
        assert_eq!(phase, expected);
        assert!(c > 0.5, "{phase} only {c}");
    }

    #[test]
    fn fresh_recharge_reads_as_ignition() {
        let (phase, _) = rules(50.0, 40.0, minutes(5)).dominant_phase();
        assert_eq!(phase, Phase::Ignition);
    }

    #[test]
    fn cold_idle_stove_closes_the_valve() {
        let r = rules(20.0, 0.0, minutes(12 * 60));
        let (phase, c) = r.dominant_phase();
        assert_eq!(phase, Phase::Idle);
        assert!(c > 0.95);
        let target = r.target_rate().expect("signal");
        assert!(target.value < 0.01, "value {}", target.value);
        assert!(target.confidence >= 0.5);
    }

    #[test]
    fn hot_fast_rising_fire_opens_fully() {
        let r = rules(260.0, 500.0, minutes(40));
        assert_eq!(r.dominant_phase().0, Phase::Ignition);
        let target = r.target_rate().expect("signal");
        assert!((target.value - 1.0).abs() < 1e-6, "value {}", target.value);
        assert!(target.confidence > 0.8);
    }

    #[test]
    fn user_override_is_honoured_briefly() {
        let baseline = rules(250.0, 0.0, minutes(60)).target_rate().expect("signal");
        let with_user = |ago: Duration| {
            CombustionRules::new(RuleInputs::constant(250.0, 0.0, minutes(60), ago, Some(0.3)))
                .target_rate()
                .expect("signal")
        };
        let recent = with_user(minutes(5));
        assert!(baseline.value - recent.value > 0.2, "{} vs {}", baseline.value, recent.value);
        let expired = with_user(minutes(15));
        assert!((expired.value - baseline.value).abs() < 0.1);
    }

    #[test]
    fn full_fire_keeps_user_above_floor() {
        // Well above 250 °C, rate stable: full fire, user asked for 10 %
        let r = CombustionRules::new(RuleInputs::constant(400.0, 0.0, minutes(600), minutes(1), Some(0.1)));
        let target = r.target_rate().expect("signal");
        assert!(target.value >= FULL_FIRE_USER_FLOOR - 1e-6, "value {}", target.value);
    }

    #[test]
    fn unknown_inputs_give_no_signal_from_temperature_rules() {
        let inputs = RuleInputs {
            temperature: Arc::new(|| None),
            rate: Arc::new(|| None),
            since_recharge: Arc::new(|| None),
            since_user_change: Arc::new(|| None),
            last_user_rate: Arc::new(|| None),
        };
        let r = CombustionRules::new(inputs);
        for (_, c) in r.phase_confidences() {
            assert!(c <= 1e-12);
        }
        assert!(r.target_rate().is_none());
    }

    #[test]
    fn recharge_before_any_rate_still_drives_ignition() {
        let inputs = RuleInputs {
            temperature: Arc::new(|| Some(200.0)),
            rate: Arc::new(|| None::<f64>),
            since_recharge: Arc::new(|| Some(minutes(1))),
            since_user_change: Arc::new(|| Some(NEVER)),
            last_user_rate: Arc::new(|| None::<f64>),
        };
        let r = CombustionRules::new(inputs);
        assert_eq!(r.dominant_phase().0, Phase::Ignition);
        let target = r.target_rate().expect("signal");
        assert!((0.3..0.35).contains(&target.value), "value {}", target.value);
        assert!(target.confidence > 0.9, "confidence {}", target.confidence);
    }

    #[test]
    fn live_inputs_follow_signals_and_user_actions() {
        use crate::timeseries::TimestampedValue;
        use stove_traits::ManualClock;

        let clock = Arc::new(ManualClock::new());
        let signals = StoveSignals::new();
        let recharged = PersistentStateWithTimestamp::new((), clock.clone());
        let user_rate = PersistentStateWithTimestamp::new(None, clock.clone());
        let inputs = RuleInputs::live(
            &signals,
            clock.clone(),
            Duration::from_secs(120),
            recharged.clone(),
            user_rate.clone(),
        );
        assert_eq!((inputs.temperature)(), None);
        assert_eq!((inputs.since_recharge)(), Some(Duration::MAX));

        signals.temperature.publish(TimestampedValue::new(180.0, clock.now()));
        recharged.set(());
        user_rate.set(Some(0.3));
        clock.advance(Duration::from_secs(60));
        assert_eq!((inputs.temperature)(), Some(180.0));
        assert_eq!((inputs.since_recharge)(), Some(Duration::from_secs(60)));
        assert_eq!((inputs.last_user_rate)(), Some(0.3));

        clock.advance(Duration::from_secs(61));
        assert_eq!((inputs.temperature)(), None);
    }

    #[test]
    fn phase_lookup_matches_order() {
        let r = rules(20.0, 0.0, NEVER);
        for (phase, c) in r.phase_confidences() {
            assert_eq!(r.phase(phase).confidence(), c);
        }
    }
}
