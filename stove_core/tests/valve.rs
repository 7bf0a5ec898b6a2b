use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use stove_core::config::ValveCfg;
use stove_core::history::{SampleValue, Sampleable};
use stove_core::mocks::RecordingRelay;
use stove_core::valve::{ValveController, ValveState};
use stove_traits::{Clock, ManualClock, MonotonicClock, RelayState};

struct Rig {
    valve: ValveController,
    power: RecordingRelay,
    direction: RecordingRelay,
}

fn rig(cfg: ValveCfg, clock: Arc<dyn Clock + Send + Sync>) -> Rig {
    let power = RecordingRelay::new();
    let direction = RecordingRelay::new();
    let valve = ValveController::new(
        Box::new(power.clone()),
        Box::new(direction.clone()),
        cfg,
        clock,
    );
    Rig {
        valve,
        power,
        direction,
    }
}

fn assert_about(actual: Duration, expected: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(diff < Duration::from_millis(1), "{actual:?} vs {expected:?}");
}

fn fast_cfg() -> ValveCfg {
    ValveCfg {
        time_for_full_motion: Duration::from_millis(400),
        extra_time_for_safety: Duration::from_millis(20),
    }
}

#[test]
fn first_move_resets_to_fully_open() {
    let clock = ManualClock::new();
    let r = rig(ValveCfg::default(), Arc::new(clock.clone()));
    assert_eq!(r.valve.state(), ValveState::Unknown);

    assert!(r.valve.set_open_rate_to(1.0));
    assert_eq!(r.valve.state(), ValveState::Stopped { rate: 1.0 });
    // Full motion plus the seating margin
    assert_eq!(clock.elapsed(), Duration::from_secs(160));
    assert_eq!(r.power.current(), RelayState::Idle);
    // Opening leaves the direction relay idle
    assert!(r.direction.commands().is_empty());
}

#[test]
fn closing_engages_the_direction_relay() {
    let clock = ManualClock::new();
    let r = rig(ValveCfg::default(), Arc::new(clock.clone()));
    assert!(r.valve.set_open_rate_to(0.2));
    assert_eq!(r.direction.commands(), vec![RelayState::Engaged, RelayState::Idle]);
    assert_eq!(
        r.power.commands(),
        vec![
            RelayState::Engaged,
            RelayState::Idle,
            RelayState::Engaged,
            RelayState::Idle
        ]
    );
}

#[test]
fn half_way_takes_half_the_motion_time() {
    let clock = ManualClock::new();
    let r = rig(ValveCfg::default(), Arc::new(clock.clone()));
    assert!(r.valve.open());
    let before = clock.elapsed();

    assert!(r.valve.set_open_rate_to(0.5));
    assert_eq!(r.valve.state(), ValveState::Stopped { rate: 0.5 });
    assert_eq!(clock.elapsed() - before, Duration::from_secs(75));
    assert_eq!(r.power.current(), RelayState::Idle);
}

#[test]
fn reset_then_partial_target() {
    let clock = ManualClock::new();
    let r = rig(ValveCfg::default(), Arc::new(clock.clone()));
    assert!(r.valve.set_open_rate_to(0.2));
    assert_eq!(r.valve.state(), ValveState::Stopped { rate: 0.2 });
    // 160 s reset, then 0.8 of 150 s closing
    assert_about(clock.elapsed(), Duration::from_secs(280));
}

#[test]
fn closing_fully_adds_the_margin() {
    let clock = ManualClock::new();
    let r = rig(ValveCfg::default(), Arc::new(clock.clone()));
    assert!(r.valve.set_open_rate_to(0.4));
    let before = clock.elapsed();
    assert!(r.valve.close());
    assert_eq!(r.valve.state(), ValveState::Stopped { rate: 0.0 });
    assert_about(clock.elapsed() - before, Duration::from_secs(70));
    assert_eq!(r.valve.state().to_string(), "closed");
}

#[test]
fn same_rate_is_a_no_op() {
    let clock = ManualClock::new();
    let r = rig(ValveCfg::default(), Arc::new(clock.clone()));
    assert!(r.valve.set_open_rate_to(0.3));
    let power_cmds = r.power.commands().len();
    let direction_cmds = r.direction.commands().len();
    let before = clock.elapsed();

    assert!(r.valve.set_open_rate_to(0.3));
    assert_eq!(clock.elapsed(), before);
    assert_eq!(r.power.commands().len(), power_cmds);
    assert_eq!(r.direction.commands().len(), direction_cmds);
}

#[test]
fn relative_steps_start_from_stopped_rate() {
    let clock = ManualClock::new();
    let r = rig(ValveCfg::default(), Arc::new(clock.clone()));
    assert!(r.valve.set_open_rate_to(0.5));
    assert!(r.valve.open_more());
    assert!(matches!(r.valve.state(), ValveState::Stopped { rate } if (rate - 0.6).abs() < 1e-9));
    assert!(r.valve.close_more());
    assert!(r.valve.close_more());
    assert!(matches!(r.valve.state(), ValveState::Stopped { rate } if (rate - 0.4).abs() < 1e-9));
}

#[test]
fn targets_are_clamped() {
    let clock = ManualClock::new();
    let r = rig(ValveCfg::default(), Arc::new(clock.clone()));
    assert!(r.valve.set_open_rate_to(1.7));
    assert_eq!(r.valve.state(), ValveState::Stopped { rate: 1.0 });
    assert!(r.valve.set_open_rate_to(-3.0));
    assert_eq!(r.valve.state(), ValveState::Stopped { rate: 0.0 });
}

#[test]
fn observers_see_every_transition() {
    let clock = ManualClock::new();
    let r = rig(ValveCfg::default(), Arc::new(clock.clone()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    r.valve
        .on_change(move |state| s.lock().expect("lock").push(state.to_string()));
    assert!(r.valve.set_open_rate_to(0.5));
    assert_eq!(
        *seen.lock().expect("lock"),
        vec!["?>50%", "open", "100>50%", "50%"]
    );
}

#[test]
fn later_call_supersedes_earlier_one() {
    let r = rig(fast_cfg(), Arc::new(MonotonicClock::new()));
    assert!(r.valve.open());

    let v = r.valve.clone();
    let first = thread::spawn(move || v.set_open_rate_to(0.1));
    thread::sleep(Duration::from_millis(60));
    let v = r.valve.clone();
    let second = thread::spawn(move || v.set_open_rate_to(0.6));

    assert!(second.join().expect("join"));
    assert!(!first.join().expect("join"));
    assert!(matches!(r.valve.state(), ValveState::Stopped { rate } if (rate - 0.6).abs() < 1e-9));
    assert_eq!(r.power.current(), RelayState::Idle);
}

#[test]
fn retarget_during_reset_keeps_calibration_time() {
    let r = rig(fast_cfg(), Arc::new(MonotonicClock::new()));
    let v = r.valve.clone();
    let started = std::time::Instant::now();
    let first = thread::spawn(move || v.set_open_rate_to(0.5));
    thread::sleep(Duration::from_millis(50));
    assert!(matches!(r.valve.state(), ValveState::Resetting { target, .. } if target == 0.5));

    let v = r.valve.clone();
    let second = thread::spawn(move || v.set_open_rate_to(1.0));
    thread::sleep(Duration::from_millis(20));
    assert!(matches!(r.valve.state(), ValveState::Resetting { target, .. } if target == 1.0));

    assert!(second.join().expect("join"));
    assert!(!first.join().expect("join"));
    assert!(started.elapsed() >= Duration::from_millis(420));
    assert_eq!(r.valve.state(), ValveState::Stopped { rate: 1.0 });
}

#[test]
fn estimate_moves_while_running() {
    let r = rig(fast_cfg(), Arc::new(MonotonicClock::new()));
    assert!(r.valve.open());
    let v = r.valve.clone();
    let mover = thread::spawn(move || v.close());
    thread::sleep(Duration::from_millis(150));
    let est = r.valve.estimated_rate().expect("known");
    assert!(est < 0.9 && est > 0.0, "estimate {est}");
    assert!(matches!(r.valve.state(), ValveState::Closing { .. }));
    assert!(mover.join().expect("join"));
}

#[test]
fn halt_stops_motor_and_refuses_moves() {
    let r = rig(fast_cfg(), Arc::new(MonotonicClock::new()));
    assert!(r.valve.open());
    let v = r.valve.clone();
    let mover = thread::spawn(move || v.close());
    thread::sleep(Duration::from_millis(100));
    assert_eq!(r.power.current(), RelayState::Engaged);

    r.valve.halt();
    assert_eq!(r.power.current(), RelayState::Idle);
    assert!(!mover.join().expect("join"));
    match r.valve.state() {
        ValveState::Stopped { rate } => assert!(rate > 0.0 && rate < 1.0),
        other => panic!("expected a stopped estimate, got {other:?}"),
    }
    assert!(!r.valve.open());
}

#[test]
fn relay_failures_do_not_break_the_state_machine() {
    let clock = ManualClock::new();
    let r = rig(ValveCfg::default(), Arc::new(clock.clone()));
    r.power.set_failing(true);
    assert!(r.valve.set_open_rate_to(0.5));
    assert_eq!(r.valve.state(), ValveState::Stopped { rate: 0.5 });
}

#[test]
fn history_sample_names_state_and_open_rate() {
    let clock = ManualClock::new();
    let r = rig(ValveCfg::default(), Arc::new(clock.clone()));
    let before = r.valve.sample(Duration::from_secs(300));
    assert_eq!(before.get("state"), Some(&SampleValue::Text("?".into())));
    assert!(!before.contains_key("open-rate"));

    assert!(r.valve.set_open_rate_to(0.5));
    let after = r.valve.sample(Duration::from_secs(300));
    assert_eq!(after.get("state"), Some(&SampleValue::Text("50%".into())));
    assert_eq!(after.get("open-rate"), Some(&SampleValue::Number(0.5)));
}

#[test]
fn repeated_target_hands_the_move_to_the_latest_call() {
    let r = rig(fast_cfg(), Arc::new(MonotonicClock::new()));
    assert!(r.valve.open());

    let v = r.valve.clone();
    let first = thread::spawn(move || v.set_open_rate_to(0.2));
    thread::sleep(Duration::from_millis(60));
    let v = r.valve.clone();
    let second = thread::spawn(move || v.set_open_rate_to(0.2));

    assert!(second.join().expect("join"));
    assert!(!first.join().expect("join"));
    assert!(matches!(r.valve.state(), ValveState::Stopped { rate } if (rate - 0.2).abs() < 1e-9));
}
