use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use stove_core::config::{AutoModeCfg, HistoryCfg, PipelineCfg, SamplerCfg, ValveCfg};
use stove_core::history::{HistorySink, Snapshot};
use stove_core::mocks::{ChannelButton, CountingUserCommunication, RecordingRelay, ScriptedSensor};
use stove_core::tasks::Shutdown;
use stove_core::{ButtonRole, StartOptions, Stove, StoveController, UserCommand, ValveState};
use stove_traits::{ButtonEvent, MonotonicClock, RelayState};

#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<Snapshot>>>);

impl HistorySink for SharedSink {
    fn record(&mut self, snapshot: &Snapshot) -> stove_core::Result<()> {
        self.0.lock().expect("lock").push(snapshot.clone());
        Ok(())
    }
}

struct Bench {
    stove: Stove,
    power: RecordingRelay,
    feedback: CountingUserCommunication,
    open_button: crossbeam_channel::Sender<ButtonEvent>,
}

fn bench(full_motion: Duration) -> Bench {
    let power = RecordingRelay::new();
    let feedback = CountingUserCommunication::default();
    let (open_button, button) = ChannelButton::channel();
    let stove = StoveController::builder()
        .with_sensor(ScriptedSensor::new(std::iter::repeat_n(Some(150.0), 2_000)))
        .with_power_relay(power.clone())
        .with_direction_relay(RecordingRelay::new())
        .with_button(ButtonRole::Open, button)
        .with_feedback(feedback.clone())
        .with_clock(Arc::new(MonotonicClock::new()))
        .with_sampler(SamplerCfg {
            period: Duration::from_millis(10),
            ..SamplerCfg::default()
        })
        .with_pipeline(PipelineCfg {
            smoothing_window: Duration::from_millis(50),
            resample_period: Duration::from_millis(20),
            rate_window: Duration::from_millis(100),
        })
        .with_valve(ValveCfg {
            time_for_full_motion: full_motion,
            extra_time_for_safety: Duration::from_millis(10),
        })
        .with_auto_mode(AutoModeCfg {
            enabled: false,
            poll_period: Duration::from_millis(50),
            ..AutoModeCfg::default()
        })
        .with_history(HistoryCfg {
            period: Duration::from_millis(50),
            validity: Duration::from_secs(5),
        })
        .try_build()
        .expect("build");
    Bench {
        stove,
        power,
        feedback,
        open_button,
    }
}

fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

#[test]
fn readings_flow_and_button_opens_valve() {
    let b = bench(Duration::from_millis(150));
    let sink = SharedSink::default();
    let shown = Arc::new(Mutex::new(Vec::<Vec<String>>::new()));
    let display = Arc::clone(&shown);
    let mut running = b
        .stove
        .start(StartOptions {
            history_sink: Some(Box::new(sink.clone())),
            display: Some(Box::new(move |elements: &[String]| {
                display.lock().expect("lock").push(elements.to_vec());
            })),
            shutdown: None,
        })
        .expect("start");
    let controller = running.controller().clone();

    let temperature = controller.signals().temperature.wait_for(
        &MonotonicClock::new(),
        Duration::from_secs(1),
        Duration::from_secs(2),
        |_| true,
    );
    assert_eq!(temperature, Some(150.0));

    b.open_button.send(ButtonEvent::Click).expect("send");
    assert!(eventually(Duration::from_secs(3), || {
        controller.valve().state() == ValveState::Stopped { rate: 1.0 }
    }));
    assert_eq!(controller.last_user_rate(), Some(1.0));
    // One acknowledgement on the press, one when the valve got there
    assert!(eventually(Duration::from_secs(1), || {
        b.feedback.acks.load(Ordering::SeqCst) >= 2
    }));

    assert!(eventually(Duration::from_secs(2), || {
        sink.0
            .lock()
            .expect("lock")
            .iter()
            .any(|s| s.values.contains_key("temperature") && s.values.contains_key("state"))
    }));
    assert!(eventually(Duration::from_secs(3), || {
        shown
            .lock()
            .expect("lock")
            .iter()
            .any(|e| e.first().map(String::as_str) == Some("open"))
    }));

    running.stop();
    assert_eq!(b.power.current(), RelayState::Idle);
    assert!(controller.valve().is_halted());
}

#[test]
fn stop_interrupts_a_valve_move() {
    let b = bench(Duration::from_secs(1));
    let mut running = b.stove.start(StartOptions::default()).expect("start");
    let handle = running
        .controller()
        .execute(UserCommand::Close)
        .expect("execute")
        .expect("valve move");
    assert!(eventually(Duration::from_secs(1), || {
        b.power.current() == RelayState::Engaged
    }));

    running.stop();
    assert_eq!(b.power.current(), RelayState::Idle);
    assert!(!handle.join().expect("join"));
}

#[test]
fn toggle_and_recharge_do_not_touch_the_valve() {
    let b = bench(Duration::from_millis(100));
    let running = b.stove.start(StartOptions::default()).expect("start");
    let controller = running.controller();
    assert!(!controller.auto_mode().enabled());

    assert!(controller.execute(UserCommand::ToggleAuto).expect("toggle").is_none());
    assert!(controller.auto_mode().enabled());
    assert!(controller.execute(UserCommand::Recharge).expect("recharge").is_none());
    assert!(controller.since_recharge() < Duration::from_secs(5));
    assert_eq!(controller.last_user_rate(), None);
    assert_eq!(b.feedback.acks.load(Ordering::SeqCst), 2);
}

#[test]
fn external_shutdown_ends_wait() {
    let b = bench(Duration::from_millis(100));
    let token = Shutdown::new();
    let running = b
        .stove
        .start(StartOptions {
            shutdown: Some(token.clone()),
            ..StartOptions::default()
        })
        .expect("start");
    let waiter = thread::spawn(move || running.wait());
    thread::sleep(Duration::from_millis(50));
    token.request();
    waiter.join().expect("wait returned");
    assert_eq!(b.power.current(), RelayState::Idle);
}
