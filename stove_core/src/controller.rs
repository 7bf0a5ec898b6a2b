//! Wiring of one stove: devices, signals, valve, auto mode and their tasks.

use crossbeam_channel as xch;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use stove_traits::{Button, Clock, ElectricRelay, MonotonicClock, TemperatureSensor, UserCommunication};

use crate::auto_mode::AutoModeController;
use crate::buttons::{ButtonRole, UserCommand, spawn_listener};
use crate::config::{AutoModeCfg, HistoryCfg, PipelineCfg, SamplerCfg, ValveCfg};
use crate::error::{BuildError, Result};
use crate::history::{HistoryRecorder, HistorySink, SignalSource};
use crate::persistent::PersistentStateWithTimestamp;
use crate::pipeline::{StoveSignals, TemperaturePipeline};
use crate::rules::{CombustionRules, RuleInputs};
use crate::sampler::Sampler;
use crate::tasks::{Shutdown, TaskGroup};
use crate::util::clamp_unit;
use crate::valve::{RATE_STEP, ValveController};

const DISPLAY_REFRESH: Duration = Duration::from_secs(1);

/// Handle on a stove's shared state. Cheap to clone.
#[derive(Clone)]
pub struct StoveController {
    clock: Arc<dyn Clock + Send + Sync>,
    signals: StoveSignals,
    valve: ValveController,
    auto_mode: AutoModeController,
    user_rate: PersistentStateWithTimestamp<Option<f64>>,
    recharged: PersistentStateWithTimestamp<()>,
    feedback: Arc<dyn UserCommunication + Send + Sync>,
    display_validity: Duration,
}

impl StoveController {
    pub fn builder() -> StoveBuilder {
        StoveBuilder::default()
    }

    pub fn signals(&self) -> &StoveSignals {
        &self.signals
    }

    pub fn valve(&self) -> &ValveController {
        &self.valve
    }

    pub fn auto_mode(&self) -> &AutoModeController {
        &self.auto_mode
    }

    pub fn last_user_rate(&self) -> Option<f64> {
        self.user_rate.get()
    }

    pub fn since_recharge(&self) -> Duration {
        self.recharged.time_since_last_change()
    }

    /// Carry out one user command. Valve moves run on their own thread; the
    /// handle yields whether the move completed.
    pub fn execute(&self, command: UserCommand) -> Result<Option<JoinHandle<bool>>> {
        self.feedback.acknowledge();
        let target = match command {
            UserCommand::ToggleAuto => {
                self.auto_mode.toggle();
                return Ok(None);
            }
            UserCommand::Recharge => {
                self.recharged.set(());
                tracing::info!("recharge signalled");
                return Ok(None);
            }
            UserCommand::Open => 1.0,
            UserCommand::Close => 0.0,
            UserCommand::OpenMore => clamp_unit(self.valve.reference_rate() + RATE_STEP),
            UserCommand::CloseMore => clamp_unit(self.valve.reference_rate() - RATE_STEP),
        };
        self.user_rate.set(Some(target));
        tracing::info!(?command, target_rate = target, "manual valve command");
        let valve = self.valve.clone();
        let feedback = Arc::clone(&self.feedback);
        let handle = std::thread::Builder::new()
            .name("manual-valve".into())
            .spawn(move || {
                let reached = valve.set_open_rate_to(target);
                if reached {
                    feedback.acknowledge();
                }
                reached
            })?;
        Ok(Some(handle))
    }

    /// Execute commands until shutdown or until every sender is gone.
    pub fn serve_commands(&self, commands: xch::Receiver<UserCommand>, shutdown: Shutdown) {
        loop {
            xch::select! {
                recv(commands) -> msg => match msg {
                    Ok(command) => {
                        if let Err(e) = self.execute(command) {
                            tracing::error!(error = %e, ?command, "command failed");
                            self.feedback.alert();
                        }
                    }
                    Err(_) => break,
                },
                recv(shutdown.receiver()) -> _ => break,
            }
        }
    }

    /// Valve state, temperature and auto mode message, as shown on the display.
    pub fn status_elements(&self) -> Vec<String> {
        let temperature = self
            .signals
            .temperature
            .value_if_fresh(self.clock.now(), self.display_validity)
            .map_or_else(|| "?°".to_owned(), |t| format!("{t:.0}°"));
        vec![
            self.valve.state().to_string(),
            temperature,
            self.auto_mode.state_message(),
        ]
    }
}

/// Devices and settings for one stove. `try_build` checks that the mandatory
/// devices are present.
pub struct StoveBuilder {
    sensor: Option<Box<dyn TemperatureSensor + Send>>,
    power: Option<Box<dyn ElectricRelay + Send>>,
    direction: Option<Box<dyn ElectricRelay + Send>>,
    buttons: Vec<(ButtonRole, Box<dyn Button + Send>)>,
    feedback: Option<Arc<dyn UserCommunication + Send + Sync>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    pipeline: PipelineCfg,
    valve: ValveCfg,
    auto_mode: AutoModeCfg,
    history: HistoryCfg,
    sampler: SamplerCfg,
}

impl Default for StoveBuilder {
    fn default() -> Self {
        Self {
            sensor: None,
            power: None,
            direction: None,
            buttons: Vec::new(),
            feedback: None,
            clock: None,
            pipeline: PipelineCfg::default(),
            valve: ValveCfg::default(),
            auto_mode: AutoModeCfg::default(),
            history: HistoryCfg::default(),
            sampler: SamplerCfg::default(),
        }
    }
}

impl StoveBuilder {
    pub fn with_sensor(mut self, sensor: impl TemperatureSensor + Send + 'static) -> Self {
        self.sensor = Some(Box::new(sensor));
        self
    }

    pub fn with_power_relay(mut self, relay: impl ElectricRelay + Send + 'static) -> Self {
        self.power = Some(Box::new(relay));
        self
    }

    pub fn with_direction_relay(mut self, relay: impl ElectricRelay + Send + 'static) -> Self {
        self.direction = Some(Box::new(relay));
        self
    }

    pub fn with_button(mut self, role: ButtonRole, button: impl Button + Send + 'static) -> Self {
        self.buttons.push((role, Box::new(button)));
        self
    }

    pub fn with_feedback(mut self, feedback: impl UserCommunication + Send + Sync + 'static) -> Self {
        self.feedback = Some(Arc::new(feedback));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_pipeline(mut self, cfg: PipelineCfg) -> Self {
        self.pipeline = cfg;
        self
    }

    pub fn with_valve(mut self, cfg: ValveCfg) -> Self {
        self.valve = cfg;
        self
    }

    pub fn with_auto_mode(mut self, cfg: AutoModeCfg) -> Self {
        self.auto_mode = cfg;
        self
    }

    pub fn with_history(mut self, cfg: HistoryCfg) -> Self {
        self.history = cfg;
        self
    }

    pub fn with_sampler(mut self, cfg: SamplerCfg) -> Self {
        self.sampler = cfg;
        self
    }

    pub fn try_build(self) -> Result<Stove> {
        let sensor = self
            .sensor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSensor))?;
        let power = self
            .power
            .ok_or_else(|| eyre::Report::new(BuildError::MissingPowerRelay))?;
        let direction = self
            .direction
            .ok_or_else(|| eyre::Report::new(BuildError::MissingDirectionRelay))?;
        if self.valve.time_for_full_motion.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "valve full motion time must be > 0",
            )));
        }
        if self.auto_mode.poll_period.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "auto mode poll period must be > 0",
            )));
        }
        if !(0.0..=1.0).contains(&self.auto_mode.min_confidence) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "auto mode min confidence must be within [0, 1]",
            )));
        }
        if self.history.period.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "history period must be > 0",
            )));
        }

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let feedback = self
            .feedback
            .unwrap_or_else(|| Arc::new(crate::mocks::NoopUserCommunication));
        let signals = StoveSignals::new();
        let user_rate = PersistentStateWithTimestamp::new(None, Arc::clone(&clock));
        let recharged = PersistentStateWithTimestamp::new((), Arc::clone(&clock));
        let valve = ValveController::new(power, direction, self.valve, Arc::clone(&clock));
        let rules = CombustionRules::new(RuleInputs::live(
            &signals,
            Arc::clone(&clock),
            self.auto_mode.validity,
            recharged.clone(),
            user_rate.clone(),
        ));
        let display_validity = self.auto_mode.validity;
        let auto_mode = AutoModeController::new(
            rules,
            valve.clone(),
            signals.rate.clone(),
            self.auto_mode,
            Arc::clone(&clock),
        );

        Ok(Stove {
            controller: StoveController {
                clock,
                signals,
                valve,
                auto_mode,
                user_rate,
                recharged,
                feedback,
                display_validity,
            },
            sensor,
            buttons: self.buttons,
            pipeline: self.pipeline,
            history: self.history,
            sampler: self.sampler,
        })
    }
}

/// A built stove whose tasks are not running yet.
pub struct Stove {
    controller: StoveController,
    sensor: Box<dyn TemperatureSensor + Send>,
    buttons: Vec<(ButtonRole, Box<dyn Button + Send>)>,
    pipeline: PipelineCfg,
    history: HistoryCfg,
    sampler: SamplerCfg,
}

impl std::fmt::Debug for Stove {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stove")
            .field("buttons", &self.buttons.len())
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

/// What `Stove::start` wires besides the control loops.
#[derive(Default)]
pub struct StartOptions {
    pub history_sink: Option<Box<dyn HistorySink>>,
    /// Called with the display elements whenever they change.
    pub display: Option<Box<dyn FnMut(&[String]) + Send>>,
    /// Token to drive the task group with, e.g. one shared with a signal handler.
    pub shutdown: Option<Shutdown>,
}

impl Stove {
    pub fn controller(&self) -> &StoveController {
        &self.controller
    }

    /// Read the sensor once, outside of any task.
    pub fn probe_temperature(&mut self) -> Result<f64> {
        self.sensor
            .read_celsius(Duration::from_secs(1))
            .map_err(|e| eyre::Report::new(crate::hw_error::map_hw_error(&*e)))
    }

    /// Start every task. The valve motor is switched off before tasks are joined.
    pub fn start(self, options: StartOptions) -> Result<RunningStove> {
        let controller = self.controller;
        let mut group = TaskGroup::with_token(options.shutdown.unwrap_or_default());

        let valve = controller.valve.clone();
        group.on_shutdown("valve-halt", move || valve.halt());

        TemperaturePipeline::new(&self.pipeline).spawn_into(&mut group, &controller.signals)?;
        controller.auto_mode.spawn_into(&mut group)?;

        let (tx, rx) = xch::unbounded();
        for (role, button) in self.buttons {
            spawn_listener(&mut group, button, role, tx.clone())?;
        }
        drop(tx);
        let c = controller.clone();
        group.spawn("commands", move |shutdown| c.serve_commands(rx, shutdown))?;

        if let Some(sink) = options.history_sink {
            let mut recorder = HistoryRecorder::new(self.history, Arc::clone(&controller.clock));
            for signal in [&controller.signals.temperature, &controller.signals.rate] {
                recorder.add_source(Arc::new(SignalSource::new(
                    signal.clone(),
                    Arc::clone(&controller.clock),
                )));
            }
            recorder.add_source(Arc::new(controller.valve.clone()));
            recorder.add_source(Arc::new(controller.auto_mode.clone()));
            recorder.spawn_into(&mut group, sink)?;
        }

        if let Some(mut display) = options.display {
            let c = controller.clone();
            group.spawn("display", move |shutdown| {
                let mut shown = Vec::new();
                loop {
                    let elements = c.status_elements();
                    if elements != shown {
                        display(&elements);
                        shown = elements;
                    }
                    if !shutdown.sleep(DISPLAY_REFRESH) {
                        break;
                    }
                }
            })?;
        }

        // Sampler last so the pipeline is already subscribed to its first reading
        let sampler = Sampler::spawn(
            self.sensor,
            self.sampler,
            Arc::clone(&controller.clock),
            controller.signals.raw_temperature.clone(),
        );
        controller.feedback.welcome();
        tracing::info!(tasks = group.len(), "stove started");

        Ok(RunningStove {
            controller,
            sampler: Some(sampler),
            group,
        })
    }
}

/// A stove with all of its tasks running. Dropping it shuts everything down.
pub struct RunningStove {
    controller: StoveController,
    sampler: Option<Sampler>,
    group: TaskGroup,
}

impl RunningStove {
    pub fn controller(&self) -> &StoveController {
        &self.controller
    }

    pub fn token(&self) -> Shutdown {
        self.group.token()
    }

    pub fn sensor_stalled_for(&self) -> Option<Duration> {
        self.sampler.as_ref().map(Sampler::stalled_for)
    }

    /// Block until shutdown is requested, then stop.
    pub fn wait(mut self) {
        self.group.token().wait();
        self.stop();
    }

    /// Motor off, tasks joined, sensor released.
    pub fn stop(&mut self) {
        self.group.shutdown();
        self.sampler.take();
        self.controller.feedback.goodbye();
        tracing::info!("stove stopped");
    }
}

impl Drop for RunningStove {
    fn drop(&mut self) {
        if self.sampler.is_some() {
            self.stop();
        }
    }
}
