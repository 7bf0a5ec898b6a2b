//! Test and replay doubles for the device traits.

use crossbeam_channel as xch;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stove_traits::{Button, ButtonEvent, DeviceError, ElectricRelay, RelayState, TemperatureSensor, UserCommunication};

/// Relay that remembers every command it executed. Clones share state, so a
/// test can keep one and hand the other to the valve.
#[derive(Clone)]
pub struct RecordingRelay {
    inner: Arc<Mutex<(RelayState, Vec<RelayState>)>>,
    failing: Arc<AtomicBool>,
}

impl Default for RecordingRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingRelay {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new((RelayState::Idle, Vec::new()))),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn commands(&self) -> Vec<RelayState> {
        self.inner.lock().map(|g| g.1.clone()).unwrap_or_default()
    }

    pub fn current(&self) -> RelayState {
        self.inner.lock().map(|g| g.0).unwrap_or(RelayState::Idle)
    }

    /// Make every following `set` fail without changing state.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl ElectricRelay for RecordingRelay {
    fn set(&mut self, state: RelayState) -> Result<(), DeviceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Box::new(std::io::Error::other("relay coil open circuit")));
        }
        let mut g = self
            .inner
            .lock()
            .map_err(|_| Box::new(std::io::Error::other("relay lock poisoned")) as DeviceError)?;
        g.0 = state;
        g.1.push(state);
        Ok(())
    }

    fn state(&self) -> RelayState {
        self.current()
    }
}

/// Sensor that plays back a script; `None` entries fail the read.
/// Once the script runs out every read fails.
pub struct ScriptedSensor {
    script: VecDeque<Option<f64>>,
}

impl ScriptedSensor {
    pub fn new(script: impl IntoIterator<Item = Option<f64>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl TemperatureSensor for ScriptedSensor {
    fn read_celsius(&mut self, _timeout: Duration) -> Result<f64, DeviceError> {
        match self.script.pop_front() {
            Some(Some(v)) => Ok(v),
            Some(None) => Err(Box::new(std::io::Error::other("thermocouple read timeout"))),
            None => Err(Box::new(std::io::Error::other("script exhausted"))),
        }
    }
}

/// Button fed from a channel; the sender half stands in for the person.
pub struct ChannelButton {
    rx: xch::Receiver<ButtonEvent>,
}

impl ChannelButton {
    pub fn channel() -> (xch::Sender<ButtonEvent>, Self) {
        let (tx, rx) = xch::unbounded();
        (tx, Self { rx })
    }
}

impl Button for ChannelButton {
    fn wait_event(&mut self, timeout: Duration) -> Result<Option<ButtonEvent>, DeviceError> {
        match self.rx.recv_timeout(timeout) {
            Ok(ev) => Ok(Some(ev)),
            Err(xch::RecvTimeoutError::Timeout) => Ok(None),
            Err(xch::RecvTimeoutError::Disconnected) => {
                Err(Box::new(std::io::Error::other("button disconnected")))
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUserCommunication;

impl UserCommunication for NoopUserCommunication {
    fn acknowledge(&self) {}
    fn alert(&self) {}
}

/// Counts feedback calls.
#[derive(Debug, Default, Clone)]
pub struct CountingUserCommunication {
    pub acks: Arc<AtomicUsize>,
    pub alerts: Arc<AtomicUsize>,
}

impl UserCommunication for CountingUserCommunication {
    fn acknowledge(&self) {
        self.acks.fetch_add(1, Ordering::SeqCst);
    }

    fn alert(&self) {
        self.alerts.fetch_add(1, Ordering::SeqCst);
    }
}
