//! Collaborator contracts between the stove control core and the devices it drives.
//!
//! Concrete drivers (GPIO, SPI thermocouple amplifiers, buzzers) live elsewhere;
//! the core only ever talks to these traits.
pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

pub type DeviceError = Box<dyn std::error::Error + Send + Sync>;

/// A temperature probe returning degrees Celsius.
///
/// Implementations retry internally as the device requires; an `Err` means the
/// sample for this cycle is lost.
pub trait TemperatureSensor {
    fn read_celsius(&mut self, timeout: std::time::Duration) -> Result<f64, DeviceError>;
}

impl<T: TemperatureSensor + ?Sized> TemperatureSensor for Box<T> {
    fn read_celsius(&mut self, timeout: std::time::Duration) -> Result<f64, DeviceError> {
        (**self).read_celsius(timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Engaged,
    Idle,
}

pub trait ElectricRelay {
    fn set(&mut self, state: RelayState) -> Result<(), DeviceError>;
    fn state(&self) -> RelayState;
}

impl<T: ElectricRelay + ?Sized> ElectricRelay for Box<T> {
    fn set(&mut self, state: RelayState) -> Result<(), DeviceError> {
        (**self).set(state)
    }

    fn state(&self) -> RelayState {
        (**self).state()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Click,
    LongClick,
    /// Rotary encoder detent, +1 clockwise, -1 counter-clockwise.
    Tick(i8),
}

/// A debounced push or rotary button.
pub trait Button {
    /// Block until the next event or until `timeout` expires (`Ok(None)`).
    fn wait_event(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<Option<ButtonEvent>, DeviceError>;
}

impl<T: Button + ?Sized> Button for Box<T> {
    fn wait_event(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<Option<ButtonEvent>, DeviceError> {
        (**self).wait_event(timeout)
    }
}

/// Fire-and-forget feedback towards the person standing at the stove.
pub trait UserCommunication {
    fn acknowledge(&self);
    fn alert(&self);
    fn welcome(&self) {}
    fn goodbye(&self) {}
}
