//! Device implementations behind the `stove_traits` contracts.
//!
//! Simulated devices and the pure decoders build everywhere; the Raspberry Pi
//! drivers need the `hardware` feature.
pub mod error;
#[cfg(feature = "hardware")]
pub mod gpio;
pub mod input;
pub mod max31855;
pub mod sim;

pub use error::{HwError, ThermocoupleFault};
#[cfg(feature = "hardware")]
pub use gpio::{GpioButton, GpioRelay, SpiThermocouple, open_gpio};
pub use sim::{BurnCurve, ConsoleUserCommunication, SimulatedRelay, SimulatedThermocouple};
