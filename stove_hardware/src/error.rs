use thiserror::Error;

/// Fault bits reported by the thermocouple amplifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermocoupleFault {
    OpenCircuit,
    ShortToGround,
    ShortToVcc,
    /// Fault flag set without any of the detail bits.
    Unspecified,
}

impl std::fmt::Display for ThermocoupleFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ThermocoupleFault::OpenCircuit => "open circuit",
            ThermocoupleFault::ShortToGround => "short to GND",
            ThermocoupleFault::ShortToVcc => "short to VCC",
            ThermocoupleFault::Unspecified => "unspecified fault",
        })
    }
}

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("spi error: {0}")]
    Spi(String),
    #[error("thermocouple read timeout")]
    Timeout,
    #[error("thermocouple fault: {0}")]
    Thermocouple(ThermocoupleFault),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
