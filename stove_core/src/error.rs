use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum StoveError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing temperature sensor")]
    MissingSensor,
    #[error("missing power relay")]
    MissingPowerRelay,
    #[error("missing direction relay")]
    MissingDirectionRelay,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
