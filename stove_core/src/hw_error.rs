//! Maps `Box<dyn Error>` from trait boundaries to typed `StoveError`.
//!
//! The traits in `stove_traits` use `Box<dyn Error + Send + Sync>` so any driver
//! can plug in; this module converts those to our typed error enum, with an
//! optional feature-gated path for `stove_hardware::HwError` downcasting.

use crate::error::StoveError;

/// Map a trait-boundary error to a typed `StoveError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> StoveError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<stove_hardware::error::HwError>() {
            return match hw {
                stove_hardware::error::HwError::Timeout => StoveError::Timeout,
                other => StoveError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        StoveError::Timeout
    } else {
        StoveError::Hardware(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_text_maps_to_timeout() {
        let e = std::io::Error::other("spi read timeout");
        assert!(matches!(map_hw_error(&e), StoveError::Timeout));
    }

    #[test]
    fn other_text_maps_to_hardware() {
        let e = std::io::Error::other("thermocouple open circuit");
        match map_hw_error(&e) {
            StoveError::Hardware(msg) => assert!(msg.contains("open circuit")),
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn typed_hw_error_is_downcast() {
        let e = stove_hardware::error::HwError::Gpio("pin 5 busy".into());
        assert!(matches!(map_hw_error(&e), StoveError::HardwareFault(_)));
        let t = stove_hardware::error::HwError::Timeout;
        assert!(matches!(map_hw_error(&t), StoveError::Timeout));
    }
}
