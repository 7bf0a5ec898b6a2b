//! MAX31855 cold-junction compensated thermocouple-to-digital frames.
//!
//! One read clocks out 32 bits, MSB first:
//!
//! | bits   | content                                   |
//! |--------|-------------------------------------------|
//! | 31..18 | thermocouple, 14-bit signed, 0.25 °C/LSB  |
//! | 16     | fault flag                                |
//! | 15..4  | internal, 12-bit signed, 0.0625 °C/LSB    |
//! | 2..0   | short to VCC, short to GND, open circuit  |

use crate::error::{HwError, Result, ThermocoupleFault};

const FAULT_FLAG: u32 = 1 << 16;
const OPEN_CIRCUIT: u32 = 1 << 0;
const SHORT_TO_GND: u32 = 1 << 1;
const SHORT_TO_VCC: u32 = 1 << 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Max31855Reading {
    /// Hot junction (°C).
    pub thermocouple: f64,
    /// Cold junction, i.e. the chip itself (°C).
    pub internal: f64,
}

/// Sign-extend the `bits`-wide field ending at the top of `value >> shift`.
#[inline]
fn signed_field(value: u32, shift: u32, bits: u32) -> i32 {
    // Move the field to the top, then arithmetic-shift back down
    ((value << (32 - shift - bits)) as i32) >> (32 - bits)
}

/// Decode one 4-byte frame. A set fault flag is an error.
pub fn decode(frame: [u8; 4]) -> Result<Max31855Reading> {
    let raw = u32::from_be_bytes(frame);
    if raw & FAULT_FLAG != 0 {
        let fault = if raw & OPEN_CIRCUIT != 0 {
            ThermocoupleFault::OpenCircuit
        } else if raw & SHORT_TO_GND != 0 {
            ThermocoupleFault::ShortToGround
        } else if raw & SHORT_TO_VCC != 0 {
            ThermocoupleFault::ShortToVcc
        } else {
            ThermocoupleFault::Unspecified
        };
        return Err(HwError::Thermocouple(fault));
    }
    Ok(Max31855Reading {
        thermocouple: f64::from(signed_field(raw, 18, 14)) * 0.25,
        internal: f64::from(signed_field(raw, 4, 12)) * 0.0625,
    })
}
