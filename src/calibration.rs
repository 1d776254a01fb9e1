//! ADC code and voltage conversion.
//!
//! The CV inputs go through an inverting front end into a 12-bit ADC, so
//! code 0 is the top of the input range. The range depends on the board
//! revision.

use crate::types::HardwareRevision;

/// Full-scale ADC code.
pub const ADC_MAX_CODE: u16 = 4095;

/// First board revision with the wider input range.
const WIDE_RANGE_REVISION: HardwareRevision = HardwareRevision(5);

/// Input voltage range `(min, max)` for a revision.
pub fn input_range(revision: HardwareRevision) -> (f64, f64) {
    if revision < WIDE_RANGE_REVISION {
        (0.0, 6.0)
    } else {
        (-0.5, 6.1)
    }
}

/// Convert an ADC code to input volts.
pub fn code_to_volts(revision: HardwareRevision, code: f64) -> f64 {
    let (v_min, v_max) = input_range(revision);
    let span = v_max - v_min;
    let full = f64::from(ADC_MAX_CODE);
    v_min + (full - code) / full * span
}

/// Convert input volts to the ADC code the device should read.
pub fn volts_to_code(revision: HardwareRevision, volts: f64) -> f64 {
    let (v_min, v_max) = input_range(revision);
    let span = v_max - v_min;
    let full = f64::from(ADC_MAX_CODE);
    full - (volts - v_min) / span * full
}
