//! Built-in schemas for known firmware generations.

use super::field::FieldKind::{Bool, Fix16, Int16, Uint16, Uint32, Uint8};
use super::schema::{field, Schema};

/// Name of the schema used when none is configured.
pub const DEFAULT_SCHEMA: &str = "gemini-v2";

/// Names of every built-in schema.
pub const PRESET_NAMES: [&str; 3] = ["gemini-v1", "gemini-v2", "gemini-v3"];

/// Look up a built-in schema by name.
pub fn preset(name: &str) -> Option<Schema> {
    let fields = match name {
        // First generation: calibration, knob ranges and chorus only.
        "gemini-v1" => vec![
            field("adc_gain_corr", Uint16, 2048i64),
            field("adc_offset_corr", Int16, 0i64),
            field("led_brightness", Uint16, 127i64),
            field("castor_knob_min", Fix16, -1.01),
            field("castor_knob_max", Fix16, 1.01),
            field("pollux_knob_min", Fix16, -1.01),
            field("pollux_knob_max", Fix16, 1.01),
            field("chorus_max_intensity", Fix16, 0.05),
            field("chorus_frequency", Fix16, 0.2),
        ],
        "gemini-v2" => vec![
            field("adc_gain_corr", Uint16, 2048i64),
            field("adc_offset_corr", Int16, 0i64),
            field("led_brightness", Uint16, 127i64),
            field("castor_knob_min", Fix16, -1.2),
            field("castor_knob_max", Fix16, 1.2),
            field("pollux_knob_min", Fix16, -1.2),
            field("pollux_knob_max", Fix16, 1.2),
            field("chorus_max_intensity", Fix16, 0.05),
            field("lfo_1_frequency", Fix16, 0.2),
            field("cv_offset_error", Fix16, 0.0),
            field("cv_gain_error", Fix16, 1.0),
            field("smooth_initial_gain", Fix16, 0.1),
            field("smooth_sensitivity", Fix16, 30.0),
            field("pollux_follower_threshold", Uint16, 100i64),
            field("castor_lfo_pwm", Bool, false),
            field("pollux_lfo_pwm", Bool, false),
            field("pitch_knob_nonlinearity", Fix16, 0.6),
            field("base_cv_offset", Fix16, 1.0),
            field("lfo_2_frequency_ratio", Fix16, 2.0),
            field("lfo_1_waveshape", Uint8, 0i64),
            field("lfo_2_waveshape", Uint8, 0i64),
            field("lfo_1_factor", Fix16, 1.0),
            field("lfo_2_factor", Fix16, 0.0),
            field("castor_quantize", Bool, false),
            field("pollux_quantize", Bool, false),
        ],
        // Smoothing and per-oscillator PWM were retired; their slots stay
        // reserved so the layout is unchanged.
        "gemini-v3" => vec![
            field("adc_gain_corr", Uint16, 2048i64),
            field("adc_offset_corr", Int16, 0i64),
            field("led_brightness", Uint16, 127i64),
            field("castor_knob_min", Fix16, -1.2),
            field("castor_knob_max", Fix16, 1.2),
            field("pollux_knob_min", Fix16, -1.2),
            field("pollux_knob_max", Fix16, 1.2),
            field("chorus_max_intensity", Fix16, 0.05),
            field("lfo_1_frequency", Fix16, 0.2),
            field("cv_offset_error", Fix16, 0.0),
            field("cv_gain_error", Fix16, 1.0),
            field("removed_smooth_initial_gain", Fix16, 0.1),
            field("removed_smooth_sensitivity", Fix16, 30.0),
            field("zero_detection_threshold", Uint16, 350i64),
            field("removed_castor_lfo_pwm", Bool, false),
            field("removed_pollux_lfo_pwm", Bool, false),
            field("pitch_knob_nonlinearity", Fix16, 0.6),
            field("base_cv_offset", Fix16, 1.0),
            field("lfo_2_frequency_ratio", Fix16, 2.0),
            field("lfo_1_waveshape", Uint8, 0i64),
            field("lfo_2_waveshape", Uint8, 0i64),
            field("lfo_1_factor", Fix16, 1.0),
            field("lfo_2_factor", Fix16, 0.0),
            field("pulse_width_bitmask", Uint16, 4095i64),
            field("osc8m_freq", Uint32, 8_000_000i64),
            field("zero_detection_enabled", Bool, true),
            field("quantization_enabled", Bool, true),
        ],
        _ => return None,
    };

    let magic = match name {
        "gemini-v1" => Some(0x66),
        "gemini-v2" => Some(0x63),
        _ => None,
    };

    Some(Schema {
        name: name.to_string(),
        magic,
        fields,
    })
}
