//! Field kinds, values and fixed-point conversion.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// Scale factor of the 16.16 fixed-point representation.
pub const FIX16_ONE: f64 = 65536.0;

/// Smallest representable fix16 value.
pub const FIX16_MIN: f64 = i32::MIN as f64 / FIX16_ONE;

/// Largest representable fix16 value.
pub const FIX16_MAX: f64 = i32::MAX as f64 / FIX16_ONE;

/// Convert a real to its fix16 integer, rounding half away from zero.
pub fn to_fix16(value: f64) -> Option<i32> {
    if !value.is_finite() {
        return None;
    }
    let scaled = (value * FIX16_ONE).round();
    if scaled < f64::from(i32::MIN) || scaled > f64::from(i32::MAX) {
        return None;
    }
    Some(scaled as i32)
}

/// Convert a fix16 integer back to a real.
pub fn from_fix16(raw: i32) -> f64 {
    f64::from(raw) / FIX16_ONE
}

/// Wire type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Uint8,
    Uint16,
    Uint32,
    Int16,
    Bool,
    Fix16,
}

impl FieldKind {
    /// Packed width in bytes.
    pub fn width(self) -> usize {
        match self {
            Self::Uint8 | Self::Bool => 1,
            Self::Uint16 | Self::Int16 => 2,
            Self::Uint32 | Self::Fix16 => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Int16 => "int16",
            Self::Bool => "bool",
            Self::Fix16 => "fix16",
        }
    }

    /// Inclusive integer range, for integer kinds.
    pub fn int_range(self) -> Option<(i64, i64)> {
        match self {
            Self::Uint8 => Some((0, i64::from(u8::MAX))),
            Self::Uint16 => Some((0, i64::from(u16::MAX))),
            Self::Uint32 => Some((0, i64::from(u32::MAX))),
            Self::Int16 => Some((i64::from(i16::MIN), i64::from(i16::MAX))),
            Self::Bool | Self::Fix16 => None,
        }
    }

    /// Validate `value` for a field of this kind.
    ///
    /// Out-of-range values are rejected, never wrapped. Fix16 values come
    /// back quantized to the nearest 1/65536.
    pub fn check(self, field: &str, value: Value) -> Result<Value, RecordError> {
        let mismatch = || RecordError::KindMismatch {
            field: field.to_string(),
            expected: self.name(),
            got: value.kind_name(),
        };
        let out_of_range = || RecordError::OutOfRange {
            field: field.to_string(),
            kind: self.name(),
            value: value.to_string(),
        };

        match (self, value) {
            (Self::Bool, Value::Bool(_)) => Ok(value),
            (Self::Bool, _) => Err(mismatch()),
            (Self::Fix16, Value::Fix16(v)) => to_fix16(v)
                .map(|raw| Value::Fix16(from_fix16(raw)))
                .ok_or_else(out_of_range),
            (Self::Fix16, Value::Int(v)) => to_fix16(v as f64)
                .map(|raw| Value::Fix16(from_fix16(raw)))
                .ok_or_else(out_of_range),
            (Self::Fix16, Value::Bool(_)) => Err(mismatch()),
            (kind, Value::Int(v)) => {
                let (min, max) = kind.int_range().ok_or_else(mismatch)?;
                if (min..=max).contains(&v) {
                    Ok(value)
                } else {
                    Err(out_of_range())
                }
            }
            (_, _) => Err(mismatch()),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed field value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Fix16(f64),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Fix16(_) => "real",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Self::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Fix16(v) => Some(v),
            Self::Int(v) => Some(v as f64),
            Self::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Fix16(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Fix16(v)
    }
}

/// Name, kind and default of one schema field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub default: Value,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            kind,
            default: default.into(),
        }
    }
}
