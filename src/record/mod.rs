//! Schema-driven settings records.
//!
//! A [`SettingsRecord`] is a flat mapping of field names to typed values,
//! laid out by a [`Schema`]. Packing writes the optional magic byte followed
//! by each field in declaration order, big-endian:
//!
//! ```text
//! ┌───────────┬──────────────┬──────────────┬─────┬──────────────┐
//! │ Magic (1) │ field 0 (w0) │ field 1 (w1) │ ... │ field n (wn) │
//! └───────────┴──────────────┴──────────────┴─────┴──────────────┘
//! ```
//!
//! There is no length prefix; the length is implied by the schema.

mod field;
mod presets;
mod schema;

pub use field::{from_fix16, to_fix16, FieldDescriptor, FieldKind, Value, FIX16_MAX, FIX16_MIN, FIX16_ONE};
pub use presets::{preset, DEFAULT_SCHEMA, PRESET_NAMES};
pub use schema::Schema;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use byteorder::{BigEndian, ByteOrder};

use crate::error::{IntegrityError, ProtocolError, RecordError, Result};

/// Values for every field of a schema.
#[derive(Debug, Clone)]
pub struct SettingsRecord {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl SettingsRecord {
    /// Create a record holding the schema defaults.
    pub fn new(schema: Arc<Schema>) -> Self {
        let values = schema.defaults();
        Self { schema, values }
    }

    /// Create a record from a partial mapping.
    ///
    /// Missing fields take their defaults; unknown names are ignored.
    pub fn from_values<I, K>(schema: Arc<Schema>, values: I) -> std::result::Result<Self, RecordError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut record = Self::new(schema);
        for (name, value) in values {
            let name = name.as_ref();
            match record.set(name, value) {
                Err(RecordError::UnknownField(_)) => {
                    tracing::warn!(field = name, schema = %record.schema.name, "Ignoring unknown field");
                }
                other => other?,
            }
        }
        Ok(record)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Get a field value.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.schema.index_of(name).map(|i| self.values[i])
    }

    /// Set a field value, validating it against the field kind.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> std::result::Result<(), RecordError> {
        let index = self
            .schema
            .index_of(name)
            .ok_or_else(|| RecordError::UnknownField(name.to_string()))?;
        let kind = self.schema.fields[index].kind;
        self.values[index] = kind.check(name, value.into())?;
        Ok(())
    }

    /// Iterate `(name, value)` pairs in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Value)> + '_ {
        self.schema
            .fields
            .iter()
            .zip(self.values.iter())
            .map(|(f, v)| (f.name.as_str(), *v))
    }

    /// Copy every field of `other` into this record in one step.
    pub fn replace_all(&mut self, other: &SettingsRecord) -> std::result::Result<(), RecordError> {
        if other.schema.name != self.schema.name {
            return Err(RecordError::SchemaMismatch {
                schema: self.schema.name.clone(),
                other: other.schema.name.clone(),
            });
        }
        self.values.clone_from(&other.values);
        Ok(())
    }

    /// Fields whose values differ from `other`, as `(name, ours, theirs)`.
    pub fn diff<'a>(&'a self, other: &SettingsRecord) -> Vec<(&'a str, Value, Value)> {
        self.iter()
            .filter_map(|(name, ours)| match other.get(name) {
                Some(theirs) if theirs != ours => Some((name, ours, theirs)),
                _ => None,
            })
            .collect()
    }

    /// Flat name → value map, for export.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    /// Render as a TOML table of `field = value`.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string(&self.to_map()).context("Failed to render settings as TOML")?)
    }

    /// Render as a JSON object.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_map())
            .context("Failed to render settings as JSON")?)
    }

    /// Build from a TOML table; see [`SettingsRecord::from_values`].
    pub fn from_toml(schema: Arc<Schema>, content: &str) -> Result<Self> {
        let values: BTreeMap<String, Value> =
            toml::from_str(content).context("Failed to parse settings TOML")?;
        Ok(Self::from_values(schema, values)?)
    }

    /// Build from a JSON object; see [`SettingsRecord::from_values`].
    pub fn from_json(schema: Arc<Schema>, content: &str) -> Result<Self> {
        let values: BTreeMap<String, Value> =
            serde_json::from_str(content).context("Failed to parse settings JSON")?;
        Ok(Self::from_values(schema, values)?)
    }

    /// Serialize to the schema's fixed layout.
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.schema.packed_size()];
        let mut offset = 0;

        if let Some(magic) = self.schema.magic {
            buf[0] = magic;
            offset = 1;
        }

        for (field, value) in self.schema.fields.iter().zip(&self.values) {
            let slot = &mut buf[offset..offset + field.kind.width()];
            let int = value.as_int().unwrap_or_default();
            match field.kind {
                FieldKind::Bool => slot[0] = u8::from(value.as_bool().unwrap_or_default()),
                FieldKind::Uint8 => slot[0] = int as u8,
                FieldKind::Uint16 => BigEndian::write_u16(slot, int as u16),
                FieldKind::Int16 => BigEndian::write_i16(slot, int as i16),
                FieldKind::Uint32 => BigEndian::write_u32(slot, int as u32),
                FieldKind::Fix16 => {
                    let raw = value.as_f64().and_then(to_fix16).unwrap_or_default();
                    BigEndian::write_i32(slot, raw);
                }
            }
            offset += field.kind.width();
        }

        buf
    }

    /// Deserialize from the schema's fixed layout.
    ///
    /// A wrong length is a [`ProtocolError`]; a magic mismatch is an
    /// [`IntegrityError`].
    pub fn unpack(schema: Arc<Schema>, buf: &[u8]) -> Result<Self> {
        let expected = schema.packed_size();
        if buf.len() != expected {
            return Err(ProtocolError::LengthMismatch {
                expected,
                got: buf.len(),
            }
            .into());
        }

        let mut offset = 0;
        if let Some(magic) = schema.magic {
            if buf[0] != magic {
                return Err(IntegrityError {
                    schema: schema.name.clone(),
                    expected: magic,
                    got: buf[0],
                }
                .into());
            }
            offset = 1;
        }

        let mut values = Vec::with_capacity(schema.fields.len());
        for field in &schema.fields {
            let slot = &buf[offset..offset + field.kind.width()];
            let value = match field.kind {
                FieldKind::Bool => Value::Bool(slot[0] != 0),
                FieldKind::Uint8 => Value::Int(i64::from(slot[0])),
                FieldKind::Uint16 => Value::Int(i64::from(BigEndian::read_u16(slot))),
                FieldKind::Int16 => Value::Int(i64::from(BigEndian::read_i16(slot))),
                FieldKind::Uint32 => Value::Int(i64::from(BigEndian::read_u32(slot))),
                FieldKind::Fix16 => Value::Fix16(from_fix16(BigEndian::read_i32(slot))),
            };
            values.push(value);
            offset += field.kind.width();
        }

        Ok(Self { schema, values })
    }
}

impl PartialEq for SettingsRecord {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name == other.schema.name && self.values == other.values
    }
}

impl fmt::Display for SettingsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.schema.name)?;
        for (name, value) in self.iter() {
            writeln!(f, "  {name} = {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn v2() -> Arc<Schema> {
        Arc::new(preset("gemini-v2").unwrap())
    }

    #[test]
    fn test_defaults_pack_to_schema_size() {
        for name in PRESET_NAMES {
            let schema = Arc::new(preset(name).unwrap());
            let record = SettingsRecord::new(Arc::clone(&schema));
            assert_eq!(record.pack().len(), schema.packed_size());
        }
    }

    #[test]
    fn test_magic_leads_buffer() {
        let packed = SettingsRecord::new(v2()).pack();
        assert_eq!(packed[0], 0x63);
        // adc_gain_corr = 2048, big-endian
        assert_eq!(&packed[1..3], &[0x08, 0x00]);
    }

    #[test]
    fn test_record_round_trip() {
        let mut record = SettingsRecord::new(v2());
        record.set("adc_gain_corr", 2048i64).unwrap();
        record.set("adc_offset_corr", -17i64).unwrap();
        record.set("pitch_knob_nonlinearity", 0.6).unwrap();
        record.set("castor_knob_min", -3.25).unwrap();
        record.set("lfo_1_waveshape", 3i64).unwrap();
        record.set("castor_quantize", true).unwrap();

        let unpacked = SettingsRecord::unpack(v2(), &record.pack()).unwrap();
        assert_eq!(unpacked, record);

        let nonlinearity = unpacked.get("pitch_knob_nonlinearity").unwrap().as_f64().unwrap();
        assert!((nonlinearity - 0.6).abs() <= 1.0 / FIX16_ONE);
        assert_eq!(unpacked.get("adc_gain_corr"), Some(Value::Int(2048)));
        assert_eq!(unpacked.get("adc_offset_corr"), Some(Value::Int(-17)));
    }

    #[test]
    fn test_round_trip_without_magic() {
        let schema = Arc::new(preset("gemini-v3").unwrap());
        let mut record = SettingsRecord::new(Arc::clone(&schema));
        record.set("osc8m_freq", 8_000_123i64).unwrap();
        record.set("quantization_enabled", false).unwrap();
        let unpacked = SettingsRecord::unpack(schema, &record.pack()).unwrap();
        assert_eq!(unpacked, record);
    }

    #[test]
    fn test_corrupt_magic_is_integrity_error() {
        let mut packed = SettingsRecord::new(v2()).pack();
        packed[0] ^= 0x01;
        let result = SettingsRecord::unpack(v2(), &packed);
        assert!(matches!(
            result,
            Err(Error::Integrity(IntegrityError { expected: 0x63, got: 0x62, .. }))
        ));
    }

    #[test]
    fn test_wrong_length_is_protocol_error() {
        let packed = SettingsRecord::new(v2()).pack();
        let result = SettingsRecord::unpack(v2(), &packed[..packed.len() - 1]);
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::LengthMismatch { expected: 75, got: 74 }))
        ));
    }

    #[test]
    fn test_from_values_uses_defaults() {
        let record = SettingsRecord::from_values(
            v2(),
            [
                ("led_brightness", Value::Int(64)),
                ("no_such_field", Value::Int(1)),
            ],
        )
        .unwrap();
        assert_eq!(record.get("led_brightness"), Some(Value::Int(64)));
        assert_eq!(record.get("adc_gain_corr"), Some(Value::Int(2048)));
        assert_eq!(record.get("no_such_field"), None);
    }

    #[test]
    fn test_set_rejects_out_of_range() {
        let mut record = SettingsRecord::new(v2());
        assert!(matches!(
            record.set("lfo_1_waveshape", 256i64),
            Err(RecordError::OutOfRange { .. })
        ));
        assert!(matches!(
            record.set("missing", 1i64),
            Err(RecordError::UnknownField(_))
        ));
        assert_eq!(record.get("lfo_1_waveshape"), Some(Value::Int(0)));
    }

    #[test]
    fn test_toml_and_json_export() {
        let mut record = SettingsRecord::new(v2());
        record.set("led_brightness", 42i64).unwrap();
        record.set("castor_quantize", true).unwrap();
        record.set("chorus_max_intensity", 0.25).unwrap();

        let from_toml = SettingsRecord::from_toml(v2(), &record.to_toml().unwrap()).unwrap();
        assert_eq!(from_toml, record);

        let from_json = SettingsRecord::from_json(v2(), &record.to_json().unwrap()).unwrap();
        assert_eq!(from_json, record);
    }

    #[test]
    fn test_import_rejects_wrong_kind() {
        let result = SettingsRecord::from_toml(v2(), "led_brightness = 1.5\n");
        assert!(matches!(
            result,
            Err(Error::Record(RecordError::KindMismatch { .. }))
        ));
        assert!(SettingsRecord::from_json(v2(), "{ not json").is_err());
    }

    #[test]
    fn test_replace_all_and_diff() {
        let mut live = SettingsRecord::new(v2());
        let mut loaded = SettingsRecord::new(v2());
        loaded.set("led_brightness", 10i64).unwrap();

        let changes = live.diff(&loaded);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, "led_brightness");

        live.replace_all(&loaded).unwrap();
        assert_eq!(live, loaded);

        let other = SettingsRecord::new(Arc::new(preset("gemini-v1").unwrap()));
        assert!(matches!(
            live.replace_all(&other),
            Err(RecordError::SchemaMismatch { .. })
        ));
    }
}
