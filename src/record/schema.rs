//! Record schemas: ordered field descriptors plus an optional magic byte.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::field::{FieldDescriptor, FieldKind, Value};
use crate::error::{Error, RecordError, Result};

/// An ordered field layout for one firmware generation.
///
/// The field order defines the wire layout. Schemas are plain data so the
/// same pack/unpack machinery serves every version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Schema name (e.g. "gemini-v2").
    pub name: String,

    /// Leading integrity byte, if the layout has one.
    #[serde(default)]
    pub magic: Option<u8>,

    /// Fields in wire order.
    #[serde(rename = "field")]
    pub fields: Vec<FieldDescriptor>,
}

impl Schema {
    /// Build and validate a schema.
    pub fn new(
        name: impl Into<String>,
        magic: Option<u8>,
        fields: Vec<FieldDescriptor>,
    ) -> std::result::Result<Self, RecordError> {
        let schema = Self {
            name: name.into(),
            magic,
            fields,
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Load a schema from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read schema: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse a schema from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let schema: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse schema: {e}")))?;
        schema.validate()?;
        Ok(schema)
    }

    /// Render the schema as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize schema: {e}")))
    }

    /// Check names are unique and defaults fit their kinds.
    pub fn validate(&self) -> std::result::Result<(), RecordError> {
        if self.fields.is_empty() {
            return Err(RecordError::InvalidSchema(format!(
                "{} has no fields",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(RecordError::InvalidSchema(format!(
                    "{} declares {} twice",
                    self.name, field.name
                )));
            }
            field.kind.check(&field.name, field.default)?;
        }

        Ok(())
    }

    /// Packed size in bytes, magic included.
    pub fn packed_size(&self) -> usize {
        usize::from(self.magic.is_some()) + self.fields.iter().map(|f| f.kind.width()).sum::<usize>()
    }

    /// Position of a field by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Default values in field order, fix16 values quantized.
    pub fn defaults(&self) -> Vec<Value> {
        self.fields
            .iter()
            .map(|f| f.kind.check(&f.name, f.default).unwrap_or(f.default))
            .collect()
    }

    /// Byte offset of each field within the packed buffer.
    pub fn layout(&self) -> Vec<(usize, &FieldDescriptor)> {
        let mut offset = usize::from(self.magic.is_some());
        self.fields
            .iter()
            .map(|f| {
                let at = offset;
                offset += f.kind.width();
                (at, f)
            })
            .collect()
    }
}

/// Shorthand used by the built-in presets.
pub(crate) fn field(name: &str, kind: FieldKind, default: impl Into<Value>) -> FieldDescriptor {
    FieldDescriptor::new(name, kind, default)
}
