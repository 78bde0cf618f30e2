//! Record model descriptors
//!
//! A [`Model`] is shared by every collection and view in a chain as an
//! `Arc<Model>`; views report the model of the collection at the root.

use crate::error::{ModelError, Result};
use crate::value::FieldValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Field name to value mapping held by a record
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Declared type of a model field, controlling raw value conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Auto,
    String,
    Int,
    Float,
    Bool,
}

impl FieldKind {
    /// Convert a raw JSON value into this field type.
    ///
    /// Conversion is loose in the way form and wire data usually is:
    /// numeric strings parse, integers truncate floats, booleans accept
    /// `"true"`, `"yes"`, `"on"` and non-zero numbers. An empty string is
    /// null for numeric fields.
    pub fn convert(self, field: &str, raw: &Value) -> Result<FieldValue> {
        if raw.is_null() {
            return Ok(FieldValue::Null);
        }

        let invalid = |expected: &'static str| ModelError::InvalidValue {
            field: field.to_string(),
            expected,
            found: raw.to_string(),
        };

        match self {
            FieldKind::Auto => {
                FieldValue::from_json(raw).ok_or_else(|| invalid("a scalar"))
            }
            FieldKind::String => match raw {
                Value::String(s) => Ok(FieldValue::Str(s.clone())),
                Value::Number(n) => Ok(FieldValue::Str(n.to_string())),
                Value::Bool(b) => Ok(FieldValue::Str(b.to_string())),
                _ => Err(invalid("a string")),
            },
            FieldKind::Int => match raw {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                    .map(FieldValue::Int)
                    .ok_or_else(|| invalid("an integer")),
                Value::String(s) if s.trim().is_empty() => Ok(FieldValue::Null),
                Value::String(s) => {
                    let s = s.trim();
                    s.parse::<i64>()
                        .ok()
                        .or_else(|| {
                            s.parse::<f64>().ok().map(|f| f.trunc() as i64)
                        })
                        .map(FieldValue::Int)
                        .ok_or_else(|| invalid("an integer"))
                }
                Value::Bool(b) => Ok(FieldValue::Int(i64::from(*b))),
                _ => Err(invalid("an integer")),
            },
            FieldKind::Float => match raw {
                Value::Number(n) => n
                    .as_f64()
                    .map(FieldValue::Float)
                    .ok_or_else(|| invalid("a number")),
                Value::String(s) if s.trim().is_empty() => Ok(FieldValue::Null),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(FieldValue::Float)
                    .map_err(|_| invalid("a number")),
                Value::Bool(b) => {
                    Ok(FieldValue::Float(if *b { 1.0 } else { 0.0 }))
                }
                _ => Err(invalid("a number")),
            },
            FieldKind::Bool => match raw {
                Value::Bool(b) => Ok(FieldValue::Bool(*b)),
                Value::Number(n) => {
                    Ok(FieldValue::Bool(n.as_f64().is_some_and(|f| f != 0.0)))
                }
                Value::String(s) => {
                    let s = s.trim().to_ascii_lowercase();
                    Ok(FieldValue::Bool(matches!(
                        s.as_str(),
                        "true" | "1" | "yes" | "on"
                    )))
                }
                _ => Err(invalid("a boolean")),
            },
        }
    }
}

/// A declared field of a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,

    #[serde(default, rename = "type")]
    pub kind: FieldKind,

    /// Value used when raw data omits the field or carries null
    #[serde(default)]
    pub default: FieldValue,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: FieldValue::Null,
        }
    }

    pub fn with_default(mut self, default: impl Into<FieldValue>) -> Self {
        self.default = default.into();
        self
    }
}

/// Identity key of a record, unique within a backing collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordKey {
    Int(i64),
    Str(String),
}

impl RecordKey {
    /// Identity derived from a field value; null has none
    pub fn from_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Null => None,
            FieldValue::Int(i) => Some(RecordKey::Int(*i)),
            FieldValue::Float(f) if f.fract() == 0.0 && f.is_finite() => {
                Some(RecordKey::Int(*f as i64))
            }
            FieldValue::Str(s) => Some(RecordKey::Str(s.clone())),
            other => Some(RecordKey::Str(other.to_string())),
        }
    }

    pub fn to_value(&self) -> FieldValue {
        match self {
            RecordKey::Int(i) => FieldValue::Int(*i),
            RecordKey::Str(s) => FieldValue::Str(s.clone()),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Int(i) => write!(f, "{i}"),
            RecordKey::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for RecordKey {
    fn from(value: &str) -> Self {
        RecordKey::Str(value.to_string())
    }
}

impl From<i64> for RecordKey {
    fn from(value: i64) -> Self {
        RecordKey::Int(value)
    }
}

fn default_id_property() -> String {
    "id".to_string()
}

/// Descriptor of a record type
#[derive(Debug, Serialize, Deserialize)]
pub struct Model {
    pub name: String,

    /// Field holding each record's identity key
    #[serde(default = "default_id_property")]
    pub id_property: String,

    #[serde(default)]
    pub fields: Vec<FieldDef>,

    #[serde(skip)]
    phantom_seq: AtomicU64,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_property: default_id_property(),
            fields: Vec::new(),
            phantom_seq: AtomicU64::new(0),
        }
    }

    pub fn with_id_property(mut self, id_property: impl Into<String>) -> Self {
        self.id_property = id_property.into();
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDef::new(name, kind));
        self
    }

    pub fn with_field_def(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|def| def.name == name)
    }

    /// Declared kind of a field; undeclared fields convert as `Auto`
    pub fn kind_of(&self, name: &str) -> FieldKind {
        self.field(name).map(|def| def.kind).unwrap_or_default()
    }

    /// Convert a single value for `field` through its declared kind
    pub fn convert_field(
        &self,
        field: &str,
        value: &FieldValue,
    ) -> Result<FieldValue> {
        let converted = self.kind_of(field).convert(field, &value.to_json())?;
        if converted.is_null()
            && let Some(def) = self.field(field)
        {
            return Ok(def.default.clone());
        }
        Ok(converted)
    }

    /// Convert a raw JSON object into a typed field map.
    ///
    /// Declared fields come first and pick up their defaults; any extra raw
    /// keys are kept with `Auto` conversion.
    pub fn convert_row(&self, raw: &Value) -> Result<FieldMap> {
        let obj = raw.as_object().ok_or_else(|| ModelError::NotAnObject {
            model: self.name.clone(),
            found: raw.to_string(),
        })?;

        let mut data = FieldMap::new();
        for def in &self.fields {
            let value = match obj.get(&def.name) {
                Some(raw_value) => def.kind.convert(&def.name, raw_value)?,
                None => FieldValue::Null,
            };
            let value = if value.is_null() {
                def.default.clone()
            } else {
                value
            };
            data.insert(def.name.clone(), value);
        }

        for (name, raw_value) in obj {
            if !data.contains_key(name) {
                let value = FieldKind::Auto.convert(name, raw_value)?;
                data.insert(name.clone(), value);
            }
        }

        Ok(data)
    }

    /// Identity key carried by `data`, if any
    pub fn identity_of(&self, data: &FieldMap) -> Option<RecordKey> {
        data.get(&self.id_property).and_then(RecordKey::from_value)
    }

    /// Generate a key for a record created without an identity
    pub fn next_phantom_key(&self) -> RecordKey {
        let seq = self.phantom_seq.fetch_add(1, Ordering::Relaxed) + 1;
        RecordKey::Str(format!("{}-{}", self.name, seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_model() -> Model {
        Model::new("User")
            .with_id_property("email")
            .with_field("name", FieldKind::String)
            .with_field("email", FieldKind::String)
            .with_field("age", FieldKind::Int)
            .with_field("old", FieldKind::Bool)
            .with_field_def(
                FieldDef::new("group", FieldKind::String).with_default("none"),
            )
    }

    #[test]
    fn convert_row_applies_declared_types() {
        let model = user_model();
        let data = model
            .convert_row(&json!({
                "name": "Ed Spencer",
                "email": "ed@sencha.com",
                "age": "25",
                "old": "yes",
                "extra": 1.5
            }))
            .unwrap();

        assert_eq!(data["age"], FieldValue::Int(25));
        assert_eq!(data["old"], FieldValue::Bool(true));
        assert_eq!(data["group"], FieldValue::from("none"));
        assert_eq!(data["extra"], FieldValue::Float(1.5));
        assert_eq!(
            model.identity_of(&data),
            Some(RecordKey::from("ed@sencha.com"))
        );
    }

    #[test]
    fn convert_row_rejects_bad_values() {
        let model = user_model();
        let err = model
            .convert_row(&json!({"email": "x", "age": "old"}))
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidValue { ref field, .. } if field == "age"));

        let err = model.convert_row(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, ModelError::NotAnObject { .. }));
    }

    #[test]
    fn int_kind_truncates_and_treats_empty_as_null() {
        assert_eq!(
            FieldKind::Int.convert("n", &json!(4.9)).unwrap(),
            FieldValue::Int(4)
        );
        assert_eq!(
            FieldKind::Int.convert("n", &json!("")).unwrap(),
            FieldValue::Null
        );
    }

    #[test]
    fn phantom_keys_are_sequential_per_model() {
        let model = user_model();
        assert_eq!(model.next_phantom_key(), RecordKey::from("User-1"));
        assert_eq!(model.next_phantom_key(), RecordKey::from("User-2"));
    }

    #[test]
    fn model_deserializes_from_config_shape() {
        let model: Model = serde_json::from_value(json!({
            "name": "User",
            "id_property": "email",
            "fields": [
                {"name": "age", "type": "int"},
                {"name": "group", "type": "string", "default": "code"}
            ]
        }))
        .unwrap();

        assert_eq!(model.kind_of("age"), FieldKind::Int);
        assert_eq!(model.kind_of("missing"), FieldKind::Auto);
        assert_eq!(model.field("group").unwrap().default, FieldValue::from("code"));
    }
}
