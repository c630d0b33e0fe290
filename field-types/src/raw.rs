//! The field collection returned by the request/response channel.
//!
//! Each entry is a single-name object plus the encoding string:
//!
//! ```text
//! { "description": "...", "fields": [ { "rate": 12, "o": "number;rw;mn=0;mx=100" } ] }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::FieldError;

/// Key holding the encoding string inside a raw field entry.
pub const ENCODING_KEY: &str = "o";

/// One entry of a fetched field collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct RawField {
    /// Field name.
    pub name: String,
    /// Initial value as fetched.
    pub value: Value,
    /// Encoding string (empty when the entry has no `o`).
    pub encoding: String,
}

impl RawField {
    /// Create a raw field.
    pub fn new(name: impl Into<String>, value: Value, encoding: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            encoding: encoding.into(),
        }
    }
}

impl TryFrom<Value> for RawField {
    type Error = FieldError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut obj) = value else {
            return Err(FieldError::InvalidRawField(format!(
                "expected object, got {value}"
            )));
        };

        let encoding = match obj.remove(ENCODING_KEY) {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        // The first non-encoding key names the field.
        let name = obj
            .keys()
            .next()
            .cloned()
            .ok_or_else(|| FieldError::InvalidRawField("entry has no field name".into()))?;
        let value = obj.remove(&name).unwrap_or(Value::Null);

        Ok(Self {
            name,
            value,
            encoding,
        })
    }
}

impl From<RawField> for Value {
    fn from(field: RawField) -> Self {
        let mut obj = serde_json::Map::new();
        obj.insert(field.name, field.value);
        obj.insert(ENCODING_KEY.to_string(), Value::String(field.encoding));
        Value::Object(obj)
    }
}

/// A fetched form: description plus its raw fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormData {
    /// Free-form description shown above the fields.
    #[serde(default)]
    pub description: String,
    /// The raw field entries, in display order.
    #[serde(default)]
    pub fields: Vec<RawField>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_name_value_and_encoding() {
        let raw = RawField::try_from(json!({"rate": 12, "o": "number;rw"})).unwrap();
        assert_eq!(raw.name, "rate");
        assert_eq!(raw.value, json!(12));
        assert_eq!(raw.encoding, "number;rw");
    }

    #[test]
    fn name_may_follow_encoding_key() {
        let raw = RawField::try_from(json!({"o": "switch", "led": "1"})).unwrap();
        assert_eq!(raw.name, "led");
        assert_eq!(raw.value, json!("1"));
    }

    #[test]
    fn missing_encoding_is_empty() {
        let raw = RawField::try_from(json!({"ssid": "home"})).unwrap();
        assert_eq!(raw.encoding, "");
    }

    #[test]
    fn rejects_entries_without_name() {
        assert!(RawField::try_from(json!({"o": "text"})).is_err());
        assert!(RawField::try_from(json!(["rate", 1])).is_err());
    }

    #[test]
    fn form_data_deserializes() {
        let form: FormData = serde_json::from_value(json!({
            "description": "Light",
            "fields": [
                {"led": true, "o": "switch;rw"},
                {"level": 40, "o": "slider;rw;mn=0;mx=100;st=5"}
            ]
        }))
        .unwrap();
        assert_eq!(form.description, "Light");
        assert_eq!(form.fields.len(), 2);
        assert_eq!(form.fields[1].name, "level");
    }
}
