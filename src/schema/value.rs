use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Field name to typed value, the only shape stored documents carry
pub type Fields = BTreeMap<String, FieldValue>;

/// A single validated field value.
///
/// Top-level document fields are always one of these variants; nested array
/// elements and object members stay as JSON since the schema only types the
/// outer field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    List(Vec<Value>),
    Object(Map<String, Value>),
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Integer(_) => "integer",
            FieldValue::Number(_) => "number",
            FieldValue::Text(_) => "string",
            FieldValue::List(_) => "array",
            FieldValue::Object(_) => "object",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::List(items) => Value::Array(items.clone()),
            FieldValue::Object(map) => Value::Object(map.clone()),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FieldValue::Text(s),
            Value::Array(items) => FieldValue::List(items),
            Value::Object(map) => FieldValue::Object(map),
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(FieldValue::from)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// Convert typed fields back into a JSON object (for JSONB storage and filters)
pub fn fields_to_json(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Payload that passed schema validation. Only the validator constructs these.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPayload {
    fields: Fields,
}

impl ValidatedPayload {
    pub(crate) fn new(fields: Fields) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integers_and_floats_are_distinguished() {
        assert_eq!(FieldValue::from(json!(3)), FieldValue::Integer(3));
        assert_eq!(FieldValue::from(json!(3.5)), FieldValue::Number(3.5));
    }

    #[test]
    fn serializes_untagged() {
        let mut fields = Fields::new();
        fields.insert("name".into(), FieldValue::from("a"));
        fields.insert("order".into(), FieldValue::Integer(2));
        fields.insert("image".into(), FieldValue::Null);
        let v = serde_json::to_value(&fields).unwrap();
        assert_eq!(v, json!({ "name": "a", "order": 2, "image": null }));
        assert_eq!(fields_to_json(&fields), v);
    }

    #[test]
    fn deserializes_from_stored_json() {
        let fields: Fields =
            serde_json::from_value(json!({ "tags": ["x"], "meta": { "k": 1 }, "ok": true })).unwrap();
        assert_eq!(fields["tags"], FieldValue::List(vec![json!("x")]));
        assert_eq!(fields["ok"], FieldValue::Bool(true));
        assert_eq!(fields["meta"].type_name(), "object");
    }
}
