use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::types::{FieldSpec, FieldType, ResourceSchema, SYSTEM_FIELDS};
use super::value::{FieldValue, Fields, ValidatedPayload};

/// Pseudo field name used for violations about the payload as a whole
pub const BODY_FIELD: &str = "$body";

/// What a payload is being validated for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Full document: required fields must be present, defaults are applied
    Create,
    /// Partial update: only supplied fields are checked
    Patch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Every violation found in one validation pass
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{} field violation(s)", .violations.len())]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation::new(field, reason)],
        }
    }

    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }
}

/// Validate `payload` against `schema`, collecting all violations.
pub fn validate(
    schema: &ResourceSchema,
    payload: &Value,
    mode: ValidationMode,
) -> Result<ValidatedPayload, ValidationError> {
    let Value::Object(map) = payload else {
        return Err(ValidationError::single(BODY_FIELD, "expected a JSON object"));
    };

    let mut violations = Vec::new();
    let mut fields = Fields::new();

    for (name, value) in map {
        if SYSTEM_FIELDS.contains(&name.as_str()) {
            violations.push(FieldViolation::new(name, "reserved system field"));
            continue;
        }

        match schema.get(name) {
            Some(spec) => {
                if let Some(checked) = check_value(name, spec, value, &mut violations) {
                    fields.insert(name.clone(), checked);
                }
            }
            None if schema.allow_extra => {
                fields.insert(name.clone(), FieldValue::from(value.clone()));
            }
            None => violations.push(FieldViolation::new(name, "unknown field")),
        }
    }

    if mode == ValidationMode::Create {
        for (name, spec) in &schema.fields {
            if map.contains_key(name) {
                continue;
            }
            if let Some(default) = &spec.default {
                fields.insert(name.clone(), FieldValue::from(default.clone()));
            } else if spec.required {
                violations.push(FieldViolation::new(name, "is required"));
            }
        }
    }

    if violations.is_empty() {
        Ok(ValidatedPayload::new(fields))
    } else {
        Err(ValidationError { violations })
    }
}

/// Check a single value against its declaration. Pushes every violation it
/// finds and returns the typed value only when there were none.
pub(crate) fn check_value(
    name: &str,
    spec: &FieldSpec,
    value: &Value,
    violations: &mut Vec<FieldViolation>,
) -> Option<FieldValue> {
    if value.is_null() {
        if spec.nullable {
            return Some(FieldValue::Null);
        }
        violations.push(FieldViolation::new(name, "must not be null"));
        return None;
    }

    let before = violations.len();

    let size = match (spec.field_type, value) {
        (FieldType::String, Value::String(s)) => {
            if let Some(re) = &spec.compiled_pattern {
                if !re.is_match(s) {
                    violations.push(FieldViolation::new(
                        name,
                        format!("must match pattern {}", re.as_str()),
                    ));
                }
            }
            Some(s.chars().count() as f64)
        }
        (FieldType::Integer, Value::Number(n)) if n.is_i64() => n.as_f64(),
        (FieldType::Integer, Value::Number(n)) if n.is_u64() => {
            violations.push(FieldViolation::new(name, "must fit in a signed 64-bit integer"));
            return None;
        }
        (FieldType::Number, Value::Number(n)) => n.as_f64(),
        (FieldType::Boolean, Value::Bool(_)) => None,
        (FieldType::Array, Value::Array(items)) => Some(items.len() as f64),
        (FieldType::Object, Value::Object(members)) => Some(members.len() as f64),
        (expected, other) => {
            violations.push(FieldViolation::new(
                name,
                format!("expected {}, got {}", expected.as_str(), json_type_name(other)),
            ));
            return None;
        }
    };

    if let Some(size) = size {
        check_bounds(name, spec, size, violations);
    }

    if let Some(allowed) = &spec.enum_values {
        if !allowed.contains(value) {
            let listed: Vec<String> = allowed.iter().map(Value::to_string).collect();
            violations.push(FieldViolation::new(
                name,
                format!("must be one of [{}]", listed.join(", ")),
            ));
        }
    }

    (violations.len() == before).then(|| FieldValue::from(value.clone()))
}

fn check_bounds(name: &str, spec: &FieldSpec, size: f64, violations: &mut Vec<FieldViolation>) {
    let unit = match spec.field_type {
        FieldType::String => " characters",
        FieldType::Array => " items",
        FieldType::Object => " members",
        _ => "",
    };
    let (low, high) = match spec.field_type {
        FieldType::Integer | FieldType::Number => ("must be at least", "must be at most"),
        _ => ("must have at least", "must have at most"),
    };

    if let Some(min) = spec.min {
        if size < min {
            violations.push(FieldViolation::new(name, format!("{} {}{}", low, min, unit)));
        }
    }
    if let Some(max) = spec.max {
        if size > max {
            violations.push(FieldViolation::new(name, format!("{} {}{}", high, max, unit)));
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
