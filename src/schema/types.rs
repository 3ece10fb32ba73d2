use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// System attributes carried by every document; never accepted as payload fields
pub const SYSTEM_FIELDS: &[&str] = &[
    "id",
    "revision",
    "owner",
    "created_at",
    "updated_at",
    "deleted_at",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }

    /// Whether `min`/`max` apply to this type
    pub fn is_bounded(&self) -> bool {
        !matches!(self, FieldType::Boolean)
    }
}

/// Declaration of one field in a resource schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub nullable: bool,
    /// Numeric lower bound, or minimum length for strings and arrays
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    /// Applied on create when the field is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(skip)]
    pub(crate) compiled_pattern: Option<Regex>,
}

impl FieldSpec {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            nullable: false,
            min: None,
            max: None,
            pattern: None,
            enum_values: None,
            default: None,
            compiled_pattern: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Field '{0}' is a reserved system field")]
    ReservedField(String),

    #[error("Field '{field}': invalid pattern: {reason}")]
    InvalidPattern { field: String, reason: String },

    #[error("Field '{field}': {reason}")]
    InvalidConstraint { field: String, reason: String },

    #[error("Field '{field}': default value is invalid: {reason}")]
    InvalidDefault { field: String, reason: String },
}

/// Declared shape of a resource's documents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSchema {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
    /// Accept fields the schema does not declare
    #[serde(default)]
    pub allow_extra: bool,
}

impl ResourceSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    pub fn allow_extra(mut self) -> Self {
        self.allow_extra = true;
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// Whether `name` may appear in a payload or a filter
    pub fn knows(&self, name: &str) -> bool {
        self.allow_extra || self.fields.contains_key(name)
    }

    /// Check the declarations and compile patterns. Must run before the
    /// schema is used for validation.
    pub fn compile(mut self) -> Result<Self, SchemaError> {
        for (name, spec) in self.fields.iter_mut() {
            if SYSTEM_FIELDS.contains(&name.as_str()) {
                return Err(SchemaError::ReservedField(name.clone()));
            }

            if let (Some(min), Some(max)) = (spec.min, spec.max) {
                if min > max {
                    return Err(SchemaError::InvalidConstraint {
                        field: name.clone(),
                        reason: format!("min {} is greater than max {}", min, max),
                    });
                }
            }
            if (spec.min.is_some() || spec.max.is_some()) && !spec.field_type.is_bounded() {
                return Err(SchemaError::InvalidConstraint {
                    field: name.clone(),
                    reason: format!("min/max do not apply to {}", spec.field_type.as_str()),
                });
            }

            if let Some(pattern) = &spec.pattern {
                if spec.field_type != FieldType::String {
                    return Err(SchemaError::InvalidConstraint {
                        field: name.clone(),
                        reason: "pattern only applies to string fields".to_string(),
                    });
                }
                let re = Regex::new(pattern).map_err(|e| SchemaError::InvalidPattern {
                    field: name.clone(),
                    reason: e.to_string(),
                })?;
                spec.compiled_pattern = Some(re);
            }
        }

        // Defaults must satisfy their own field declaration
        for (name, spec) in &self.fields {
            if let Some(default) = &spec.default {
                let mut violations = Vec::new();
                super::validator::check_value(name, spec, default, &mut violations);
                if let Some(v) = violations.into_iter().next() {
                    return Err(SchemaError::InvalidDefault {
                        field: name.clone(),
                        reason: v.reason,
                    });
                }
            }
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_yaml_declaration() {
        let yaml = r#"
fields:
  subdomain:
    type: string
    required: true
    min: 3
    max: 30
    pattern: "^[a-zA-Z0-9]+$"
  status:
    type: string
    enum: [active, unpublished]
    default: unpublished
allow_extra: false
"#;
        let schema: ResourceSchema = serde_yaml::from_str(yaml).unwrap();
        let schema = schema.compile().unwrap();
        let sub = schema.get("subdomain").unwrap();
        assert!(sub.required);
        assert!(sub.compiled_pattern.is_some());
        assert_eq!(schema.get("status").unwrap().default, Some(json!("unpublished")));
    }

    #[test]
    fn rejects_reserved_field_names() {
        let schema = ResourceSchema::new().field("revision", FieldSpec::new(FieldType::Integer));
        assert!(matches!(schema.compile(), Err(SchemaError::ReservedField(_))));
    }

    #[test]
    fn rejects_bad_pattern() {
        let schema =
            ResourceSchema::new().field("name", FieldSpec::new(FieldType::String).pattern("(unclosed"));
        assert!(matches!(schema.compile(), Err(SchemaError::InvalidPattern { .. })));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let schema =
            ResourceSchema::new().field("order", FieldSpec::new(FieldType::Integer).min(10.0).max(1.0));
        assert!(matches!(schema.compile(), Err(SchemaError::InvalidConstraint { .. })));
    }

    #[test]
    fn rejects_default_outside_enum() {
        let schema = ResourceSchema::new().field(
            "status",
            FieldSpec::new(FieldType::String)
                .one_of(vec![json!("active")])
                .default_value(json!("draft")),
        );
        assert!(matches!(schema.compile(), Err(SchemaError::InvalidDefault { .. })));
    }
}
