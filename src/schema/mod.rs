// Schema declarations and payload validation

pub mod types;
pub mod validator;
pub mod value;

pub use types::{FieldSpec, FieldType, ResourceSchema, SchemaError, SYSTEM_FIELDS};
pub use validator::{validate, FieldViolation, ValidationError, ValidationMode, BODY_FIELD};
pub use value::{fields_to_json, FieldValue, Fields, ValidatedPayload};
