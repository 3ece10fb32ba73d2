use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::filter::FilterData;
use crate::schema::{FieldViolation, ValidationError, BODY_FIELD};

/// Query-string form of a find: `where` and `order` are JSON-encoded
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
    pub order: Option<String>,
    pub limit: Option<String>,
    pub cursor: Option<String>,
}

impl ListQuery {
    pub fn into_filter_data(self) -> Result<FilterData, ValidationError> {
        let mut violations = Vec::new();

        let where_clause = match self.where_clause.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => serde_json::from_str::<Value>(raw).map(Some).unwrap_or_else(|_| {
                violations.push(FieldViolation::new("where", "must be JSON"));
                None
            }),
            None => None,
        };

        // Either JSON (`["name", "-order"]`) or a bare sort spec (`order desc`)
        let order = self
            .order
            .filter(|s| !s.trim().is_empty())
            .map(|raw| serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw)));

        let limit = match self.limit.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => raw.parse::<u32>().map(Some).unwrap_or_else(|_| {
                violations.push(FieldViolation::new("limit", "must be a non-negative integer"));
                None
            }),
            None => None,
        };

        if !violations.is_empty() {
            return Err(ValidationError { violations });
        }
        Ok(FilterData {
            where_clause,
            order,
            limit,
            cursor: self.cursor,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RevisionQuery {
    pub revision: Option<String>,
}

/// A body that is not JSON is a validation failure on the body itself
pub fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ValidationError> {
    body.map(|Json(value)| value)
        .map_err(|e| ValidationError::single(BODY_FIELD, e.body_text()))
}
