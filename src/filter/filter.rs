use serde_json::Value;

use super::cursor::Cursor;
use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{Condition, FilterData, FilterOp, FilterOrderInfo, FilterWhereInfo};
use crate::schema::{FieldViolation, Fields, ResourceSchema, ValidationError};

/// A parsed, schema-checked query ready for a document store
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    pub condition: Condition,
    pub order: Vec<FilterOrderInfo>,
    pub cursor: Option<Cursor>,
    /// Maximum number of documents the store yields
    pub limit: Option<usize>,
}

impl DocumentQuery {
    /// Every live document, in insertion order
    pub fn all() -> Self {
        Self {
            condition: Condition::And(vec![]),
            order: vec![],
            cursor: None,
            limit: None,
        }
    }

    /// Live documents whose `field` equals `value`, in insertion order
    pub fn field_equals(field: impl Into<String>, value: Value) -> Self {
        Self {
            condition: Condition::Field(FilterWhereInfo {
                column: field.into(),
                operator: FilterOp::Eq,
                data: value,
            }),
            ..Self::all()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_cursor(mut self, cursor: Option<Cursor>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        self.condition.matches(fields)
    }

    pub fn is_insertion_ordered(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FilterOptions {
    pub max_nested_depth: usize,
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            max_nested_depth: 5,
            default_limit: 20,
            max_limit: 100,
        }
    }
}

/// Builds a `DocumentQuery` from client filter data for one resource schema
pub struct Filter<'a> {
    schema: &'a ResourceSchema,
    options: FilterOptions,
}

impl<'a> Filter<'a> {
    pub fn new(schema: &'a ResourceSchema, options: FilterOptions) -> Self {
        Self { schema, options }
    }

    /// Parse every part of `data`, reporting all problems together.
    /// Returns the query (fetching one extra document to detect a next page)
    /// and the page size.
    pub fn assign(&self, data: &FilterData) -> Result<(DocumentQuery, usize), ValidationError> {
        let mut violations = Vec::new();

        let condition = match &data.where_clause {
            Some(where_data) => FilterWhere::parse(where_data, self.schema, self.options.max_nested_depth)
                .unwrap_or_else(|e| {
                    violations.push(violation("where", e));
                    Condition::And(vec![])
                }),
            None => Condition::And(vec![]),
        };

        let order = match &data.order {
            Some(order) => FilterOrder::validate_and_parse(order, self.schema).unwrap_or_else(|e| {
                violations.push(violation("order", e));
                vec![]
            }),
            None => vec![],
        };

        let page_size = match self.page_size(data.limit) {
            Ok(size) => size,
            Err(e) => {
                violations.push(violation("limit", e));
                0
            }
        };

        let cursor = match data.cursor.as_deref().filter(|c| !c.is_empty()) {
            Some(token) => match Cursor::decode(token) {
                // A cursor only resumes the kind of ordering that produced it
                Ok(Cursor::After(_)) if !order.is_empty() => {
                    violations.push(violation("cursor", FilterError::InvalidCursor));
                    None
                }
                Ok(Cursor::Offset(_)) if order.is_empty() => {
                    violations.push(violation("cursor", FilterError::InvalidCursor));
                    None
                }
                Ok(cursor) => Some(cursor),
                Err(e) => {
                    violations.push(violation("cursor", e));
                    None
                }
            },
            None => None,
        };

        if !violations.is_empty() {
            return Err(ValidationError { violations });
        }

        let query = DocumentQuery {
            condition,
            order,
            cursor,
            limit: Some(page_size + 1),
        };
        Ok((query, page_size))
    }

    fn page_size(&self, limit: Option<u32>) -> Result<usize, FilterError> {
        let limit = limit.unwrap_or(self.options.default_limit);
        if limit == 0 {
            return Err(FilterError::InvalidLimit("limit must be at least 1".to_string()));
        }
        let applied = if limit > self.options.max_limit {
            tracing::debug!("Limit {} exceeds max {}, capping to max", limit, self.options.max_limit);
            self.options.max_limit
        } else {
            limit
        };
        Ok(applied as usize)
    }
}

fn violation(field: &str, err: FilterError) -> FieldViolation {
    FieldViolation::new(field, err.to_string())
}
