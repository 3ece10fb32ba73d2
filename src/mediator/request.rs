use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::Credential;
use crate::filter::{DocumentQuery, Filter, FilterData, FilterOptions};
use crate::resources::Resource;
use crate::schema::{validate, FieldViolation, ValidatedPayload, ValidationError, ValidationMode};
use crate::types::Operation;

/// Transport-independent inbound request
#[derive(Debug, Clone)]
pub struct MediatorRequest {
    pub operation: Operation,
    pub resource: String,
    pub id: Option<String>,
    /// Expected revision for update and delete, as presented
    pub revision: Option<String>,
    pub filter: FilterData,
    pub payload: Option<Value>,
    pub credential: Credential,
}

impl MediatorRequest {
    pub fn new(operation: Operation, resource: impl Into<String>, credential: Credential) -> Self {
        Self {
            operation,
            resource: resource.into(),
            id: None,
            revision: None,
            filter: FilterData::default(),
            payload: None,
            credential,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_revision(mut self, revision: impl ToString) -> Self {
        self.revision = Some(revision.to_string());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_filter(mut self, filter: FilterData) -> Self {
        self.filter = filter;
        self
    }
}

/// What a validated request will do to the store
#[derive(Debug, Clone)]
pub(crate) enum Action {
    Create(ValidatedPayload),
    Read(Uuid),
    Update { id: Uuid, revision: u64, patch: ValidatedPayload },
    Delete { id: Uuid, revision: u64 },
    Query { query: DocumentQuery, page_size: usize },
}

impl Action {
    pub(crate) fn target(&self) -> Option<Uuid> {
        match self {
            Action::Read(id) | Action::Update { id, .. } | Action::Delete { id, .. } => Some(*id),
            Action::Create(_) | Action::Query { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ValidatedRequest {
    pub resource: Arc<Resource>,
    pub operation: Operation,
    pub action: Action,
}

/// Check everything that can be checked without knowing the caller,
/// reporting every violation together.
pub(crate) fn validate_request(
    request: &MediatorRequest,
    resource: Arc<Resource>,
    filter_options: &FilterOptions,
) -> Result<ValidatedRequest, ValidationError> {
    let mut violations = Vec::new();
    let operation = request.operation;

    let id = if operation.targets_document() {
        match request.id.as_deref().map(Uuid::parse_str) {
            Some(Ok(id)) => Some(id),
            Some(Err(_)) => {
                violations.push(FieldViolation::new("id", "must be a UUID"));
                None
            }
            None => {
                violations.push(FieldViolation::new("id", "is required"));
                None
            }
        }
    } else {
        None
    };

    let revision = if matches!(operation, Operation::Update | Operation::Delete) {
        match request.revision.as_deref().map(parse_revision) {
            Some(Some(revision)) => Some(revision),
            Some(None) => {
                violations.push(FieldViolation::new("revision", "must be a positive integer"));
                None
            }
            None => {
                violations.push(FieldViolation::new("revision", "is required"));
                None
            }
        }
    } else {
        None
    };

    let payload = match operation {
        Operation::Create | Operation::Update => {
            let mode = if operation == Operation::Create {
                ValidationMode::Create
            } else {
                ValidationMode::Patch
            };
            let body = request.payload.as_ref().unwrap_or(&Value::Null);
            match validate(&resource.schema, body, mode) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    violations.extend(e.violations);
                    None
                }
            }
        }
        _ => None,
    };

    let query = if operation == Operation::Query {
        match Filter::new(&resource.schema, filter_options.clone()).assign(&request.filter) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                violations.extend(e.violations);
                None
            }
        }
    } else {
        None
    };

    if !violations.is_empty() {
        return Err(ValidationError { violations });
    }

    let action = match (operation, id, revision, payload, query) {
        (Operation::Create, _, _, Some(payload), _) => Action::Create(payload),
        (Operation::Read, Some(id), _, _, _) => Action::Read(id),
        (Operation::Update, Some(id), Some(revision), Some(patch), _) => Action::Update { id, revision, patch },
        (Operation::Delete, Some(id), Some(revision), _, _) => Action::Delete { id, revision },
        (Operation::Query, _, _, _, Some((query, page_size))) => Action::Query { query, page_size },
        _ => return Err(ValidationError::single("$request", "incomplete request")),
    };

    Ok(ValidatedRequest {
        resource,
        operation,
        action,
    })
}

/// Accepts `3`, `"3"` and `W/"3"` (the `If-Match` forms)
fn parse_revision(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let raw = raw.strip_prefix("W/").unwrap_or(raw);
    let raw = raw.trim_matches('"');
    raw.parse::<u64>().ok().filter(|r| *r >= 1)
}
