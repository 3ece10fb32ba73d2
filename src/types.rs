/// Shared types used across the codebase

use serde::{Deserialize, Serialize};

/// Operation kinds a request can perform on a resource.
/// Used by the mediator gates, the policy rules, and the HTTP method mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Query,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Query => "query",
        }
    }

    /// Operations that target an existing document by id
    pub fn targets_document(&self) -> bool {
        matches!(self, Operation::Read | Operation::Update | Operation::Delete)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
