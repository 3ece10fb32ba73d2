use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Invalid field name: {0}")]
    InvalidField(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Invalid WHERE clause: {0}")]
    InvalidWhereClause(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Invalid operator data: {0}")]
    InvalidOperatorData(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    #[error("Invalid cursor")]
    InvalidCursor,

    #[error("Filter nesting exceeds maximum depth of {0}")]
    TooDeep(usize),
}
