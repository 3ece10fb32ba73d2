use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "$eq")] Eq,
    #[serde(rename = "$ne")] Ne,
    #[serde(rename = "$gt")] Gt,
    #[serde(rename = "$gte")] Gte,
    #[serde(rename = "$lt")] Lt,
    #[serde(rename = "$lte")] Lte,
    #[serde(rename = "$like")] Like,
    #[serde(rename = "$in")] In,
    #[serde(rename = "$nin")] NIn,
    #[serde(rename = "$exists")] Exists,
}

impl FilterOp {
    pub fn parse(op_key: &str) -> Option<Self> {
        Some(match op_key {
            "$eq" => FilterOp::Eq,
            "$ne" | "$neq" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$like" => FilterOp::Like,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::NIn,
            "$exists" => FilterOp::Exists,
            _ => return None,
        })
    }

    pub fn is_range(&self) -> bool {
        matches!(self, FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte)
    }

    pub fn sql_comparator(&self) -> &'static str {
        match self {
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            _ => "=",
        }
    }
}

/// Query parameters as they arrive from a client (query string or find body)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterData {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// One field predicate of a parsed WHERE clause
#[derive(Debug, Clone, PartialEq)]
pub struct FilterWhereInfo {
    pub column: String,
    pub operator: FilterOp,
    pub data: Value,
}

/// Parsed WHERE clause
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Field(FilterWhereInfo),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOrderInfo {
    pub column: String,
    pub sort: SortDirection,
}

/// Bind parameter produced by SQL generation
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Json(Value),
    BigInt(i64),
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<SqlParam>,
}
