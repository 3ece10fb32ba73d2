use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::{Condition, FilterOp, FilterWhereInfo, SqlParam};
use crate::schema::{FieldType, FieldValue, Fields, ResourceSchema};

/// Parses WHERE clauses against a resource schema and renders them as SQL
/// over the JSONB `fields` column.
pub struct FilterWhere {
    param_values: Vec<SqlParam>,
    param_index: usize,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
        }
    }

    /// Parse a JSON WHERE clause. `null` and `{}` match every document.
    pub fn parse(
        where_data: &Value,
        schema: &ResourceSchema,
        max_depth: usize,
    ) -> Result<Condition, FilterError> {
        match where_data {
            Value::Null => Ok(Condition::And(vec![])),
            Value::Object(obj) => Self::parse_object(obj, schema, 0, max_depth),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn parse_object(
        obj: &Map<String, Value>,
        schema: &ResourceSchema,
        depth: usize,
        max_depth: usize,
    ) -> Result<Condition, FilterError> {
        if depth > max_depth {
            return Err(FilterError::TooDeep(max_depth));
        }

        let mut conditions = Vec::new();
        for (key, value) in obj {
            if key.starts_with('$') {
                conditions.push(Self::parse_logical_operator(key, value, schema, depth, max_depth)?);
            } else {
                Self::parse_field_condition(key, value, schema, &mut conditions)?;
            }
        }

        if conditions.len() == 1 {
            Ok(conditions.remove(0))
        } else {
            Ok(Condition::And(conditions))
        }
    }

    fn parse_logical_operator(
        op: &str,
        value: &Value,
        schema: &ResourceSchema,
        depth: usize,
        max_depth: usize,
    ) -> Result<Condition, FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                let mut parts = Vec::with_capacity(arr.len());
                for v in arr {
                    let sub = v.as_object().ok_or_else(|| {
                        FilterError::InvalidOperatorData(format!("{} elements must be objects", op))
                    })?;
                    parts.push(Self::parse_object(sub, schema, depth + 1, max_depth)?);
                }
                Ok(if op == "$and" { Condition::And(parts) } else { Condition::Or(parts) })
            }
            "$not" => {
                let sub = value
                    .as_object()
                    .ok_or_else(|| FilterError::InvalidOperatorData("$not requires object".to_string()))?;
                let inner = Self::parse_object(sub, schema, depth + 1, max_depth)?;
                Ok(Condition::Not(Box::new(inner)))
            }
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn parse_field_condition(
        field: &str,
        value: &Value,
        schema: &ResourceSchema,
        out: &mut Vec<Condition>,
    ) -> Result<(), FilterError> {
        validate_field_name(field, schema)?;
        let declared = schema.get(field).map(|spec| spec.field_type);

        if let Value::Object(obj) = value {
            for (op_key, op_val) in obj {
                let operator = FilterOp::parse(op_key)
                    .ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
                check_operator_data(field, declared, operator, op_val)?;
                out.push(Condition::Field(FilterWhereInfo {
                    column: field.to_string(),
                    operator,
                    data: op_val.clone(),
                }));
            }
        } else {
            // Implicit equality: { field: value }
            check_operator_data(field, declared, FilterOp::Eq, value)?;
            out.push(Condition::Field(FilterWhereInfo {
                column: field.to_string(),
                operator: FilterOp::Eq,
                data: value.clone(),
            }));
        }
        Ok(())
    }

    /// Render a parsed condition. Placeholders are numbered after
    /// `starting_param_index`.
    pub fn generate(condition: &Condition, starting_param_index: usize) -> (String, Vec<SqlParam>) {
        let mut filter_where = Self::new(starting_param_index);
        let sql = filter_where.build(condition);
        (sql, filter_where.param_values)
    }

    fn build(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::And(parts) if parts.is_empty() => "1=1".to_string(),
            Condition::Or(parts) if parts.is_empty() => "1=0".to_string(),
            Condition::And(parts) => self.join(parts, " AND "),
            Condition::Or(parts) => self.join(parts, " OR "),
            Condition::Not(inner) => format!("NOT ({})", self.build(inner)),
            Condition::Field(info) => self.build_sql_condition(info),
        }
    }

    fn join(&mut self, parts: &[Condition], joiner: &str) -> String {
        let sql: Vec<String> = parts.iter().map(|p| format!("({})", self.build(p))).collect();
        sql.join(joiner)
    }

    fn build_sql_condition(&mut self, info: &FilterWhereInfo) -> String {
        let key = self.param(SqlParam::Text(info.column.clone()));
        let column = format!("(fields -> {})", key);

        match info.operator {
            FilterOp::Eq if info.data.is_null() => {
                format!("({0} IS NULL OR {0} = 'null'::jsonb)", column)
            }
            FilterOp::Eq => format!("{} = {}", column, self.param(SqlParam::Json(info.data.clone()))),
            FilterOp::Ne if info.data.is_null() => {
                format!("({0} IS NOT NULL AND {0} <> 'null'::jsonb)", column)
            }
            FilterOp::Ne => format!(
                "{} IS DISTINCT FROM {}",
                column,
                self.param(SqlParam::Json(info.data.clone()))
            ),
            FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
                // jsonb orders across types; restrict to values of the same kind
                let kind = if info.data.is_number() { "number" } else { "string" };
                format!(
                    "(jsonb_typeof({0}) = '{1}' AND {0} {2} {3})",
                    column,
                    kind,
                    info.operator.sql_comparator(),
                    self.param(SqlParam::Json(info.data.clone()))
                )
            }
            FilterOp::Like => {
                let pattern = info.data.as_str().unwrap_or_default().to_string();
                format!("(fields ->> {}) LIKE {}", key, self.param(SqlParam::Text(pattern)))
            }
            FilterOp::In | FilterOp::NIn => {
                let values = info.data.as_array().cloned().unwrap_or_default();
                let negate = info.operator == FilterOp::NIn;
                if values.is_empty() {
                    return if negate { "1=1".to_string() } else { "1=0".to_string() };
                }
                let params: Vec<String> = values
                    .into_iter()
                    .map(|v| self.param(SqlParam::Json(v)))
                    .collect();
                if negate {
                    format!("({0} IS NULL OR {0} NOT IN ({1}))", column, params.join(", "))
                } else {
                    format!("{} IN ({})", column, params.join(", "))
                }
            }
            FilterOp::Exists => {
                if info.data.as_bool().unwrap_or(true) {
                    format!("jsonb_exists(fields, {})", key)
                } else {
                    format!("NOT jsonb_exists(fields, {})", key)
                }
            }
        }
    }

    fn param(&mut self, value: SqlParam) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

impl Condition {
    /// Evaluate against a document's fields, with the same semantics as the
    /// generated SQL.
    pub fn matches(&self, fields: &Fields) -> bool {
        match self {
            Condition::And(parts) => parts.iter().all(|p| p.matches(fields)),
            Condition::Or(parts) => parts.iter().any(|p| p.matches(fields)),
            Condition::Not(inner) => !inner.matches(fields),
            Condition::Field(info) => info.matches(fields.get(&info.column)),
        }
    }
}

impl FilterWhereInfo {
    fn matches(&self, actual: Option<&FieldValue>) -> bool {
        let actual = actual.map(FieldValue::to_json);
        let present_non_null = actual.as_ref().map_or(false, |a| !a.is_null());

        match self.operator {
            FilterOp::Eq if self.data.is_null() => !present_non_null,
            FilterOp::Eq => actual.as_ref().map_or(false, |a| json_eq(a, &self.data)),
            FilterOp::Ne if self.data.is_null() => present_non_null,
            FilterOp::Ne => !actual.as_ref().map_or(false, |a| json_eq(a, &self.data)),
            FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
                let Some(ordering) = actual.as_ref().and_then(|a| compare_same_kind(a, &self.data)) else {
                    return false;
                };
                match self.operator {
                    FilterOp::Gt => ordering.is_gt(),
                    FilterOp::Gte => ordering.is_ge(),
                    FilterOp::Lt => ordering.is_lt(),
                    _ => ordering.is_le(),
                }
            }
            FilterOp::Like => match (actual.as_ref(), self.data.as_str()) {
                (Some(Value::String(s)), Some(pattern)) => like_match(pattern, s),
                _ => false,
            },
            FilterOp::In => {
                let values = self.data.as_array().map(Vec::as_slice).unwrap_or_default();
                actual.as_ref().map_or(false, |a| values.iter().any(|v| json_eq(a, v)))
            }
            FilterOp::NIn => {
                let values = self.data.as_array().map(Vec::as_slice).unwrap_or_default();
                !actual.as_ref().map_or(false, |a| values.iter().any(|v| json_eq(a, v)))
            }
            FilterOp::Exists => actual.is_some() == self.data.as_bool().unwrap_or(true),
        }
    }
}

/// Same identifier rules as column names, and the schema must know the field
fn validate_field_name(name: &str, schema: &ResourceSchema) -> Result<(), FilterError> {
    let mut chars = name.chars();
    let valid_start = chars.next().map_or(false, |c| c.is_alphabetic() || c == '_');
    if !valid_start || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(FilterError::InvalidField(name.to_string()));
    }
    if !schema.knows(name) {
        return Err(FilterError::UnknownField(name.to_string()));
    }
    Ok(())
}

pub(crate) fn validate_order_field(name: &str, schema: &ResourceSchema) -> Result<(), FilterError> {
    validate_field_name(name, schema)
}

fn check_operator_data(
    field: &str,
    declared: Option<FieldType>,
    operator: FilterOp,
    data: &Value,
) -> Result<(), FilterError> {
    let invalid = |reason: &str| Err(FilterError::InvalidOperatorData(format!("{}: {}", field, reason)));

    match operator {
        FilterOp::Exists => {
            if !data.is_boolean() {
                return invalid("$exists requires true or false");
            }
        }
        FilterOp::In | FilterOp::NIn => {
            let Some(values) = data.as_array() else {
                return invalid("$in/$nin require an array");
            };
            if !values.iter().all(|v| compatible(declared, v)) {
                return invalid("array values do not match the field type");
            }
        }
        FilterOp::Like => {
            if !data.is_string() {
                return invalid("$like requires a string pattern");
            }
            if declared.map_or(false, |t| t != FieldType::String) {
                return invalid("$like only applies to string fields");
            }
        }
        op if op.is_range() => {
            if !(data.is_number() || data.is_string()) {
                return invalid("range operators require a number or string");
            }
            if !compatible(declared, data) {
                return invalid("value does not match the field type");
            }
        }
        _ => {
            if !data.is_null() && !compatible(declared, data) {
                return invalid("value does not match the field type");
            }
        }
    }
    Ok(())
}

fn compatible(declared: Option<FieldType>, value: &Value) -> bool {
    match (declared, value) {
        (None, _) => true,
        (Some(FieldType::String), Value::String(_)) => true,
        (Some(FieldType::Integer | FieldType::Number), Value::Number(_)) => true,
        (Some(FieldType::Boolean), Value::Bool(_)) => true,
        (Some(FieldType::Array), Value::Array(_)) => true,
        (Some(FieldType::Object), Value::Object(_)) => true,
        _ => false,
    }
}

/// Equality with numeric comparison across integer/float representations
pub(crate) fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare_same_kind(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// SQL LIKE: `%` matches any run, `_` one character, `\` escapes
fn like_match(pattern: &str, text: &str) -> bool {
    #[derive(Clone, Copy)]
    enum Token {
        Any,
        One,
        Lit(char),
    }

    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => Token::Any,
            '_' => Token::One,
            '\\' => Token::Lit(chars.next().unwrap_or('\\')),
            other => Token::Lit(other),
        });
    }

    let text: Vec<char> = text.chars().collect();
    // reachable[j]: the tokens consumed so far can match text[..j]
    let mut reachable = vec![false; text.len() + 1];
    reachable[0] = true;
    for token in tokens {
        let mut next = vec![false; text.len() + 1];
        match token {
            Token::Any => {
                let mut seen = false;
                for j in 0..=text.len() {
                    seen |= reachable[j];
                    next[j] = seen;
                }
            }
            Token::One => {
                for j in 0..text.len() {
                    next[j + 1] = reachable[j];
                }
            }
            Token::Lit(c) => {
                for j in 0..text.len() {
                    next[j + 1] = reachable[j] && text[j] == c;
                }
            }
        }
        reachable = next;
    }
    reachable[text.len()]
}
