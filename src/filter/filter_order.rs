use serde_json::Value;
use std::cmp::Ordering;

use super::error::FilterError;
use super::filter_where::validate_order_field;
use super::types::{FilterOrderInfo, SortDirection, SqlParam};
use crate::schema::{FieldValue, Fields, ResourceSchema};

pub struct FilterOrder;

impl FilterOrder {
    pub fn validate_and_parse(
        order: &Value,
        schema: &ResourceSchema,
    ) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let infos = match order {
            Value::Null => vec![],
            Value::String(s) => Self::parse_order_string(s)?,
            Value::Array(arr) => {
                // Expect array of strings like ["created desc", "name asc"]
                let mut out = Vec::new();
                for v in arr {
                    let s = v
                        .as_str()
                        .ok_or_else(|| FilterError::InvalidOrder("order entries must be strings".to_string()))?;
                    out.extend(Self::parse_order_string(s)?);
                }
                out
            }
            Value::Object(obj) => {
                // { "order": "desc", "name": "asc" }
                let mut out = Vec::new();
                for (k, v) in obj {
                    let sort = Self::parse_direction(v.as_str().unwrap_or("asc"))?;
                    out.push(FilterOrderInfo { column: k.clone(), sort });
                }
                out
            }
            _ => return Err(FilterError::InvalidOrder("unsupported order format".to_string())),
        };

        for info in &infos {
            validate_order_field(&info.column, schema)?;
        }
        Ok(infos)
    }

    fn parse_order_string(s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        // split on commas, then each token into column and direction
        let mut out = Vec::new();
        for part in s.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut it = trimmed.split_whitespace();
            if let Some(col) = it.next() {
                let sort = Self::parse_direction(it.next().unwrap_or("asc"))?;
                if it.next().is_some() {
                    return Err(FilterError::InvalidOrder(trimmed.to_string()));
                }
                out.push(FilterOrderInfo { column: col.to_string(), sort });
            }
        }
        Ok(out)
    }

    fn parse_direction(dir: &str) -> Result<SortDirection, FilterError> {
        if dir.eq_ignore_ascii_case("asc") {
            Ok(SortDirection::Asc)
        } else if dir.eq_ignore_ascii_case("desc") {
            Ok(SortDirection::Desc)
        } else {
            Err(FilterError::InvalidOrder(format!("unknown direction '{}'", dir)))
        }
    }

    /// ORDER BY over JSONB keys, always ending with the insertion sequence so
    /// pages are stable. Absent keys sort last in both directions.
    pub fn generate(infos: &[FilterOrderInfo], starting_param_index: usize) -> (String, Vec<SqlParam>) {
        let mut params = Vec::new();
        let mut parts = Vec::new();
        for (i, info) in infos.iter().enumerate() {
            params.push(SqlParam::Text(info.column.clone()));
            parts.push(format!(
                "(fields -> ${}) {} NULLS LAST",
                starting_param_index + i + 1,
                info.sort.to_sql()
            ));
        }
        parts.push("seq ASC".to_string());
        (format!("ORDER BY {}", parts.join(", ")), params)
    }

    /// In-memory counterpart of `generate`, following jsonb ordering:
    /// null < string < number < boolean < array < object.
    pub fn compare(infos: &[FilterOrderInfo], a: &Fields, b: &Fields) -> Ordering {
        for info in infos {
            let ordering = match (a.get(&info.column), b.get(&info.column)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(x), Some(y)) => {
                    let o = compare_values(x, y);
                    match info.sort {
                        SortDirection::Asc => o,
                        SortDirection::Desc => o.reverse(),
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

fn rank(v: &FieldValue) -> u8 {
    match v {
        FieldValue::Null => 0,
        FieldValue::Text(_) => 1,
        FieldValue::Integer(_) | FieldValue::Number(_) => 2,
        FieldValue::Bool(_) => 3,
        FieldValue::List(_) => 4,
        FieldValue::Object(_) => 5,
    }
}

fn as_f64(v: &FieldValue) -> Option<f64> {
    match v {
        FieldValue::Integer(i) => Some(*i as f64),
        FieldValue::Number(n) => Some(*n),
        _ => None,
    }
}

fn compare_values(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a, b) {
        (FieldValue::Text(x), FieldValue::Text(y)) => x.cmp(y),
        (FieldValue::Bool(x), FieldValue::Bool(y)) => x.cmp(y),
        (FieldValue::List(x), FieldValue::List(y)) => x.len().cmp(&y.len()),
        (FieldValue::Object(x), FieldValue::Object(y)) => x.len().cmp(&y.len()),
        _ => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => rank(a).cmp(&rank(b)),
        },
    }
}
