use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use super::error::FilterError;

/// Opaque pagination position handed back to clients as `nextCursor`.
///
/// Insertion-ordered queries resume after the last sequence number seen, so
/// documents inserted while paging do not shift later pages. Queries with an
/// explicit sort resume by offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    After(i64),
    Offset(u64),
}

impl Cursor {
    pub fn encode(&self) -> String {
        let raw = match self {
            Cursor::After(seq) => format!("a:{}", seq),
            Cursor::Offset(offset) => format!("o:{}", offset),
        };
        URL_SAFE_NO_PAD.encode(raw)
    }

    pub fn decode(token: &str) -> Result<Self, FilterError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| FilterError::InvalidCursor)?;
        let raw = String::from_utf8(bytes).map_err(|_| FilterError::InvalidCursor)?;
        let (kind, value) = raw.split_once(':').ok_or(FilterError::InvalidCursor)?;
        match kind {
            "a" => value.parse().map(Cursor::After).map_err(|_| FilterError::InvalidCursor),
            // Offsets are bound as BIGINT, so they must fit an i64
            "o" => value
                .parse::<i64>()
                .ok()
                .and_then(|n| u64::try_from(n).ok())
                .map(Cursor::Offset)
                .ok_or(FilterError::InvalidCursor),
            _ => Err(FilterError::InvalidCursor),
        }
    }

    pub fn offset(&self) -> u64 {
        match self {
            Cursor::Offset(offset) => *offset,
            Cursor::After(_) => 0,
        }
    }
}
