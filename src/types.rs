use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

/// Values that can be stored in a database row or used as query parameters.
///
/// The same enum is used by every backend so callers never branch on driver types:
/// ```rust
/// use sql_slot_pool::prelude::*;
///
/// let mut params = QueryParams::new();
/// params.insert("id".into(), RowValues::Int(1));
/// params.insert("name".into(), RowValues::Text("alice".into()));
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            // SET DATEFORMAT ymd makes the server hand back this shape
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

/// Plain JSON rendering used by the result document: timestamps become
/// `YYYY-MM-DD HH:MM:SS[.fff]` strings and blobs become byte arrays.
impl Serialize for RowValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowValues::Int(i) => serializer.serialize_i64(*i),
            RowValues::Float(f) => serializer.serialize_f64(*f),
            RowValues::Text(s) => serializer.serialize_str(s),
            RowValues::Bool(b) => serializer.serialize_bool(*b),
            RowValues::Timestamp(dt) => {
                serializer.serialize_str(&dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())
            }
            RowValues::Null => serializer.serialize_unit(),
            RowValues::JSON(value) => value.serialize(serializer),
            RowValues::Blob(bytes) => bytes.serialize(serializer),
        }
    }
}

/// Named query parameters, referenced in SQL as `:name`.
pub type QueryParams = BTreeMap<String, RowValues>;

/// The SQL dialect spoken by the configured backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// SQL Server
    Mssql,
    /// `SQLite`
    Sqlite,
}

impl Dialect {
    /// Statements run on every new connection before it is handed out.
    #[must_use]
    pub fn default_session_statements(self) -> Vec<String> {
        match self {
            Dialect::Mssql => vec!["SET DATEFORMAT ymd".to_string()],
            Dialect::Sqlite => Vec::new(),
        }
    }

    /// Port used when none is configured.
    #[must_use]
    pub fn default_port(self) -> Option<u16> {
        match self {
            Dialect::Mssql => Some(1433),
            Dialect::Sqlite => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_to_plain_json() {
        let ts = NaiveDateTime::parse_from_str("2024-03-01 10:20:30", "%Y-%m-%d %H:%M:%S").unwrap();
        let values = vec![
            RowValues::Int(7),
            RowValues::Text("gold".into()),
            RowValues::Null,
            RowValues::Timestamp(ts),
            RowValues::Bool(false),
        ];
        assert_eq!(
            serde_json::to_value(&values).unwrap(),
            json!([7, "gold", null, "2024-03-01 10:20:30", false])
        );
    }

    #[test]
    fn timestamp_parses_ymd_text() {
        let v = RowValues::Text("2023-12-31 23:59:59.250".into());
        assert!(v.as_timestamp().is_some());
        assert!(RowValues::Text("31/12/2023".into()).as_timestamp().is_none());
    }

    #[test]
    fn bool_accepts_bit_integers() {
        assert_eq!(RowValues::Int(1).as_bool(), Some(&true));
        assert_eq!(RowValues::Int(0).as_bool(), Some(&false));
        assert_eq!(RowValues::Int(2).as_bool(), None);
    }
}
