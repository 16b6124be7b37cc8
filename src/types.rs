use chrono::NaiveDateTime;
use serde::Deserialize;

/// Values that can be stored in a database row or used as query parameters.
///
/// The same enum is shared across backends so the store helpers never need
/// to branch on driver types:
/// ```rust
/// use query_manager::types::RowValues;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
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
    pub fn as_int(&self) -> Option<i64> {
        if let RowValues::Int(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    /// Integer narrowed to `i32`, clamping out-of-range values. The clamp is
    /// logged by callers that care; most columns are well inside range.
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        self.as_int().map(|v| {
            if let Ok(narrow) = i32::try_from(v) {
                narrow
            } else if v < 0 {
                i32::MIN
            } else {
                i32::MAX
            }
        })
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
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RowValues::Bool(value) => Some(*value),
            RowValues::Int(0) => Some(false),
            RowValues::Int(1) => Some(true),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S.%3f") {
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

/// The database backend the workers connect to. Selecting a backend
/// whose feature was not compiled in fails at session open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `SQLite` database
    Sqlite,
    /// `PostgreSQL` database
    Postgres,
    /// `MySQL` database
    Mysql,
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DatabaseType::Sqlite => "SQLite",
            DatabaseType::Postgres => "PostgreSQL",
            DatabaseType::Mysql => "MySQL",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_narrowing_clamps() {
        assert_eq!(RowValues::Int(42).as_i32(), Some(42));
        assert_eq!(RowValues::Int(i64::MAX).as_i32(), Some(i32::MAX));
        assert_eq!(RowValues::Int(i64::MIN).as_i32(), Some(i32::MIN));
    }

    #[test]
    fn bool_accepts_integer_forms() {
        assert_eq!(RowValues::Int(1).as_bool(), Some(true));
        assert_eq!(RowValues::Int(0).as_bool(), Some(false));
        assert_eq!(RowValues::Int(2).as_bool(), None);
    }

    #[test]
    fn timestamp_parses_text_forms() {
        let v = RowValues::Text("2024-05-01 12:30:00".into());
        assert!(v.as_timestamp().is_some());
    }
}
