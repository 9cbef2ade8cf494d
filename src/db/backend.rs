//! SQL driver seam
//!
//! The manager talks to a database only through [`Connector`] and
//! [`SqlConnection`]. Values cross the seam as [`SqlValue`] parameters and
//! [`Row`] results.

use std::time::Duration;

use serde_json::Value;

use crate::common::error::BackendError;

/// A bound statement parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    /// Convert a JSON scalar (e.g. from a scenario file). Arrays and objects
    /// are bound as their JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// One result row; columns keep their select order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.columns.push((name.into(), value));
    }

    /// Builder-style push
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(name, value.into());
        self
    }

    /// Case-insensitive column lookup
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(column, _)| column.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Value of the first column
    pub fn first(&self) -> Option<&Value> {
        self.columns.first().map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.columns.iter().cloned().collect())
    }
}

/// A live database handle. Calls block the current thread.
pub trait SqlConnection: Send {
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, BackendError>;

    /// Returns the number of affected rows
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, BackendError>;

    /// Liveness probe; must give up after `timeout`
    fn ping(&mut self, timeout: Duration) -> Result<(), BackendError>;

    fn close(self: Box<Self>) -> Result<(), BackendError>;
}

/// Opens connections from a driver URL
pub trait Connector: Send + Sync {
    fn connect(&self, url: &str) -> Result<Box<dyn SqlConnection>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(SqlValue::from_json(&json!(null)), SqlValue::Null);
        assert_eq!(SqlValue::from_json(&json!(42)), SqlValue::Int(42));
        assert_eq!(SqlValue::from_json(&json!(1.5)), SqlValue::Float(1.5));
        assert_eq!(SqlValue::from_json(&json!("x")), SqlValue::Text("x".into()));
        assert_eq!(SqlValue::from_json(&json!([1])), SqlValue::Text("[1]".into()));
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
    }

    #[test]
    fn test_row_lookup() {
        let row = Row::new().with("COUNT(*)", 3).with("Name", "Jane");
        assert_eq!(row.first(), Some(&json!(3)));
        assert_eq!(row.get("name"), Some(&json!("Jane")));
        assert_eq!(row.to_json(), json!({"COUNT(*)": 3, "Name": "Jane"}));
    }
}
