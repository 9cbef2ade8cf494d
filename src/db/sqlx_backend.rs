//! sqlx driver for MySQL and PostgreSQL
//!
//! sqlx is async; the harness is not. The connector owns a small tokio
//! runtime, built on first connect, and drives each statement to
//! completion with `block_on`.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde_json::Value;
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyConnection, Column, Connection, Row as _};
use tokio::runtime::Runtime;

use super::backend::{Connector, Row, SqlConnection, SqlValue};
use crate::common::error::BackendError;

#[derive(Default)]
pub struct SqlxConnector {
    runtime: OnceCell<Arc<Runtime>>,
}

impl SqlxConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn runtime(&self) -> Result<Arc<Runtime>, BackendError> {
        self.runtime
            .get_or_try_init(|| {
                sqlx::any::install_default_drivers();
                tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name("harness-sql")
                    .enable_all()
                    .build()
                    .map(Arc::new)
            })
            .map(Arc::clone)
            .map_err(Into::into)
    }
}

impl Connector for SqlxConnector {
    fn connect(&self, url: &str) -> Result<Box<dyn SqlConnection>, BackendError> {
        let runtime = self.runtime()?;
        let conn = runtime.block_on(AnyConnection::connect(url))?;
        Ok(Box::new(SqlxConnection { conn, runtime }))
    }
}

struct SqlxConnection {
    conn: AnyConnection,
    runtime: Arc<Runtime>,
}

impl SqlConnection for SqlxConnection {
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, BackendError> {
        let conn = &mut self.conn;
        let rows = self
            .runtime
            .block_on(async move { bind_all(sqlx::query(sql), params).fetch_all(conn).await })?;
        Ok(rows.iter().map(decode_row).collect())
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, BackendError> {
        let conn = &mut self.conn;
        let done = self
            .runtime
            .block_on(async move { bind_all(sqlx::query(sql), params).execute(conn).await })?;
        Ok(done.rows_affected())
    }

    fn ping(&mut self, timeout: Duration) -> Result<(), BackendError> {
        let conn = &mut self.conn;
        self.runtime
            .block_on(async move { tokio::time::timeout(timeout, conn.ping()).await })
            .map_err(|_| format!("liveness probe timed out after {}s", timeout.as_secs()))??;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), BackendError> {
        let SqlxConnection { conn, runtime } = *self;
        runtime.block_on(conn.close())?;
        Ok(())
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    params: &[SqlValue],
) -> Query<'q, Any, AnyArguments<'q>> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.clone()),
        };
    }
    query
}

fn decode_row(row: &AnyRow) -> Row {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        out.push(column.name(), decode_value(row, idx));
    }
    out
}

// The Any driver erases column types; try the common ones in turn.
fn decode_value(row: &AnyRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(Some(bytes)) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return Value::from(String::from_utf8_lossy(&bytes).into_owned());
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_scheme_fails_without_network() {
        let connector = SqlxConnector::new();
        let err = match connector.connect("nosuchdb://localhost/app") {
            Ok(_) => panic!("Expected connect to fail"),
            Err(e) => e,
        };
        assert!(!err.to_string().is_empty());

        // The runtime is built once and reused for later connects
        let first = connector.runtime().unwrap();
        let second = connector.runtime().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
