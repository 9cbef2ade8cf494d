//! Shared database connection manager
//!
//! One logical connection per process, created on first use and reused
//! until disconnected. The connection lives behind a mutex, so statements
//! from concurrent scenarios are serialized rather than interleaved on the
//! wire. Scenarios hold a [`DbLease`] for their duration; the connection is
//! closed when the last lease is released.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::backend::{Connector, Row, SqlConnection, SqlValue};
use super::dialect::{redact_url, DbSettings};
use crate::common::error::BackendError;
use crate::common::{Config, Error, Result};

#[derive(Default)]
struct State {
    conn: Option<Box<dyn SqlConnection>>,
    leases: usize,
}

pub struct ConnectionManager {
    settings: DbSettings,
    connector: Arc<dyn Connector>,
    state: Mutex<State>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("dialect", &self.settings.dialect)
            .field("host", &self.settings.host)
            .field("port", &self.settings.port)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    pub fn new(settings: DbSettings, connector: Arc<dyn Connector>) -> Self {
        Self {
            settings,
            connector,
            state: Mutex::new(State::default()),
        }
    }

    /// Manager backed by the sqlx driver
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = DbSettings::from_config(config)?;
        Ok(Self::new(settings, Arc::new(super::SqlxConnector::new())))
    }

    pub fn settings(&self) -> &DbSettings {
        &self.settings
    }

    // A panic inside a scenario body must not wedge the database for every
    // other worker; the state stays consistent across a poisoned lock.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self, state: &mut State) -> Result<()> {
        if state.conn.is_some() {
            return Ok(());
        }
        let url = self.settings.url()?;
        tracing::debug!(url = %redact_url(&url), "Opening database connection");
        let conn = self.connector.connect(&url).map_err(|e| Error::Connection {
            url: redact_url(&url),
            message: e.to_string(),
        })?;
        tracing::info!(
            dialect = %self.settings.dialect,
            host = %self.settings.host,
            "Database connection established"
        );
        state.conn = Some(conn);
        Ok(())
    }

    fn close(state: &mut State) {
        if let Some(conn) = state.conn.take() {
            match conn.close() {
                Ok(()) => tracing::info!("Database connection closed"),
                Err(e) => tracing::error!(error = %e, "Error closing database connection"),
            }
        }
    }

    /// Open the connection unless one is already open
    pub fn connect(&self) -> Result<()> {
        let mut state = self.lock();
        self.open(&mut state)
    }

    /// Close the connection if open. Close failures are logged, not returned.
    pub fn disconnect(&self) {
        let mut state = self.lock();
        Self::close(&mut state);
    }

    /// Whether a connection is open and answers a liveness probe within
    /// `db.probe.timeout`
    pub fn is_connected(&self) -> bool {
        let mut state = self.lock();
        let timeout = self.settings.probe_timeout;
        match state.conn.as_mut() {
            Some(conn) => match conn.ping(timeout) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "Database liveness probe failed");
                    false
                }
            },
            None => false,
        }
    }

    /// Take a lease on the shared connection, connecting if needed. A dead
    /// connection is replaced.
    pub fn acquire(self: &Arc<Self>) -> Result<DbLease> {
        let mut state = self.lock();
        let timeout = self.settings.probe_timeout;
        if let Some(conn) = state.conn.as_mut() {
            if let Err(e) = conn.ping(timeout) {
                tracing::warn!(error = %e, "Stale database connection, reconnecting");
                Self::close(&mut state);
            }
        }
        self.open(&mut state)?;
        state.leases += 1;
        tracing::debug!(leases = state.leases, "Database lease acquired");
        Ok(DbLease {
            manager: Arc::clone(self),
        })
    }

    /// Number of outstanding leases
    pub fn lease_count(&self) -> usize {
        self.lock().leases
    }

    fn release(&self) {
        let mut state = self.lock();
        state.leases = state.leases.saturating_sub(1);
        tracing::debug!(leases = state.leases, "Database lease released");
        if state.leases == 0 {
            Self::close(&mut state);
        }
    }

    fn with_conn<T>(
        &self,
        sql: &str,
        f: impl FnOnce(&mut dyn SqlConnection, &str) -> std::result::Result<T, BackendError>,
    ) -> Result<T> {
        let prepared = self.settings.dialect.prepare(sql);
        let mut state = self.lock();
        let conn = state.conn.as_mut().ok_or(Error::NotConnected)?;
        f(conn.as_mut(), &prepared).map_err(|e| {
            tracing::error!(sql, error = %e, "Database statement failed");
            Error::database(sql, e)
        })
    }

    /// Run a query and return every row
    pub fn execute_query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let rows = self.with_conn(sql, |conn, sql| conn.query(sql, params))?;
        tracing::debug!(sql, rows = rows.len(), "Query executed");
        Ok(rows)
    }

    /// Run a modifying statement and return the affected row count
    pub fn execute_update(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let affected = self.with_conn(sql, |conn, sql| conn.execute(sql, params))?;
        tracing::debug!(sql, affected, "Update executed");
        Ok(affected)
    }

    /// First column of the first row, or `None` when the query returns no rows
    pub fn get_single_value(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Value>> {
        let rows = self.execute_query(sql, params)?;
        Ok(rows.first().and_then(Row::first).cloned())
    }

    /// Whether `table` holds at least one row matching `predicate`
    ///
    /// `predicate` is a SQL boolean expression using `?` placeholders bound
    /// from `params`. The table name is validated as an identifier.
    pub fn record_exists(&self, table: &str, predicate: &str, params: &[SqlValue]) -> Result<bool> {
        validate_identifier(table)?;
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE {predicate}");
        let count = self.get_single_value(&sql, params)?;
        Ok(count.as_ref().map(count_value).unwrap_or(0) > 0)
    }
}

/// Keeps the shared connection open; released on drop
#[must_use = "the connection closes when the last lease is dropped"]
pub struct DbLease {
    manager: Arc<ConnectionManager>,
}

impl DbLease {
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }
}

impl std::ops::Deref for DbLease {
    type Target = ConnectionManager;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

impl Drop for DbLease {
    fn drop(&mut self) {
        self.manager.release();
    }
}

impl std::fmt::Debug for DbLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbLease").finish_non_exhaustive()
    }
}

fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    if valid {
        Ok(())
    } else {
        Err(Error::Assertion(format!("'{name}' is not a valid table name")))
    }
}

fn count_value(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock::MockDatabase;
    use crate::db::Dialect;
    use serde_json::json;
    use std::time::Duration;

    fn settings(dialect: Dialect) -> DbSettings {
        DbSettings {
            dialect,
            host: "localhost".to_string(),
            port: 3306,
            name: Some("app".to_string()),
            username: Some("qa".to_string()),
            password: Some("secret".to_string()),
            probe_timeout: Duration::from_secs(1),
        }
    }

    fn manager(db: &Arc<MockDatabase>, dialect: Dialect) -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::new(settings(dialect), db.connector()))
    }

    #[test]
    fn test_query_before_connect_fails() {
        let db = MockDatabase::new();
        let mgr = manager(&db, Dialect::MySql);
        assert!(matches!(
            mgr.execute_query("SELECT 1", &[]),
            Err(Error::NotConnected)
        ));
        assert!(!mgr.is_connected());
    }

    #[test]
    fn test_connect_is_idempotent() {
        let db = MockDatabase::new();
        let mgr = manager(&db, Dialect::MySql);
        mgr.connect().unwrap();
        mgr.connect().unwrap();
        assert_eq!(db.connects(), 1);
        assert!(mgr.is_connected());
        mgr.disconnect();
        assert!(!mgr.is_connected());
        assert_eq!(db.closes(), 1);
    }

    #[test]
    fn test_connect_failure_redacts_password() {
        let db = MockDatabase::new();
        db.fail_connect("access denied");
        let mgr = manager(&db, Dialect::MySql);
        match mgr.connect() {
            Err(Error::Connection { url, message }) => {
                assert!(!url.contains("secret"));
                assert_eq!(message, "access denied");
            }
            other => panic!("Expected Connection error, got {other:?}"),
        }
    }

    #[test]
    fn test_disconnect_suppresses_close_failure() {
        let db = MockDatabase::new();
        db.fail_close();
        let mgr = manager(&db, Dialect::MySql);
        mgr.connect().unwrap();
        mgr.disconnect();
        assert!(!mgr.is_connected());
        mgr.disconnect();
    }

    #[test]
    fn test_is_connected_false_when_probe_fails() {
        let db = MockDatabase::new();
        let mgr = manager(&db, Dialect::MySql);
        mgr.connect().unwrap();
        db.fail_ping(true);
        assert!(!mgr.is_connected());
    }

    #[test]
    fn test_last_lease_closes_connection() {
        let db = MockDatabase::new();
        let mgr = manager(&db, Dialect::MySql);
        let a = mgr.acquire().unwrap();
        let b = mgr.acquire().unwrap();
        assert_eq!(db.connects(), 1);
        assert_eq!(mgr.lease_count(), 2);

        drop(a);
        assert!(mgr.is_connected());
        drop(b);
        assert!(!mgr.is_connected());
        assert_eq!(db.closes(), 1);
    }

    #[test]
    fn test_acquire_replaces_dead_connection() {
        let db = MockDatabase::new();
        let mgr = manager(&db, Dialect::MySql);
        let _held = mgr.acquire().unwrap();
        db.fail_next_ping();
        let _second = mgr.acquire().unwrap();
        assert_eq!(db.connects(), 2);
    }

    #[test]
    fn test_record_exists_counts_rows() {
        let db = MockDatabase::new();
        db.on_query("FROM users", vec![Row::new().with("COUNT(*)", 1)]);
        db.on_query("FROM posts", vec![Row::new().with("count", "0")]);
        let mgr = manager(&db, Dialect::MySql);
        let lease = mgr.acquire().unwrap();

        assert!(lease
            .record_exists("users", "email = ?", &["jane@example.com".into()])
            .unwrap());
        assert!(!lease.record_exists("posts", "id = ?", &[1.into()]).unwrap());

        let statements = db.statements();
        assert_eq!(statements[0].0, "SELECT COUNT(*) FROM users WHERE email = ?");
        assert_eq!(statements[0].1, vec![SqlValue::Text("jane@example.com".into())]);
    }

    #[test]
    fn test_record_exists_rejects_bad_table_name() {
        let db = MockDatabase::new();
        let mgr = manager(&db, Dialect::MySql);
        mgr.connect().unwrap();
        assert!(mgr.record_exists("users; DROP TABLE users", "1 = 1", &[]).is_err());
        assert!(mgr.record_exists("app.users", "1 = 1", &[]).is_ok());
    }

    #[test]
    fn test_postgres_placeholders_rewritten() {
        let db = MockDatabase::new();
        let mgr = manager(&db, Dialect::Postgres);
        mgr.connect().unwrap();
        mgr.execute_update("UPDATE users SET name = ? WHERE id = ?", &["x".into(), 1.into()])
            .unwrap();
        assert_eq!(db.statements()[0].0, "UPDATE users SET name = $1 WHERE id = $2");
    }

    #[test]
    fn test_single_value_and_errors() {
        let db = MockDatabase::new();
        db.on_query("SELECT name", vec![Row::new().with("name", "Jane")]);
        db.on_query_fail("SELECT broken", "syntax error");
        let mgr = manager(&db, Dialect::MySql);
        mgr.connect().unwrap();

        assert_eq!(mgr.get_single_value("SELECT name FROM users", &[]).unwrap(), Some(json!("Jane")));
        assert_eq!(mgr.get_single_value("SELECT id FROM nothing", &[]).unwrap(), None);
        assert!(matches!(
            mgr.execute_query("SELECT broken", &[]),
            Err(Error::Database { .. })
        ));
    }

    #[test]
    fn test_concurrent_statements_are_serialized() {
        let db = MockDatabase::new();
        db.set_query_delay(Duration::from_millis(5));
        let mgr = manager(&db, Dialect::MySql);
        let lease = mgr.acquire().unwrap();

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..5 {
                        lease.execute_query("SELECT 1", &[]).unwrap();
                    }
                });
            }
        });

        assert_eq!(db.statements().len(), 40);
        assert_eq!(db.max_in_flight(), 1);
    }
}
