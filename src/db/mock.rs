//! In-memory database double
//!
//! Replies to queries by substring match, records every statement, and
//! counts connects and closes. Used by unit tests and the integration
//! suite in place of a live server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::backend::{Connector, Row, SqlConnection, SqlValue};
use crate::common::error::BackendError;

#[derive(Clone)]
enum Reply {
    Rows(Vec<Row>),
    Fail(String),
}

#[derive(Default)]
struct State {
    replies: Vec<(String, Reply)>,
    statements: Vec<(String, Vec<SqlValue>)>,
    connects: usize,
    closes: usize,
    fail_connect: Option<String>,
    fail_ping: bool,
    fail_next_ping: bool,
    fail_close: bool,
    affected: u64,
    query_delay: Option<Duration>,
}

#[derive(Default)]
pub struct MockDatabase {
    state: Mutex<State>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connector(self: &Arc<Self>) -> Arc<dyn Connector> {
        Arc::new(MockConnector {
            db: Arc::clone(self),
        })
    }

    /// Reply with `rows` to statements containing `fragment`; latest wins
    pub fn on_query(&self, fragment: &str, rows: Vec<Row>) -> &Self {
        self.lock().replies.push((fragment.to_string(), Reply::Rows(rows)));
        self
    }

    pub fn on_query_fail(&self, fragment: &str, message: &str) -> &Self {
        self.lock()
            .replies
            .push((fragment.to_string(), Reply::Fail(message.to_string())));
        self
    }

    pub fn set_affected_rows(&self, affected: u64) {
        self.lock().affected = affected;
    }

    pub fn set_query_delay(&self, delay: Duration) {
        self.lock().query_delay = Some(delay);
    }

    pub fn fail_connect(&self, message: &str) {
        self.lock().fail_connect = Some(message.to_string());
    }

    pub fn fail_ping(&self, fail: bool) {
        self.lock().fail_ping = fail;
    }

    pub fn fail_next_ping(&self) {
        self.lock().fail_next_ping = true;
    }

    pub fn fail_close(&self) {
        self.lock().fail_close = true;
    }

    pub fn statements(&self) -> Vec<(String, Vec<SqlValue>)> {
        self.lock().statements.clone()
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Connections opened and not yet closed
    pub fn open_connections(&self) -> usize {
        let state = self.lock();
        state.connects - state.closes
    }

    /// Highest number of statements ever executing at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn run(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, BackendError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let (reply, delay) = {
            let mut state = self.lock();
            state.statements.push((sql.to_string(), params.to_vec()));
            let reply = state
                .replies
                .iter()
                .rev()
                .find(|(fragment, _)| sql.contains(fragment.as_str()))
                .map(|(_, reply)| reply.clone());
            (reply, state.query_delay)
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match reply {
            Some(Reply::Rows(rows)) => Ok(rows),
            Some(Reply::Fail(message)) => Err(message.into()),
            None => Ok(Vec::new()),
        }
    }
}

struct MockConnector {
    db: Arc<MockDatabase>,
}

impl Connector for MockConnector {
    fn connect(&self, _url: &str) -> Result<Box<dyn SqlConnection>, BackendError> {
        let mut state = self.db.lock();
        if let Some(message) = &state.fail_connect {
            return Err(message.clone().into());
        }
        state.connects += 1;
        Ok(Box::new(MockConnection {
            db: Arc::clone(&self.db),
        }))
    }
}

struct MockConnection {
    db: Arc<MockDatabase>,
}

impl SqlConnection for MockConnection {
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, BackendError> {
        self.db.run(sql, params)
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, BackendError> {
        self.db.run(sql, params)?;
        Ok(self.db.lock().affected)
    }

    fn ping(&mut self, _timeout: Duration) -> Result<(), BackendError> {
        let mut state = self.db.lock();
        if state.fail_next_ping {
            state.fail_next_ping = false;
            return Err("connection reset".into());
        }
        if state.fail_ping {
            return Err("probe timed out".into());
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), BackendError> {
        let mut state = self.db.lock();
        state.closes += 1;
        if state.fail_close {
            return Err("close failed".into());
        }
        Ok(())
    }
}
