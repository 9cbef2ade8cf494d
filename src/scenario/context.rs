//! Per-scenario state
//!
//! Created when a scenario starts and dropped when its after hooks finish.
//! Nothing in here is shared between scenarios.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::Value;

use super::coordinator::{ScenarioInfo, ScenarioStatus};
use crate::common::{Error, Result};
use crate::db::DbLease;
use crate::http::Response;

#[derive(Debug)]
pub struct ScenarioContext {
    info: ScenarioInfo,
    status: ScenarioStatus,
    started: Instant,
    last_response: Option<Response>,
    last_request: Option<Value>,
    created: Option<(String, Value)>,
    db: Option<DbLease>,
    perf_started: Option<Instant>,
    result_artifact: Option<PathBuf>,
}

impl ScenarioContext {
    pub fn new(info: ScenarioInfo) -> Self {
        Self {
            info,
            status: ScenarioStatus::Pending,
            started: Instant::now(),
            last_response: None,
            last_request: None,
            created: None,
            db: None,
            perf_started: None,
            result_artifact: None,
        }
    }

    pub fn info(&self) -> &ScenarioInfo {
        &self.info
    }

    /// `Pending` until the coordinator starts the scenario, then `Running`
    /// through hooks and body, then the outcome during after hooks
    pub fn status(&self) -> ScenarioStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: ScenarioStatus) {
        self.status = status;
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn set_response(&mut self, response: Response) {
        self.last_response = Some(response);
    }

    pub fn last_response(&self) -> Option<&Response> {
        self.last_response.as_ref()
    }

    /// The last response, or an assertion error naming what needed it
    pub fn require_response(&self) -> Result<&Response> {
        self.last_response
            .as_ref()
            .ok_or_else(|| Error::Assertion("no request has been sent in this scenario".to_string()))
    }

    pub fn set_last_request(&mut self, body: Value) {
        self.last_request = Some(body);
    }

    pub fn last_request(&self) -> Option<&Value> {
        self.last_request.as_ref()
    }

    /// Remember the entity created by the latest create step
    pub fn record_created(&mut self, kind: &str, entity: Value) {
        self.created = Some((kind.to_string(), entity));
    }

    pub fn created(&self) -> Option<&Value> {
        self.created.as_ref().map(|(_, entity)| entity)
    }

    pub fn created_kind(&self) -> Option<&str> {
        self.created.as_ref().map(|(kind, _)| kind.as_str())
    }

    pub fn created_id(&self) -> Option<i64> {
        self.created().and_then(|e| e.get("id")).and_then(Value::as_i64)
    }

    pub fn attach_db(&mut self, lease: DbLease) {
        self.db = Some(lease);
    }

    /// Hand the lease back; dropping it releases the connection
    pub fn release_db(&mut self) -> Option<DbLease> {
        self.db.take()
    }

    pub fn db(&self) -> Result<&DbLease> {
        self.db.as_ref().ok_or(Error::NotConnected)
    }

    pub fn mark_perf_start(&mut self) {
        self.perf_started = Some(Instant::now());
    }

    pub fn perf_elapsed(&self) -> Option<Duration> {
        self.perf_started.map(|start| start.elapsed())
    }

    pub fn set_result_artifact(&mut self, path: PathBuf) {
        self.result_artifact = Some(path);
    }

    pub fn result_artifact(&self) -> Option<&Path> {
        self.result_artifact.as_deref()
    }
}
