//! Lifecycle hooks
//!
//! Base hooks apply to every scenario. Tagged hooks apply when their
//! [`TagExpr`] matches the scenario's tags. Registration order is run order
//! for before hooks; after hooks run in reverse.

use std::sync::Arc;

use serde_json::json;

use super::context::ScenarioContext;
use super::coordinator::{Outcome, ScenarioInfo};
use super::tags::{self, TagExpr};
use crate::artifact::ArtifactStore;
use crate::common::{Error, Result};
use crate::db::ConnectionManager;

pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    /// Setup. An error fails the scenario and skips its body.
    fn before(&self, _info: &ScenarioInfo, _ctx: &mut ScenarioContext) -> Result<()> {
        Ok(())
    }

    /// Teardown. Cannot fail: anything that goes wrong is logged.
    fn after(&self, _info: &ScenarioInfo, _outcome: &Outcome, _ctx: &mut ScenarioContext) {}
}

#[derive(Default, Clone)]
pub struct HookRegistry {
    base: Vec<Arc<dyn Hook>>,
    tagged: Vec<(TagExpr, Arc<dyn Hook>)>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_base(&mut self, hook: Arc<dyn Hook>) -> &mut Self {
        self.base.push(hook);
        self
    }

    pub fn add_tagged(&mut self, when: TagExpr, hook: Arc<dyn Hook>) -> &mut Self {
        self.tagged.push((when, hook));
        self
    }

    /// The standard set: lifecycle base hooks plus the smoke, regression and
    /// performance observers
    pub fn standard(lifecycle: LifecycleHooks) -> Self {
        let mut hooks = Self::new();
        hooks
            .add_base(Arc::new(lifecycle))
            .add_tagged(TagExpr::tag(tags::SMOKE), Arc::new(TagLogHook::smoke()))
            .add_tagged(TagExpr::tag(tags::REGRESSION), Arc::new(TagLogHook::regression()))
            .add_tagged(TagExpr::tag(tags::PERFORMANCE), Arc::new(PerformanceHook));
        hooks
    }

    /// Base hooks and matching tagged hooks for one scenario, in run order
    pub fn applicable(&self, info: &ScenarioInfo) -> (Vec<Arc<dyn Hook>>, Vec<Arc<dyn Hook>>) {
        let tagged = self
            .tagged
            .iter()
            .filter(|(when, _)| when.matches(&info.tags[..]))
            .map(|(_, hook)| Arc::clone(hook))
            .collect();
        (self.base.clone(), tagged)
    }

    pub fn len(&self) -> usize {
        self.base.len() + self.tagged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Base setup and teardown for every scenario
///
/// Before: create the output directories; for `@database` scenarios, take a
/// lease on the shared connection. After: write the result artifact, give
/// the lease back, sweep expired artifacts.
pub struct LifecycleHooks {
    artifacts: ArtifactStore,
    extra_dirs: Vec<std::path::PathBuf>,
    db: Option<Arc<ConnectionManager>>,
    retention_days: u64,
}

impl LifecycleHooks {
    pub fn new(artifacts: ArtifactStore, db: Option<Arc<ConnectionManager>>, retention_days: u64) -> Self {
        Self {
            artifacts,
            extra_dirs: Vec::new(),
            db,
            retention_days,
        }
    }

    /// Also create `dir` before each scenario
    pub fn with_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.extra_dirs.push(dir.into());
        self
    }

    fn result_document(info: &ScenarioInfo, outcome: &Outcome) -> serde_json::Value {
        json!({
            "scenario": info.name,
            "status": outcome.status.as_str(),
            "tags": info.tags,
            "timestamp": chrono::Local::now().to_rfc3339(),
            "duration_ms": outcome.duration.as_millis() as u64,
            "error": outcome.error,
        })
    }
}

impl Hook for LifecycleHooks {
    fn name(&self) -> &str {
        "lifecycle"
    }

    fn before(&self, info: &ScenarioInfo, ctx: &mut ScenarioContext) -> Result<()> {
        let dirs = [self.artifacts.root().to_path_buf(), self.artifacts.responses_dir()];
        for dir in dirs.iter().chain(&self.extra_dirs) {
            if let Err(e) = self.artifacts.ensure_dir(dir) {
                tracing::warn!(scenario = %info.name, error = %e, "Could not create output directory");
            }
        }

        if info.has_tag(tags::DATABASE) {
            let Some(db) = &self.db else {
                return Err(Error::NotConnected);
            };
            ctx.attach_db(db.acquire()?);
            tracing::info!(scenario = %info.name, "Database connection ready");
        }
        Ok(())
    }

    fn after(&self, info: &ScenarioInfo, outcome: &Outcome, ctx: &mut ScenarioContext) {
        let document = Self::result_document(info, outcome);
        match serde_json::to_string_pretty(&document) {
            Ok(content) => match self.artifacts.save_scenario_result(&info.name, &content) {
                Ok(path) => {
                    tracing::info!(scenario = %info.name, path = %path.display(), "Scenario result saved");
                    ctx.set_result_artifact(path);
                }
                Err(e) => tracing::error!(scenario = %info.name, error = %e, "Failed to save scenario result"),
            },
            Err(e) => tracing::error!(scenario = %info.name, error = %e, "Failed to render scenario result"),
        }

        if let Some(lease) = ctx.release_db() {
            drop(lease);
            tracing::debug!(scenario = %info.name, "Database lease returned");
        }

        let root = self.artifacts.root().to_path_buf();
        for dir in [root, self.artifacts.responses_dir()] {
            let report = self.artifacts.cleanup_older_than(&dir, self.retention_days);
            if !report.deleted.is_empty() || !report.failed.is_empty() {
                tracing::info!(
                    dir = %dir.display(),
                    deleted = report.deleted.len(),
                    failed = report.failed.len(),
                    "Artifact retention sweep"
                );
            }
        }
    }
}

/// Logs start and outcome of scenarios carrying one tag
pub struct TagLogHook {
    label: &'static str,
}

impl TagLogHook {
    pub fn smoke() -> Self {
        Self { label: "smoke" }
    }

    pub fn regression() -> Self {
        Self { label: "regression" }
    }
}

impl Hook for TagLogHook {
    fn name(&self) -> &str {
        self.label
    }

    fn before(&self, info: &ScenarioInfo, _ctx: &mut ScenarioContext) -> Result<()> {
        tracing::info!(scenario = %info.name, "Starting {} scenario", self.label);
        Ok(())
    }

    fn after(&self, info: &ScenarioInfo, outcome: &Outcome, _ctx: &mut ScenarioContext) {
        tracing::info!(scenario = %info.name, status = %outcome.status, "{} scenario completed", self.label);
    }
}

/// Times `@performance` scenarios from setup to teardown
pub struct PerformanceHook;

impl Hook for PerformanceHook {
    fn name(&self) -> &str {
        "performance"
    }

    fn before(&self, info: &ScenarioInfo, ctx: &mut ScenarioContext) -> Result<()> {
        ctx.mark_perf_start();
        tracing::info!(scenario = %info.name, "Starting performance timer");
        Ok(())
    }

    fn after(&self, info: &ScenarioInfo, outcome: &Outcome, ctx: &mut ScenarioContext) {
        match ctx.perf_elapsed() {
            Some(elapsed) => tracing::info!(
                scenario = %info.name,
                status = %outcome.status,
                elapsed_ms = elapsed.as_millis() as u64,
                "Performance scenario completed"
            ),
            None => tracing::warn!(scenario = %info.name, "Performance timer was never started"),
        }
    }
}
