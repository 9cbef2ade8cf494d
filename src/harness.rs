//! Wiring
//!
//! [`Harness`] owns the shared collaborators of a run (configuration,
//! executor, artifact store, database manager) and hands them to scenario
//! bodies and hooks. Tests build one from parts with stub transports.

use std::sync::Arc;

use crate::artifact::ArtifactStore;
use crate::common::{Config, Result};
use crate::db::ConnectionManager;
use crate::http::RequestExecutor;
use crate::resources::{Post, ResourceClient, User};
use crate::scenario::{
    HookRegistry, LifecycleHooks, ScenarioDefinition, ScenarioJob, ScenarioLifecycleCoordinator,
    StepBody,
};

pub struct Harness {
    config: Arc<Config>,
    executor: RequestExecutor,
    artifacts: ArtifactStore,
    db: Option<Arc<ConnectionManager>>,
}

impl Harness {
    /// Production wiring: reqwest transport and sqlx driver
    pub fn from_config(config: Arc<Config>) -> Result<Self> {
        let executor = RequestExecutor::from_config(&config)?;
        let db = Arc::new(ConnectionManager::from_config(&config)?);
        Ok(Self::new(config, executor, Some(db)))
    }

    pub fn new(config: Arc<Config>, executor: RequestExecutor, db: Option<Arc<ConnectionManager>>) -> Self {
        let artifacts = ArtifactStore::new(config.local_storage_path());
        Self {
            config,
            executor,
            artifacts,
            db,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn db(&self) -> Option<&Arc<ConnectionManager>> {
        self.db.as_ref()
    }

    pub fn users(&self) -> ResourceClient<User> {
        ResourceClient::new(self.executor.clone())
    }

    pub fn posts(&self) -> ResourceClient<Post> {
        ResourceClient::new(self.executor.clone())
    }

    pub fn lifecycle_hooks(&self) -> LifecycleHooks {
        LifecycleHooks::new(
            self.artifacts.clone(),
            self.db.clone(),
            self.config.retention_days(),
        )
        .with_dir(self.config.report_path())
    }

    pub fn coordinator(&self, workers: usize) -> ScenarioLifecycleCoordinator {
        ScenarioLifecycleCoordinator::new(HookRegistry::standard(self.lifecycle_hooks()), workers)
    }

    /// A runnable job for a scenario file
    pub fn job(self: &Arc<Self>, definition: ScenarioDefinition) -> ScenarioJob {
        ScenarioJob::new(definition.info(), StepBody::new(Arc::clone(self), definition))
    }
}
