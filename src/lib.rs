//! Contract harness - API contract verification
//!
//! Drives HTTP requests against a service, validates the responses,
//! cross-checks persisted state in a relational database, and records
//! per-scenario artifacts, all under a tag-driven lifecycle that runs
//! scenarios concurrently.

pub mod artifact;
pub mod cli;
pub mod commands;
pub mod common;
pub mod db;
pub mod harness;
pub mod http;
pub mod resources;
pub mod scenario;
pub mod testdata;

// Re-export commonly used types for tests
pub use artifact::ArtifactStore;
pub use common::{Config, ConfigStore, Error, ErrorKind, Result};
pub use db::ConnectionManager;
pub use harness::Harness;
pub use http::RequestExecutor;
pub use resources::{Post, ResourceClient, User};
pub use scenario::{ScenarioLifecycleCoordinator, ScenarioReport, ScenarioStatus};
