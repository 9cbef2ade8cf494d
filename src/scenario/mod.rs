//! Scenario lifecycle
//!
//! Scenarios are loaded from YAML, filtered by tag expression, and run by
//! the [`ScenarioLifecycleCoordinator`] on a pool of worker threads, each
//! wrapped in base and tag-scoped hooks.

mod context;
mod coordinator;
mod definition;
mod hooks;
mod steps;
pub mod tags;

pub use context::ScenarioContext;
pub use coordinator::{
    Outcome, ScenarioBody, ScenarioInfo, ScenarioJob, ScenarioLifecycleCoordinator, ScenarioReport,
    ScenarioStatus,
};
pub use definition::{load, load_all, ResourceKind, ResponseExpectation, ScenarioDefinition, Step};
pub use hooks::{Hook, HookRegistry, LifecycleHooks, PerformanceHook, TagLogHook};
pub use steps::{interpolate, interpolate_str, lookup, StepBody};
pub use tags::TagExpr;
