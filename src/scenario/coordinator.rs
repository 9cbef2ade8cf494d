//! Scenario lifecycle coordinator
//!
//! Runs each scenario through its hooks in a fixed order:
//!
//! ```text
//! base before -> tagged before -> body -> tagged after -> base after
//! ```
//!
//! After hooks run in reverse registration order and always run, whether
//! the before hooks or the body failed. The coordinator keeps no state about
//! any one scenario; that lives in the [`ScenarioContext`].

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use super::context::ScenarioContext;
use super::hooks::HookRegistry;
use super::tags::normalize_tag;
use crate::common::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioStatus {
    Pending,
    Running,
    Passed,
    Failed,
}

impl ScenarioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name and tags of a scenario, as seen by hooks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioInfo {
    pub name: String,
    pub tags: Vec<String>,
}

impl ScenarioInfo {
    pub fn new<S: AsRef<str>>(name: impl Into<String>, tags: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            tags: tags.into_iter().map(|t| normalize_tag(t.as_ref())).collect(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = normalize_tag(tag);
        self.tags.iter().any(|t| *t == tag)
    }
}

/// What the after hooks get to see
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: ScenarioStatus,
    pub error: Option<String>,
    pub duration: Duration,
}

impl Outcome {
    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }
}

/// The steps of a scenario
pub trait ScenarioBody: Send + Sync {
    fn run(&self, ctx: &mut ScenarioContext) -> Result<()>;
}

impl<F> ScenarioBody for F
where
    F: Fn(&mut ScenarioContext) -> Result<()> + Send + Sync,
{
    fn run(&self, ctx: &mut ScenarioContext) -> Result<()> {
        self(ctx)
    }
}

pub struct ScenarioJob {
    pub info: ScenarioInfo,
    pub body: Box<dyn ScenarioBody>,
}

impl ScenarioJob {
    pub fn new(info: ScenarioInfo, body: impl ScenarioBody + 'static) -> Self {
        Self {
            info,
            body: Box::new(body),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub info: ScenarioInfo,
    pub status: ScenarioStatus,
    pub error: Option<String>,
    pub duration: Duration,
    pub artifact: Option<PathBuf>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }
}

pub struct ScenarioLifecycleCoordinator {
    hooks: HookRegistry,
    workers: usize,
}

impl ScenarioLifecycleCoordinator {
    pub fn new(hooks: HookRegistry, workers: usize) -> Self {
        Self {
            hooks,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Run one scenario through its hooks on the calling thread
    pub fn run_one(&self, info: &ScenarioInfo, body: &dyn ScenarioBody) -> ScenarioReport {
        let started = Instant::now();
        let mut ctx = ScenarioContext::new(info.clone());
        let (base, tagged) = self.hooks.applicable(info);

        tracing::debug!(scenario = %info.name, status = %ctx.status(), "Scenario queued");
        ctx.set_status(ScenarioStatus::Running);
        tracing::info!(scenario = %info.name, tags = ?info.tags, status = %ctx.status(), "Starting scenario");

        let mut failure: Option<String> = None;
        for hook in base.iter().chain(tagged.iter()) {
            let result = catch_unwind(AssertUnwindSafe(|| hook.before(info, &mut ctx)));
            let error = match result {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("before hook panicked: {}", panic_message(&*panic)),
            };
            tracing::error!(scenario = %info.name, hook = hook.name(), %error, "Before hook failed");
            failure = Some(error);
            break;
        }

        if failure.is_none() {
            failure = match catch_unwind(AssertUnwindSafe(|| body.run(&mut ctx))) {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(panic) => Some(format!("scenario panicked: {}", panic_message(&*panic))),
            };
        }

        let status = if failure.is_none() {
            ScenarioStatus::Passed
        } else {
            ScenarioStatus::Failed
        };
        ctx.set_status(status);

        let outcome = Outcome {
            status,
            error: failure,
            duration: started.elapsed(),
        };
        match &outcome.error {
            None => tracing::info!(scenario = %info.name, duration_ms = outcome.duration.as_millis() as u64, "Scenario passed"),
            Some(error) => tracing::error!(scenario = %info.name, %error, "Scenario failed"),
        }

        for hook in tagged.iter().rev().chain(base.iter().rev()) {
            let result = catch_unwind(AssertUnwindSafe(|| hook.after(info, &outcome, &mut ctx)));
            if let Err(panic) = result {
                tracing::error!(
                    scenario = %info.name,
                    hook = hook.name(),
                    panic = %panic_message(&*panic),
                    "After hook panicked"
                );
            }
        }

        ScenarioReport {
            info: info.clone(),
            status: outcome.status,
            error: outcome.error,
            duration: outcome.duration,
            artifact: ctx.result_artifact().map(PathBuf::from),
        }
    }

    /// Run every job on a fixed pool of worker threads
    ///
    /// Each worker takes the next job index, runs it to completion, and
    /// repeats. Reports come back in job order.
    pub fn run_all(&self, jobs: &[ScenarioJob]) -> Vec<ScenarioReport> {
        let workers = self.workers.min(jobs.len()).max(1);
        let cursor = AtomicUsize::new(0);
        let slots: Vec<Mutex<Option<ScenarioReport>>> = jobs.iter().map(|_| Mutex::new(None)).collect();

        tracing::info!(scenarios = jobs.len(), workers, "Running scenarios");

        thread::scope(|scope| {
            for worker in 0..workers {
                let spawned = thread::Builder::new()
                    .name(format!("scenario-{worker}"))
                    .spawn_scoped(scope, || loop {
                        let idx = cursor.fetch_add(1, Ordering::SeqCst);
                        let Some(job) = jobs.get(idx) else { break };
                        let report = self.run_one(&job.info, job.body.as_ref());
                        *slots[idx].lock().unwrap_or_else(PoisonError::into_inner) = Some(report);
                    });
                if let Err(e) = spawned {
                    tracing::error!(worker, error = %e, "Failed to spawn scenario worker");
                }
            }
        });

        // Anything left over means no worker could be spawned
        slots
            .into_iter()
            .zip(jobs)
            .map(|(slot, job)| {
                slot.into_inner()
                    .unwrap_or_else(PoisonError::into_inner)
                    .unwrap_or_else(|| self.run_one(&job.info, job.body.as_ref()))
            })
            .collect()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;
    use crate::scenario::hooks::Hook;
    use crate::scenario::tags::TagExpr;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    struct Named {
        name: &'static str,
        recorder: Arc<Recorder>,
        fail_before: bool,
    }

    impl Hook for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn before(&self, _info: &ScenarioInfo, _ctx: &mut ScenarioContext) -> Result<()> {
            self.recorder.push(format!("{}:before", self.name));
            if self.fail_before {
                return Err(Error::Assertion("refused".to_string()));
            }
            Ok(())
        }

        fn after(&self, _info: &ScenarioInfo, outcome: &Outcome, _ctx: &mut ScenarioContext) {
            self.recorder.push(format!("{}:after:{}", self.name, outcome.status));
        }
    }

    fn hook(name: &'static str, recorder: &Arc<Recorder>) -> Arc<dyn Hook> {
        Arc::new(Named {
            name,
            recorder: Arc::clone(recorder),
            fail_before: false,
        })
    }

    fn registry(recorder: &Arc<Recorder>) -> HookRegistry {
        let mut hooks = HookRegistry::new();
        hooks.add_base(hook("base", recorder));
        hooks.add_tagged(TagExpr::tag("@smoke"), hook("smoke", recorder));
        hooks.add_tagged(TagExpr::tag("@performance"), hook("perf", recorder));
        hooks
    }

    #[test]
    fn test_hook_order_for_tagged_scenario() {
        let recorder = Arc::new(Recorder::default());
        let coordinator = ScenarioLifecycleCoordinator::new(registry(&recorder), 1);
        let info = ScenarioInfo::new("ordered", ["smoke", "performance"]);
        let body_recorder = Arc::clone(&recorder);
        let body = move |_: &mut ScenarioContext| -> Result<()> {
            body_recorder.push("body".to_string());
            Ok(())
        };

        let report = coordinator.run_one(&info, &body);
        assert!(report.passed());
        assert_eq!(
            recorder.events(),
            vec![
                "base:before",
                "smoke:before",
                "perf:before",
                "body",
                "perf:after:PASSED",
                "smoke:after:PASSED",
                "base:after:PASSED",
            ]
        );
    }

    struct StatusWatcher {
        recorder: Arc<Recorder>,
    }

    impl Hook for StatusWatcher {
        fn name(&self) -> &str {
            "watcher"
        }

        fn before(&self, _info: &ScenarioInfo, ctx: &mut ScenarioContext) -> Result<()> {
            self.recorder.push(format!("before:{}", ctx.status()));
            Ok(())
        }

        fn after(&self, _info: &ScenarioInfo, _outcome: &Outcome, ctx: &mut ScenarioContext) {
            self.recorder.push(format!("after:{}", ctx.status()));
        }
    }

    #[test]
    fn test_context_status_moves_from_pending_to_outcome() {
        let recorder = Arc::new(Recorder::default());
        let mut hooks = HookRegistry::new();
        hooks.add_base(Arc::new(StatusWatcher {
            recorder: Arc::clone(&recorder),
        }));
        let coordinator = ScenarioLifecycleCoordinator::new(hooks, 1);
        let body_recorder = Arc::clone(&recorder);
        let body = move |ctx: &mut ScenarioContext| -> Result<()> {
            body_recorder.push(format!("body:{}", ctx.status()));
            Err(Error::Assertion("late".to_string()))
        };

        let info = ScenarioInfo::new("watched", ["@smoke"]);
        assert_eq!(ScenarioContext::new(info.clone()).status(), ScenarioStatus::Pending);

        let report = coordinator.run_one(&info, &body);
        assert!(report.status.is_terminal());
        assert!(!ScenarioStatus::Running.is_terminal());
        assert_eq!(
            recorder.events(),
            vec!["before:RUNNING", "body:RUNNING", "after:FAILED"]
        );
    }

    #[test]
    fn test_untagged_scenario_runs_base_hooks_only() {
        let recorder = Arc::new(Recorder::default());
        let coordinator = ScenarioLifecycleCoordinator::new(registry(&recorder), 1);
        let info = ScenarioInfo::new("plain", Vec::<String>::new());
        let report = coordinator.run_one(&info, &|_: &mut ScenarioContext| -> Result<()> {
            Err(Error::Assertion("boom".to_string()))
        });

        assert_eq!(report.status, ScenarioStatus::Failed);
        assert_eq!(report.error.as_deref(), Some("Assertion failed: boom"));
        assert_eq!(recorder.events(), vec!["base:before", "base:after:FAILED"]);
    }

    #[test]
    fn test_panicking_body_still_runs_teardown() {
        let recorder = Arc::new(Recorder::default());
        let coordinator = ScenarioLifecycleCoordinator::new(registry(&recorder), 1);
        let info = ScenarioInfo::new("panics", ["@smoke"]);
        let report = coordinator.run_one(&info, &|_: &mut ScenarioContext| -> Result<()> {
            panic!("step exploded")
        });

        assert_eq!(report.status, ScenarioStatus::Failed);
        assert!(report.error.unwrap().contains("step exploded"));
        assert_eq!(recorder.events().last().unwrap(), "base:after:FAILED");
    }

    #[test]
    fn test_failed_before_skips_body_but_not_after() {
        let recorder = Arc::new(Recorder::default());
        let mut hooks = HookRegistry::new();
        hooks.add_base(Arc::new(Named {
            name: "base",
            recorder: Arc::clone(&recorder),
            fail_before: true,
        }));
        let coordinator = ScenarioLifecycleCoordinator::new(hooks, 1);
        let body_recorder = Arc::clone(&recorder);
        let body = move |_: &mut ScenarioContext| -> Result<()> {
            body_recorder.push("body".to_string());
            Ok(())
        };

        let report = coordinator.run_one(&ScenarioInfo::new("x", ["@smoke"]), &body);
        assert_eq!(report.status, ScenarioStatus::Failed);
        assert_eq!(recorder.events(), vec!["base:before", "base:after:FAILED"]);
    }

    #[test]
    fn test_run_all_uses_pool_and_keeps_order() {
        let recorder = Arc::new(Recorder::default());
        let coordinator = ScenarioLifecycleCoordinator::new(HookRegistry::new(), 4);
        let threads = Arc::new(Mutex::new(std::collections::HashSet::new()));

        let jobs: Vec<ScenarioJob> = (0..12)
            .map(|i| {
                let threads = Arc::clone(&threads);
                let recorder = Arc::clone(&recorder);
                ScenarioJob::new(
                    ScenarioInfo::new(format!("scenario-{i}"), ["@smoke"]),
                    move |_: &mut ScenarioContext| -> Result<()> {
                        std::thread::sleep(Duration::from_millis(10));
                        threads
                            .lock()
                            .unwrap()
                            .insert(std::thread::current().name().map(str::to_string));
                        recorder.push(format!("ran-{i}"));
                        if i % 3 == 0 {
                            Err(Error::Assertion(format!("scenario {i} failed")))
                        } else {
                            Ok(())
                        }
                    },
                )
            })
            .collect();

        let reports = coordinator.run_all(&jobs);
        assert_eq!(reports.len(), 12);
        for (i, report) in reports.iter().enumerate() {
            assert_eq!(report.info.name, format!("scenario-{i}"));
            assert_eq!(report.passed(), i % 3 != 0);
        }
        assert_eq!(recorder.events().len(), 12);
        let used = threads.lock().unwrap().len();
        assert!(used > 1 && used <= 4, "used {used} workers");
    }

    #[test]
    fn test_info_normalizes_tags() {
        let info = ScenarioInfo::new("n", ["database", "@smoke"]);
        assert_eq!(info.tags, vec!["@database", "@smoke"]);
        assert!(info.has_tag("smoke"));
    }
}
