//! Filesystem artifact storage
//!
//! Captured responses and scenario results land under the configured
//! local storage root. Files are written through a temporary sibling and
//! renamed into place, so a reader sees either nothing or the whole file.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use crate::common::{Error, Result};

/// Subfolder for captured API responses
pub const RESPONSES_DIR: &str = "responses";

/// Cleanup never removes files younger than this, whatever the horizon.
/// Keeps the sweep away from artifacts of scenarios still in flight.
pub const MIN_CLEANUP_AGE: Duration = Duration::from_secs(60 * 60);

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Outcome of a retention sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Artifact store rooted at a directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn responses_dir(&self) -> PathBuf {
        self.root.join(RESPONSES_DIR)
    }

    /// Create a directory (and parents) if it does not exist
    pub fn ensure_dir(&self, dir: &Path) -> Result<()> {
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| Error::artifact(dir, e))?;
            tracing::info!(dir = %dir.display(), "Directory created");
        }
        Ok(())
    }

    /// Write `content` to `path`, creating parent directories
    pub fn write(&self, path: &Path, content: &[u8]) -> Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        self.ensure_dir(parent)?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(parent).map_err(|e| Error::artifact(path, e))?;
        tmp.write_all(content).map_err(|e| Error::artifact(path, e))?;
        tmp.as_file().sync_all().map_err(|e| Error::artifact(path, e))?;
        tmp.persist(path).map_err(|e| Error::artifact(path, e.error))?;

        tracing::debug!(path = %path.display(), bytes = content.len(), "Artifact written");
        Ok(())
    }

    /// Save a scenario result under the root:
    /// `<scenario>_results_<timestamp>-<seq>.json`
    pub fn save_scenario_result(&self, scenario: &str, content: &str) -> Result<PathBuf> {
        let name = timestamped_name(&format!("{}_results", sanitize(scenario)), "json");
        let path = self.root.join(name);
        self.write(&path, content.as_bytes())?;
        Ok(path)
    }

    /// Save a captured response under `responses/`
    pub fn save_response(&self, endpoint_name: &str, body: &str) -> Result<PathBuf> {
        let name = timestamped_name(&format!("{}_response", sanitize(endpoint_name)), "json");
        let path = self.responses_dir().join(name);
        self.write(&path, body.as_bytes())?;
        Ok(path)
    }

    /// Delete regular files in `dir` older than `days`
    ///
    /// The effective cutoff is never closer than [`MIN_CLEANUP_AGE`].
    /// Individual failures are logged and collected, never fatal.
    pub fn cleanup_older_than(&self, dir: &Path, days: u64) -> CleanupReport {
        let horizon = Duration::from_secs(days.saturating_mul(24 * 60 * 60)).max(MIN_CLEANUP_AGE);
        self.cleanup_with_horizon(dir, horizon)
    }

    pub(crate) fn cleanup_with_horizon(&self, dir: &Path, horizon: Duration) -> CleanupReport {
        let mut report = CleanupReport::default();
        let Some(cutoff) = SystemTime::now().checked_sub(horizon) else {
            return report;
        };

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
            Err(e) => {
                tracing::error!(dir = %dir.display(), error = %e, "Failed to list directory for cleanup");
                return report;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let modified = match entry.metadata() {
                Ok(meta) if meta.is_file() => meta.modified(),
                _ => continue,
            };
            match modified {
                Ok(time) if time < cutoff => match std::fs::remove_file(&path) {
                    Ok(()) => {
                        tracing::info!(path = %path.display(), "Deleted old file");
                        report.deleted.push(path);
                    }
                    Err(e) => {
                        tracing::error!(path = %path.display(), error = %e, "Failed to delete old file");
                        report.failed.push(path);
                    }
                },
                _ => {}
            }
        }

        report
    }
}

/// `<base>_<yyyyMMdd_HHmmss>-<seq>.<ext>`
///
/// The timestamp alone only has second granularity; the process-wide
/// sequence number keeps names unique between concurrent writers.
pub fn timestamped_name(base: &str, ext: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{base}_{timestamp}-{seq:04}.{ext}")
}

/// Replace anything outside `[A-Za-z0-9]` with `_`
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
