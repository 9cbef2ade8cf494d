//! Configuration file discovery
//!
//! Resolution order: explicit path, `HARNESS_CONFIG`, then
//! `config/application.properties` in the working directory, then the
//! platform configuration directory.

use std::path::{Path, PathBuf};

/// Name used for platform directories
const APP_NAME: &str = "contract-harness";

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "HARNESS_CONFIG";

/// Default configuration file relative to the working directory
pub const LOCAL_CONFIG: &str = "config/application.properties";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/contract-harness/`
/// - macOS: `~/Library/Application Support/contract-harness/`
/// - Windows: `%APPDATA%\contract-harness\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Path of the configuration file in the platform config directory
pub fn user_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("application.properties"))
}

/// Resolve which configuration file to load
///
/// Never checks readability of an explicit or env-provided path; a missing
/// file there must surface as a configuration error, not a silent fallback.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        return local;
    }

    match user_config_path() {
        Some(path) if path.exists() => path,
        _ => local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let path = resolve_config_path(Some(Path::new("/tmp/custom.properties")));
        assert_eq!(path, PathBuf::from("/tmp/custom.properties"));
    }

    #[test]
    fn test_config_dir_is_valid() {
        let dir = config_dir();
        assert!(dir.is_some());
    }
}
