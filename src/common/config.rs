//! Configuration overlay
//!
//! A flat `key -> string` property set read once from a `.properties` or
//! TOML file, with runtime overrides layered on top. Lookups resolve in
//! order: command-line override, `HARNESS_*` environment variable, file
//! value, hard-coded default. Every typed accessor falls back to its
//! default instead of failing.

use once_cell::sync::OnceCell;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Error, Result};

/// Documented configuration keys
pub mod keys {
    pub const ENVIRONMENT: &str = "environment";
    pub const BASE_URL: &str = "base.url";
    pub const TIMEOUT: &str = "timeout";
    pub const DB_TYPE: &str = "db.type";
    pub const DB_HOST: &str = "db.host";
    pub const DB_PORT: &str = "db.port";
    pub const DB_NAME: &str = "db.name";
    pub const DB_USERNAME: &str = "db.username";
    pub const DB_PASSWORD: &str = "db.password";
    pub const DB_POOL_SIZE: &str = "db.connection.pool.size";
    pub const DB_PROBE_TIMEOUT: &str = "db.probe.timeout";
    pub const TEST_DATA_PATH: &str = "test.data.path";
    pub const LOCAL_STORAGE_PATH: &str = "local.storage.path";
    pub const API_VERSION: &str = "api.version";
    pub const CONTENT_TYPE: &str = "content.type";
    pub const ACCEPT_HEADER: &str = "accept.header";
    pub const RETRY_COUNT: &str = "retry.count";
    pub const RETRY_DELAY: &str = "retry.delay";
    pub const REPORT_PATH: &str = "report.path";
    pub const SCREENSHOT_PATH: &str = "screenshot.path";
    pub const LOG_LEVEL: &str = "log.level";
    pub const LOG_FILE_PATH: &str = "log.file.path";
    pub const PARALLEL_EXECUTION: &str = "parallel.execution";
    pub const THREAD_COUNT: &str = "thread.count";
    pub const RETENTION_DAYS: &str = "artifact.retention.days";
    pub const HTTP_LOG_DETAIL: &str = "http.log.detail";
}

/// Keys with a documented default, and that default
pub const DOCUMENTED_DEFAULTS: &[(&str, &str)] = &[
    (keys::ENVIRONMENT, "qa"),
    (keys::TIMEOUT, "30000"),
    (keys::DB_TYPE, "mysql"),
    (keys::DB_HOST, "localhost"),
    (keys::DB_PORT, "3306"),
    (keys::DB_POOL_SIZE, "10"),
    (keys::DB_PROBE_TIMEOUT, "5"),
    (keys::TEST_DATA_PATH, "tests/data"),
    (keys::LOCAL_STORAGE_PATH, "test-output"),
    (keys::API_VERSION, "v1"),
    (keys::CONTENT_TYPE, "application/json"),
    (keys::ACCEPT_HEADER, "application/json"),
    (keys::RETRY_COUNT, "3"),
    (keys::RETRY_DELAY, "1000"),
    (keys::REPORT_PATH, "test-reports"),
    (keys::SCREENSHOT_PATH, "screenshots"),
    (keys::LOG_LEVEL, "INFO"),
    (keys::LOG_FILE_PATH, "logs/test.log"),
    (keys::PARALLEL_EXECUTION, "true"),
    (keys::THREAD_COUNT, "5"),
    (keys::RETENTION_DAYS, "7"),
    (keys::HTTP_LOG_DETAIL, "all"),
];

/// Prefix of environment variables that override file values
pub const ENV_PREFIX: &str = "HARNESS_";

/// Where a configuration value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Override,
    Environment,
    File,
    Default,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Override => write!(f, "override"),
            Self::Environment => write!(f, "env"),
            Self::File => write!(f, "file"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Loaded configuration, immutable for the life of the process
#[derive(Debug, Clone, Default)]
pub struct Config {
    source: Option<PathBuf>,
    file: HashMap<String, String>,
    env: HashMap<String, String>,
    overrides: HashMap<String, String>,
}

impl Config {
    /// Build a configuration from already-parsed layers
    pub fn from_layers(
        file: HashMap<String, String>,
        env: HashMap<String, String>,
        overrides: HashMap<String, String>,
    ) -> Self {
        Self {
            source: None,
            file,
            env,
            overrides,
        }
    }

    /// Build a configuration from file values only (handy for tests)
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let file = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::from_layers(file, HashMap::new(), HashMap::new())
    }

    /// Load from a file, applying environment and explicit overrides
    pub fn load(path: &Path, overrides: &[(String, String)]) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        let file = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => parse_toml(&content).map_err(|reason| Error::ConfigParse {
                path: path.display().to_string(),
                reason,
            })?,
            _ => parse_properties(&content),
        };

        let env = env_layer(std::env::vars());
        let overrides = overrides.iter().cloned().collect();

        tracing::info!(path = %path.display(), keys = file.len(), "Configuration loaded");

        Ok(Self {
            source: Some(path.to_path_buf()),
            ..Self::from_layers(file, env, overrides)
        })
    }

    /// File this configuration was read from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Raw lookup through the override layers, without defaults
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lookup(key).map(|(value, _)| value)
    }

    fn lookup(&self, key: &str) -> Option<(&str, Origin)> {
        if let Some(v) = self.overrides.get(key) {
            return Some((v, Origin::Override));
        }
        if let Some(v) = self.env.get(&env_var_name(key)) {
            return Some((v, Origin::Environment));
        }
        self.file.get(key).map(|v| (v.as_str(), Origin::File))
    }

    /// String lookup with an explicit default
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    /// Integer lookup; unparseable values log a warning and use the default
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.get(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(key, value = raw, default, "Invalid integer value, using default");
                default
            }),
            None => default,
        }
    }

    /// Boolean lookup: `true` (any case) is true, anything else false
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(raw) => raw.trim().eq_ignore_ascii_case("true"),
            None => default,
        }
    }

    fn documented(&self, key: &str) -> String {
        let default = DOCUMENTED_DEFAULTS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .unwrap_or_default();
        self.get_or(key, default)
    }

    fn non_negative(&self, key: &str, default: i64) -> u64 {
        let value = self.get_int(key, default);
        u64::try_from(value).unwrap_or_else(|_| {
            tracing::warn!(key, value, default, "Negative value, using default");
            default.unsigned_abs()
        })
    }

    // Environment

    pub fn environment(&self) -> String {
        self.documented(keys::ENVIRONMENT)
    }

    pub fn base_url(&self) -> Option<String> {
        self.get(keys::BASE_URL).map(str::to_string)
    }

    /// HTTP timeout in milliseconds
    pub fn timeout_ms(&self) -> u64 {
        self.non_negative(keys::TIMEOUT, 30_000)
    }

    // Database

    pub fn db_type(&self) -> String {
        self.documented(keys::DB_TYPE)
    }

    pub fn db_host(&self) -> String {
        self.documented(keys::DB_HOST)
    }

    pub fn db_port(&self) -> u16 {
        let port = self.get_int(keys::DB_PORT, 3306);
        u16::try_from(port).unwrap_or_else(|_| {
            tracing::warn!(port, "Port out of range, using default: 3306");
            3306
        })
    }

    pub fn db_name(&self) -> Option<String> {
        self.get(keys::DB_NAME).map(str::to_string)
    }

    pub fn db_username(&self) -> Option<String> {
        self.get(keys::DB_USERNAME).map(str::to_string)
    }

    pub fn db_password(&self) -> Option<String> {
        self.get(keys::DB_PASSWORD).map(str::to_string)
    }

    pub fn db_pool_size(&self) -> u64 {
        self.non_negative(keys::DB_POOL_SIZE, 10)
    }

    /// Upper bound for the connection liveness probe, in seconds
    pub fn db_probe_timeout_secs(&self) -> u64 {
        self.non_negative(keys::DB_PROBE_TIMEOUT, 5)
    }

    // Storage

    pub fn test_data_path(&self) -> PathBuf {
        PathBuf::from(self.documented(keys::TEST_DATA_PATH))
    }

    pub fn local_storage_path(&self) -> PathBuf {
        PathBuf::from(self.documented(keys::LOCAL_STORAGE_PATH))
    }

    pub fn report_path(&self) -> PathBuf {
        PathBuf::from(self.documented(keys::REPORT_PATH))
    }

    pub fn screenshot_path(&self) -> PathBuf {
        PathBuf::from(self.documented(keys::SCREENSHOT_PATH))
    }

    pub fn retention_days(&self) -> u64 {
        self.non_negative(keys::RETENTION_DAYS, 7)
    }

    // API

    pub fn api_version(&self) -> String {
        self.documented(keys::API_VERSION)
    }

    pub fn content_type(&self) -> String {
        self.documented(keys::CONTENT_TYPE)
    }

    pub fn accept_header(&self) -> String {
        self.documented(keys::ACCEPT_HEADER)
    }

    pub fn http_log_detail(&self) -> String {
        self.documented(keys::HTTP_LOG_DETAIL)
    }

    // Retry

    pub fn retry_count(&self) -> u64 {
        self.non_negative(keys::RETRY_COUNT, 3)
    }

    /// Delay between retries in milliseconds
    pub fn retry_delay_ms(&self) -> u64 {
        self.non_negative(keys::RETRY_DELAY, 1000)
    }

    // Logging

    pub fn log_level(&self) -> String {
        self.documented(keys::LOG_LEVEL)
    }

    pub fn log_file_path(&self) -> PathBuf {
        PathBuf::from(self.documented(keys::LOG_FILE_PATH))
    }

    // Threads

    pub fn parallel_execution(&self) -> bool {
        self.get_bool(keys::PARALLEL_EXECUTION, true)
    }

    pub fn thread_count(&self) -> usize {
        self.non_negative(keys::THREAD_COUNT, 5).max(1) as usize
    }

    /// Worker count to use for a run: `thread.count`, or 1 when parallel
    /// execution is disabled
    pub fn worker_count(&self) -> usize {
        if self.parallel_execution() {
            self.thread_count()
        } else {
            1
        }
    }

    /// Every known key with its effective value and origin, secrets masked
    pub fn masked_entries(&self) -> Vec<(String, String, Origin)> {
        let mut names: BTreeSet<String> = DOCUMENTED_DEFAULTS
            .iter()
            .map(|(k, _)| k.to_string())
            .collect();
        names.extend(self.file.keys().cloned());
        names.extend(self.overrides.keys().cloned());
        for key in [keys::BASE_URL, keys::DB_NAME, keys::DB_USERNAME, keys::DB_PASSWORD] {
            if self.get(key).is_some() {
                names.insert(key.to_string());
            }
        }

        names
            .into_iter()
            .map(|key| {
                let (value, origin) = match self.lookup(&key) {
                    Some((v, origin)) => (v.to_string(), origin),
                    None => (self.documented(&key), Origin::Default),
                };
                let value = if is_secret(&key) {
                    crate::testdata::mask_sensitive(&value)
                } else {
                    value
                };
                (key, value, origin)
            })
            .collect()
    }
}

fn is_secret(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    ["password", "secret", "token"]
        .iter()
        .any(|needle| key.contains(needle))
}

/// Environment variable consulted for a key: `db.port` -> `HARNESS_DB_PORT`
pub fn env_var_name(key: &str) -> String {
    let mut name = String::with_capacity(ENV_PREFIX.len() + key.len());
    name.push_str(ENV_PREFIX);
    name.extend(key.chars().map(|c| match c {
        '.' | '-' => '_',
        c => c.to_ascii_uppercase(),
    }));
    name
}

/// Keep only the `HARNESS_*` variables, snapshotted once at load time
pub fn env_layer(vars: impl IntoIterator<Item = (String, String)>) -> HashMap<String, String> {
    vars.into_iter()
        .filter(|(name, _)| name.starts_with(ENV_PREFIX))
        .collect()
}

/// Parse Java-style properties: `key=value`, `key: value`, `#`/`!` comments
pub fn parse_properties(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(['=', ':'])?;
            let key = line[..split].trim();
            let value = line[split + 1..].trim();
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

/// Parse TOML, flattening nested tables into dotted keys
pub fn parse_toml(content: &str) -> std::result::Result<HashMap<String, String>, String> {
    let table: toml::Table = toml::from_str(content).map_err(|e| e.to_string())?;
    let mut out = HashMap::new();
    flatten_toml("", &table, &mut out);
    Ok(out)
}

fn flatten_toml(prefix: &str, table: &toml::Table, out: &mut HashMap<String, String>) {
    for (key, value) in table {
        let full = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(nested) => flatten_toml(&full, nested, out),
            toml::Value::String(s) => {
                out.insert(full, s.clone());
            }
            other => {
                out.insert(full, other.to_string());
            }
        }
    }
}

/// Where to read configuration from and which overrides to apply
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    pub path: Option<PathBuf>,
    pub overrides: Vec<(String, String)>,
}

/// Lazily-initialised, process-wide configuration holder
///
/// The first `get()` reads the file; concurrent first callers block on the
/// same initialisation and all observe the same `Arc<Config>`. A failed
/// load leaves the store empty and returns the error to every caller.
#[derive(Debug, Default)]
pub struct ConfigStore {
    source: ConfigSource,
    cell: OnceCell<Arc<Config>>,
}

impl ConfigStore {
    pub fn new(source: ConfigSource) -> Self {
        Self {
            source,
            cell: OnceCell::new(),
        }
    }

    /// Store that is already initialised with the given configuration
    pub fn with_config(config: Config) -> Self {
        Self {
            source: ConfigSource::default(),
            cell: OnceCell::with_value(Arc::new(config)),
        }
    }

    /// Get the configuration, loading it on first access
    pub fn get(&self) -> Result<Arc<Config>> {
        self.cell
            .get_or_try_init(|| {
                let path = super::paths::resolve_config_path(self.source.path.as_deref());
                Config::load(&path, &self.source.overrides).map(Arc::new)
            })
            .cloned()
    }

    /// Whether the configuration has been loaded yet
    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}

/// Parse a `key=value` override from the command line
pub fn parse_override(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in override '{raw}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_keys_yield_documented_defaults() {
        let config = Config::default();
        for (key, default) in DOCUMENTED_DEFAULTS {
            assert_eq!(config.documented(key), *default, "default for {key}");
        }

        assert_eq!(config.environment(), "qa");
        assert_eq!(config.timeout_ms(), 30_000);
        assert_eq!(config.db_type(), "mysql");
        assert_eq!(config.db_host(), "localhost");
        assert_eq!(config.db_port(), 3306);
        assert_eq!(config.db_pool_size(), 10);
        assert_eq!(config.local_storage_path(), PathBuf::from("test-output"));
        assert_eq!(config.content_type(), "application/json");
        assert_eq!(config.accept_header(), "application/json");
        assert_eq!(config.retry_count(), 3);
        assert_eq!(config.retry_delay_ms(), 1000);
        assert_eq!(config.report_path(), PathBuf::from("test-reports"));
        assert_eq!(config.log_level(), "INFO");
        assert!(config.parallel_execution());
        assert_eq!(config.thread_count(), 5);
        assert_eq!(config.retention_days(), 7);
        assert_eq!(config.base_url(), None);
        assert_eq!(config.db_password(), None);
    }

    #[test]
    fn test_override_precedence() {
        let file = HashMap::from([
            ("db.host".to_string(), "file-host".to_string()),
            ("db.port".to_string(), "5432".to_string()),
            ("db.name".to_string(), "file-db".to_string()),
        ]);
        let env = env_layer([
            ("HARNESS_DB_HOST".to_string(), "env-host".to_string()),
            ("HARNESS_DB_PORT".to_string(), "6543".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ]);
        let overrides = HashMap::from([("db.host".to_string(), "cli-host".to_string())]);
        let config = Config::from_layers(file, env, overrides);

        assert_eq!(config.db_host(), "cli-host");
        assert_eq!(config.db_port(), 6543);
        assert_eq!(config.db_name().as_deref(), Some("file-db"));
    }

    #[test]
    fn test_invalid_int_falls_back() {
        let config = Config::from_pairs([("thread.count", "lots"), ("timeout", "-5")]);
        assert_eq!(config.thread_count(), 5);
        assert_eq!(config.timeout_ms(), 30_000);
    }

    #[test]
    fn test_bool_parsing() {
        assert!(Config::from_pairs([("parallel.execution", "TRUE")]).parallel_execution());
        assert!(!Config::from_pairs([("parallel.execution", "yes")]).parallel_execution());
        assert_eq!(
            Config::from_pairs([("parallel.execution", "false"), ("thread.count", "8")])
                .worker_count(),
            1
        );
    }

    #[test]
    fn test_parse_properties() {
        let props = parse_properties(
            "# comment\n! also comment\nbase.url=https://api.example.test\n\ndb.type : mysql\nempty=\n",
        );
        assert_eq!(props["base.url"], "https://api.example.test");
        assert_eq!(props["db.type"], "mysql");
        assert_eq!(props["empty"], "");
        assert_eq!(props.len(), 3);
    }

    #[test]
    fn test_parse_toml_flattens_tables() {
        let props = parse_toml(
            "environment = \"staging\"\n[db]\ntype = \"postgresql\"\nport = 5432\n[parallel]\nexecution = false\n",
        )
        .unwrap();
        assert_eq!(props["environment"], "staging");
        assert_eq!(props["db.type"], "postgresql");
        assert_eq!(props["db.port"], "5432");
        assert_eq!(props["parallel.execution"], "false");
    }

    #[test]
    fn test_env_var_name() {
        assert_eq!(env_var_name("base.url"), "HARNESS_BASE_URL");
        assert_eq!(env_var_name("db.connection.pool.size"), "HARNESS_DB_CONNECTION_POOL_SIZE");
    }

    #[test]
    fn test_parse_override() {
        assert_eq!(
            parse_override("db.type=postgresql").unwrap(),
            ("db.type".to_string(), "postgresql".to_string())
        );
        assert!(parse_override("novalue").is_err());
        assert!(parse_override("=x").is_err());
    }

    #[test]
    fn test_masked_entries_hide_password() {
        let config = Config::from_pairs([("db.password", "hunter2secret")]);
        let entries = config.masked_entries();
        let (_, value, origin) = entries
            .iter()
            .find(|(k, _, _)| k == "db.password")
            .unwrap();
        assert_eq!(value, "hu*********et");
        assert_eq!(*origin, Origin::File);
    }

    #[test]
    fn test_store_loads_once_under_concurrency() {
        let mut file = tempfile::Builder::new()
            .suffix(".properties")
            .tempfile()
            .unwrap();
        writeln!(file, "base.url=https://api.example.test").unwrap();
        writeln!(file, "db.type=mysql").unwrap();

        let store = ConfigStore::new(ConfigSource {
            path: Some(file.path().to_path_buf()),
            overrides: Vec::new(),
        });

        let configs: Vec<Arc<Config>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| store.get().unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(configs.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(configs[0].base_url().as_deref(), Some("https://api.example.test"));
    }

    #[test]
    fn test_store_unreadable_file_is_fatal() {
        let store = ConfigStore::new(ConfigSource {
            path: Some(PathBuf::from("/nonexistent/dir/application.properties")),
            overrides: Vec::new(),
        });
        let err = store.get().unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
        assert!(!store.is_loaded());
    }
}
