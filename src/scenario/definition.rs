//! Scenario file format
//!
//! Scenarios are YAML documents deserialized with serde.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use super::coordinator::ScenarioInfo;
use crate::common::{Error, Result};

/// A complete scenario loaded from a YAML file
#[derive(Deserialize, Debug, Clone)]
pub struct ScenarioDefinition {
    pub name: String,
    pub description: Option<String>,
    /// Tags with or without the leading `@`
    #[serde(default)]
    pub tags: Vec<String>,
    pub steps: Vec<Step>,
}

impl ScenarioDefinition {
    pub fn info(&self) -> ScenarioInfo {
        ScenarioInfo::new(self.name.clone(), &self.tags)
    }
}

/// One step; the `action` key selects the variant
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Send a raw request
    Request {
        method: String,
        path: String,
        #[serde(default)]
        path_params: BTreeMap<String, Value>,
        #[serde(default)]
        query: BTreeMap<String, Value>,
        body: Option<Value>,
        /// Capture the response body under `responses/` with this base name
        save_response: Option<String>,
        expect: Option<ResponseExpectation>,
    },
    /// Create a user and validate the echo
    CreateUser { user: Value },
    /// Create a post and validate the echo
    CreatePost { post: Value },
    /// Best-effort existence probe
    ExpectExists {
        resource: ResourceKind,
        id: Value,
        #[serde(default = "default_true")]
        exists: bool,
    },
    /// `SELECT COUNT(*) FROM <table> WHERE <where>` must be non-zero (or zero)
    DbRecordExists {
        table: String,
        #[serde(rename = "where")]
        predicate: String,
        #[serde(default)]
        params: Vec<Value>,
        #[serde(default = "default_true")]
        expect: bool,
    },
    /// Compare columns of the first row a query returns
    DbRowMatches {
        query: String,
        #[serde(default)]
        params: Vec<Value>,
        fields: BTreeMap<String, Value>,
    },
    /// Check the status of the last response
    ExpectStatus { status: u16 },
}

impl Step {
    pub fn describe(&self) -> String {
        match self {
            Step::Request { method, path, .. } => format!("{} {}", method.to_uppercase(), path),
            Step::CreateUser { .. } => "create user".to_string(),
            Step::CreatePost { .. } => "create post".to_string(),
            Step::ExpectExists { resource, id, exists } => {
                format!("expect {}/{} exists={}", resource.as_str(), render(id), exists)
            }
            Step::DbRecordExists { table, predicate, .. } => format!("db record in {table} where {predicate}"),
            Step::DbRowMatches { query, .. } => format!("db row matches: {query}"),
            Step::ExpectStatus { status } => format!("expect status {status}"),
        }
    }
}

pub(crate) fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn default_true() -> bool {
    true
}

/// Expectations on a response
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ResponseExpectation {
    pub status: Option<u16>,
    /// Substring of the raw body
    pub body_contains: Option<String>,
    /// Dotted JSON paths and their expected values
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Users,
    Posts,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Posts => "posts",
        }
    }
}

/// Load a single scenario file
pub fn load(path: &Path) -> Result<ScenarioDefinition> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    serde_yaml::from_str(&content).map_err(|e| Error::Scenario {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn is_scenario_file(path: &Path) -> bool {
    path.is_file()
        && matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        )
}

/// Load scenarios from files and directories
///
/// Directories contribute every `*.yaml`/`*.yml` file directly inside them,
/// sorted by path. Any unreadable or malformed file fails the whole load.
pub fn load_all(paths: &[PathBuf]) -> Result<Vec<(PathBuf, ScenarioDefinition)>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let entries = std::fs::read_dir(path).map_err(|e| Error::FileRead {
                path: path.display().to_string(),
                error: e.to_string(),
            })?;
            let mut found: Vec<PathBuf> = entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|p| is_scenario_file(p))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }

    files
        .into_iter()
        .map(|file| load(&file).map(|def| (file, def)))
        .collect()
}
