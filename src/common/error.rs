//! Error types for the contract harness
//!
//! Messages name both the expected and the actual value wherever a
//! comparison is involved, so a failed scenario explains itself in the log.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed cause reported by a SQL backend
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration file '{path}': {reason}")]
    ConfigParse { path: String, reason: String },

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Connection Errors ===
    #[error("Database connection to '{url}' failed: {message}")]
    Connection { url: String, message: String },

    #[error("No database connection is open. Tag the scenario with @database or call connect() first")]
    NotConnected,

    #[error("Unsupported database type: {0}. Supported: mysql, postgresql")]
    UnsupportedDatabase(String),

    #[error("Database operation failed: {operation}: {source}")]
    Database {
        operation: String,
        #[source]
        source: BackendError,
    },

    // === Request Errors ===
    #[error("{method} {url} failed: {message}")]
    Transport {
        method: String,
        url: String,
        message: String,
    },

    #[error("Failed to decode response as {target}: {reason}")]
    Decode { target: String, reason: String },

    // === Validation Errors ===
    #[error("Expected status code: {expected}, but got: {actual}. Response: {body}")]
    StatusMismatch {
        expected: u16,
        actual: u16,
        body: String,
    },

    #[error("Field '{field}' mismatch: expected {expected}, got {actual}")]
    FieldMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Assertion failed: {0}")]
    Assertion(String),

    // === Artifact Errors ===
    #[error("Failed to persist artifact '{}': {source}", .path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid scenario file '{path}': {reason}")]
    Scenario { path: String, reason: String },

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by the lifecycle layer to decide what a
/// failure is allowed to abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Aborts the whole run
    Configuration,
    /// Fails the scenario that needed the database
    Connection,
    /// Transport or decoding failure, reported as a failed assertion
    Request,
    /// Expected vs actual mismatch
    Validation,
    /// Logged, never escalated
    Artifact,
    Other,
}

impl Error {
    /// Classify this error into the harness taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_)
            | Error::ConfigParse { .. }
            | Error::FileRead { .. }
            | Error::Scenario { .. } => ErrorKind::Configuration,
            Error::Connection { .. }
            | Error::NotConnected
            | Error::UnsupportedDatabase(_)
            | Error::Database { .. } => ErrorKind::Connection,
            Error::Transport { .. } | Error::Decode { .. } | Error::Json(_) => ErrorKind::Request,
            Error::StatusMismatch { .. } | Error::FieldMismatch { .. } | Error::Assertion(_) => {
                ErrorKind::Validation
            }
            Error::Artifact { .. } => ErrorKind::Artifact,
            Error::Io(_) | Error::Internal(_) => ErrorKind::Other,
        }
    }

    /// Create a database operation error from a backend cause
    pub fn database(operation: impl Into<String>, source: impl Into<BackendError>) -> Self {
        Self::Database {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Create a field mismatch error, rendering both sides as JSON
    pub fn field_mismatch(
        field: &str,
        expected: &serde_json::Value,
        actual: &serde_json::Value,
    ) -> Self {
        Self::FieldMismatch {
            field: field.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create a decode error for the given target type
    pub fn decode<T: ?Sized>(reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            target: short_type_name::<T>().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an artifact error for a path
    pub fn artifact(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Artifact {
            path: path.into(),
            source,
        }
    }
}

/// Last path segment of a type name (`harness::resources::User` -> `User`)
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
