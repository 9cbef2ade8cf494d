//! Common utilities shared by every harness component

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use config::{Config, ConfigSource, ConfigStore};
pub use error::{Error, ErrorKind, Result};
