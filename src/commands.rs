//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::common::config::parse_override;

/// Options accepted by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration file (.properties or .toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override a configuration key; repeatable: -D base.url=http://localhost:8080
    #[arg(short = 'D', global = true, value_name = "KEY=VALUE", value_parser = parse_override)]
    pub overrides: Vec<(String, String)>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run scenario files (or every *.yaml / *.yml in a directory)
    Run {
        /// Scenario files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Only run scenarios matching this tag expression,
        /// e.g. "@smoke or @regression and not @wip"
        #[arg(long)]
        tags: Option<String>,

        /// Worker threads (default: thread.count, or 1 when parallel.execution is false)
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Print the effective configuration with secrets masked
    Config,

    /// Delete artifacts older than the retention period
    Cleanup {
        /// Retention in days (default: artifact.retention.days)
        #[arg(long)]
        days: Option<u64>,
    },

    /// Connect to the configured database and run the liveness probe
    DbCheck,
}
