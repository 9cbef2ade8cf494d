//! Contract harness CLI
//!
//! Runs YAML API scenarios against a configured service, cross-checks the
//! database, and records per-scenario artifacts.

use std::process::ExitCode;

use clap::Parser;
use harness::commands::{Commands, GlobalArgs};
use harness::common::{logging, ConfigSource, ConfigStore, ErrorKind};
use harness::cli;

#[derive(Parser)]
#[command(name = "harness", about = "API contract-verification harness")]
#[command(version, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let store = ConfigStore::new(ConfigSource {
        path: cli.global.config.clone(),
        overrides: cli.global.overrides.clone(),
    });
    let config = match store.get() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(2);
        }
    };

    let _guard = logging::init(&config.log_level(), Some(&config.log_file_path()));

    match cli::dispatch(cli.command, config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "Run aborted");
            eprintln!("Error: {e}");
            if e.kind() == ErrorKind::Configuration {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
