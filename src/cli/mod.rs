//! CLI command handling
//!
//! Dispatches CLI commands and formats output. Every handler returns
//! whether the command succeeded; hard errors propagate to `main`.

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;

use crate::artifact::ArtifactStore;
use crate::commands::Commands;
use crate::common::{Config, Result};
use crate::db::ConnectionManager;
use crate::harness::Harness;
use crate::scenario::{self, ScenarioReport, TagExpr};

/// Dispatch a CLI command
pub fn dispatch(command: Commands, config: Arc<Config>) -> Result<bool> {
    match command {
        Commands::Run { paths, tags, threads } => run(config, &paths, tags.as_deref(), threads),
        Commands::Config => {
            show_config(&config);
            Ok(true)
        }
        Commands::Cleanup { days } => {
            cleanup(&config, days);
            Ok(true)
        }
        Commands::DbCheck => db_check(&config),
    }
}

fn run(config: Arc<Config>, paths: &[PathBuf], tags: Option<&str>, threads: Option<usize>) -> Result<bool> {
    let filter = match tags {
        Some(expr) => TagExpr::parse(expr)?,
        None => TagExpr::any(),
    };

    let selected: Vec<_> = scenario::load_all(paths)?
        .into_iter()
        .filter(|(_, definition)| filter.matches(&definition.info().tags[..]))
        .collect();

    if selected.is_empty() {
        println!("{} no scenarios match {}", "Nothing to run:".yellow(), filter);
        return Ok(true);
    }

    let workers = threads.unwrap_or_else(|| config.worker_count()).max(1);
    let harness = Arc::new(Harness::from_config(Arc::clone(&config))?);
    let jobs: Vec<_> = selected
        .into_iter()
        .map(|(path, definition)| {
            tracing::debug!(path = %path.display(), scenario = %definition.name, "Scenario loaded");
            harness.job(definition)
        })
        .collect();

    println!(
        "\n{} {} scenario(s) on {} worker(s) against {}",
        "Running".blue().bold(),
        jobs.len(),
        workers,
        harness.executor().request_template().base_uri.white().bold()
    );

    let reports = harness.coordinator(workers).run_all(&jobs);
    if let Some(db) = harness.db() {
        db.disconnect();
    }

    print_summary(&reports);
    Ok(reports.iter().all(ScenarioReport::passed))
}

fn print_summary(reports: &[ScenarioReport]) {
    println!();
    for report in reports {
        let millis = report.duration.as_millis();
        if report.passed() {
            println!(
                "  {} {} {}",
                "✓".green(),
                report.info.name,
                format!("({millis}ms)").dimmed()
            );
        } else {
            println!(
                "  {} {} {}",
                "✗".red(),
                report.info.name,
                format!("({millis}ms)").dimmed()
            );
            if let Some(error) = &report.error {
                println!("      {}", error.red());
            }
        }
        if let Some(path) = &report.artifact {
            println!("      {}", path.display().to_string().dimmed());
        }
    }

    let passed = reports.iter().filter(|r| r.passed()).count();
    let failed = reports.len() - passed;
    println!();
    if failed == 0 {
        println!("{} {} passed", "✓".green().bold(), passed.to_string().green().bold());
    } else {
        println!(
            "{} {} passed, {} failed",
            "✗".red().bold(),
            passed,
            failed.to_string().red().bold()
        );
    }
}

fn show_config(config: &Config) {
    match config.source() {
        Some(path) => println!("{} {}", "Configuration:".cyan(), path.display()),
        None => println!("{} built-in defaults", "Configuration:".cyan()),
    }
    let entries = config.masked_entries();
    let width = entries.iter().map(|(key, _, _)| key.len()).max().unwrap_or(0);
    for (key, value, origin) in entries {
        println!(
            "  {:<width$}  {}  {}",
            key,
            value,
            format!("[{origin}]").dimmed(),
            width = width
        );
    }
}

fn cleanup(config: &Config, days: Option<u64>) {
    let days = days.unwrap_or_else(|| config.retention_days());
    let store = ArtifactStore::new(config.local_storage_path());

    let mut deleted = 0;
    let mut failed = 0;
    for dir in [store.root().to_path_buf(), store.responses_dir()] {
        let report = store.cleanup_older_than(&dir, days);
        deleted += report.deleted.len();
        failed += report.failed.len();
    }

    println!(
        "{} {} file(s) older than {} day(s) deleted from {}",
        "Cleanup:".cyan(),
        deleted,
        days,
        store.root().display()
    );
    if failed > 0 {
        println!("  {} {} file(s) could not be deleted", "!".yellow(), failed);
    }
}

fn db_check(config: &Config) -> Result<bool> {
    let manager = ConnectionManager::from_config(config)?;
    let settings = manager.settings();
    println!(
        "{} {} at {}:{}",
        "Database:".cyan(),
        settings.dialect,
        settings.host,
        settings.port
    );

    manager.connect()?;
    let alive = manager.is_connected();
    manager.disconnect();

    if alive {
        println!("  {} connection is alive", "✓".green());
    } else {
        println!("  {} liveness probe failed", "✗".red());
    }
    Ok(alive)
}
