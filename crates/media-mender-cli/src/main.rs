mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::path::Path;
use std::process;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, TreeArgs};
use dotenv::dotenv;
use media_mender_core::storage::{AuditRecord, Database};
use media_mender_core::{
    AppConfig, DedupeReport, DeletionConfirmer, RepairEngine, RepairStatus, RunStatus,
};
use progress::CliReporter;
use tracing::{error, info, warn};

/// Exit code for a run stopped by Ctrl-C.
const EXIT_CANCELLED: i32 = 130;

fn main() {
    dotenv().ok();

    let guard = logging::init_logger();
    let args = Cli::parse();

    let code = match media_mender_core::config::load_configuration() {
        Ok(config) => match run(args, config) {
            Ok(code) => code,
            Err(err) => {
                error!("Error: {:#}", err);
                1
            }
        },
        Err(err) => {
            error!("Error loading configuration: {}", err);
            1
        }
    };

    // process::exit skips destructors; flush the file log first.
    drop(guard);
    process::exit(code);
}

fn run(args: Cli, mut config: AppConfig) -> Result<i32> {
    match args.command {
        Some(Commands::Repair {
            tree,
            no_backup,
            workers,
            dedupe,
        }) => {
            apply_tree_args(&mut config, &tree);
            if no_backup {
                config.backup = false;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if dedupe {
                config.find_duplicates = true;
            }
            run_repair(config, tree.yes)
        }
        Some(Commands::Dedupe { tree }) => {
            apply_tree_args(&mut config, &tree);
            run_dedupe(config, tree.yes)
        }
        Some(Commands::Report {
            status,
            limit,
            csv,
            db,
        }) => {
            let db_path = db.unwrap_or(config.db_path);
            run_report(&db_path, status, limit, csv.as_deref())?;
            Ok(0)
        }
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
            Ok(0)
        }
        Some(Commands::TruncateDb { db }) => {
            let db_path = db.unwrap_or(config.db_path);
            let prompt = format!(
                "Are you SURE you want to delete every audit row in {}?",
                db_path
            );
            if prompt_confirm(&prompt, Some(false))? {
                let db = Database::open(&db_path)
                    .with_context(|| format!("opening audit log {}", db_path))?;
                db.truncate_all().context("truncating audit log")?;
                println!("Audit log truncated");
            }
            Ok(0)
        }
        None => {
            Cli::command().print_long_help()?;
            Ok(0)
        }
    }
}

fn apply_tree_args(config: &mut AppConfig, tree: &TreeArgs) {
    if let Some(path) = &tree.path {
        config.root_path = Some(path.clone());
    }
    if let Some(types) = tree.types {
        config.file_types = types;
    }
    if let Some(db) = &tree.db {
        config.db_path = db.clone();
    }
}

/// Ctrl-C raises the engine's cancel token; in-flight files still finish.
fn install_cancel_handler(engine: &RepairEngine) -> Result<()> {
    let token = engine.cancel_token();
    ctrlc::set_handler(move || {
        if !token.is_cancelled() {
            eprintln!(
                "\n{}",
                "Cancelling, waiting for in-flight files to finish...".yellow()
            );
        }
        token.cancel();
    })
    .context("installing Ctrl-C handler")
}

fn run_repair(config: AppConfig, assume_yes: bool) -> Result<i32> {
    let engine = RepairEngine::new(config);
    install_cancel_handler(&engine)?;

    let reporter = CliReporter::new();
    let confirmer = PromptConfirmer { assume_yes };
    let report = engine.run(&reporter, &confirmer)?;

    let summary = report.summary;
    println!();
    info!(
        "Scan: {}, Repair: {}, Dedupe: {}",
        format!("{:.2}s", report.scan_duration.as_secs_f64()).green(),
        format!("{:.2}s", report.repair_duration.as_secs_f64()).green(),
        format!("{:.2}s", report.dedupe_duration.as_secs_f64()).green(),
    );
    info!(
        "{} processed of {}: {} valid, {} repaired, {} corrupt, {} skipped",
        summary.processed,
        summary.total,
        format!("{}", summary.valid).green(),
        format!("{}", summary.repaired).yellow(),
        format!("{}", summary.corrupt).red(),
        format!("{}", summary.skipped).dimmed(),
    );
    if let Some(dupes) = &report.duplicates {
        print_dedupe_report(dupes);
    }

    match report.status {
        RunStatus::Complete => Ok(0),
        RunStatus::Aborted => {
            warn!(
                "Run cancelled, {} files were never checked",
                summary.total - summary.processed
            );
            Ok(EXIT_CANCELLED)
        }
    }
}

fn run_dedupe(config: AppConfig, assume_yes: bool) -> Result<i32> {
    let engine = RepairEngine::new(config);
    install_cancel_handler(&engine)?;

    let reporter = CliReporter::new();
    let confirmer = PromptConfirmer { assume_yes };
    match engine.dedupe(&reporter, &confirmer) {
        Ok(report) => {
            print_dedupe_report(&report);
            Ok(0)
        }
        Err(media_mender_core::Error::Cancelled) => {
            warn!("Duplicate pass cancelled, nothing deleted");
            Ok(EXIT_CANCELLED)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_dedupe_report(report: &DedupeReport) {
    info!(
        "{} duplicate groups, {} copies, {} deleted ({} bytes reclaimed), {} failed, {} changed since detection",
        format!("{}", report.groups).cyan(),
        format!("{}", report.candidates).cyan(),
        format!("{}", report.deleted).red(),
        report.reclaimed_bytes,
        report.failed,
        report.skipped,
    );
    if report.candidates > 0 && !report.confirmed {
        info!("Deletion declined, all copies kept");
    }
}

fn run_report(
    db_path: &str,
    status: Option<RepairStatus>,
    limit: i64,
    csv_path: Option<&Path>,
) -> Result<()> {
    let db = Database::open(db_path).with_context(|| format!("opening audit log {}", db_path))?;
    let records = db
        .list_records(status, 0, limit)
        .context("reading audit log")?;

    if let Some(csv_path) = csv_path {
        write_csv(csv_path, &records)?;
        println!("{} rows written to {}", records.len(), csv_path.display());
        return Ok(());
    }

    for record in &records {
        let status = match record.status.as_str() {
            "valid" => record.status.green(),
            "repaired" => record.status.yellow(),
            "corrupt" => record.status.red(),
            _ => record.status.dimmed(),
        };
        println!(
            "{:<9} {:<6} {:>12} {}  {}",
            status,
            record.file_type,
            record.file_size.map(|s| s.to_string()).unwrap_or_default(),
            record.path,
            record.error_message.as_deref().unwrap_or("")
        );
    }

    let counts = db.status_counts().context("counting audit rows")?;
    let counts: Vec<String> = counts
        .iter()
        .map(|(status, count)| format!("{} {}", count, status))
        .collect();
    println!(
        "\n{} of {} rows shown ({})",
        records.len(),
        db.count_records().context("counting audit rows")?,
        counts.join(", ")
    );
    Ok(())
}

fn write_csv(path: &Path, records: &[AuditRecord]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    writer.write_record([
        "path",
        "file_type",
        "status",
        "checksum",
        "timestamp",
        "file_size",
        "error_message",
    ])?;
    for record in records {
        let file_size = record.file_size.map(|s| s.to_string()).unwrap_or_default();
        writer.write_record([
            record.path.as_str(),
            record.file_type.as_str(),
            record.status.as_str(),
            record.checksum.as_deref().unwrap_or(""),
            record.timestamp.as_str(),
            file_size.as_str(),
            record.error_message.as_deref().unwrap_or(""),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Asks once on the terminal before duplicates are deleted.
struct PromptConfirmer {
    assume_yes: bool,
}

impl DeletionConfirmer for PromptConfirmer {
    fn confirm_deletion(&self, count: usize) -> bool {
        if self.assume_yes {
            return true;
        }
        let prompt = format!("Delete {} duplicate files?", count);
        match prompt_confirm(&prompt, Some(false)) {
            Ok(answer) => answer,
            Err(e) => {
                error!("Could not read confirmation: {}", e);
                false
            }
        }
    }
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        // EOF counts as the default answer
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(default.unwrap_or(false));
        }

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
