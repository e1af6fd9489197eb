use crate::analysis::duplicates::{self, DedupeReport};
use crate::backup::BackupManager;
use crate::cancel::CancelToken;
use crate::config::{self, AppConfig};
use crate::error::Error;
use crate::model::{FileEntry, RepairOutcome};
use crate::progress::{DeletionConfirmer, ProgressReporter};
use crate::repair::Strategies;
use crate::scanner;
use crate::scheduler::{RepairContext, RunSummary, Scheduler};
use crate::storage::Database;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Wires scanner, scheduler, audit log and duplicate resolver together for
/// one run. Progress, confirmation and cancellation are injected.
pub struct RepairEngine {
    config: AppConfig,
    strategies: Strategies,
    cancel: CancelToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Complete,
    Aborted,
}

#[derive(Debug)]
pub struct RunReport {
    pub status: RunStatus,
    pub summary: RunSummary,
    pub duplicates: Option<DedupeReport>,
    pub outcomes: Vec<RepairOutcome>,
    pub scan_duration: Duration,
    pub repair_duration: Duration,
    pub dedupe_duration: Duration,
}

impl RepairEngine {
    pub fn new(config: AppConfig) -> Self {
        let strategies = Strategies::with_ffprobe(&config.ffprobe_path);
        Self {
            config,
            strategies,
            cancel: CancelToken::new(),
        }
    }

    /// Replace the default image/ffprobe strategies.
    pub fn with_strategies(mut self, strategies: Strategies) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle for requesting cancellation from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the full pipeline:
    /// 1. Scan the root for files matching the type filter
    /// 2. Verify/repair every file on the bounded worker pool, writing the audit log
    /// 3. Optionally find and delete byte-identical duplicates
    ///
    /// Only fatal problems (bad root, pool creation) return `Err`; everything
    /// per-file ends up in the report.
    pub fn run(
        &self,
        reporter: &dyn ProgressReporter,
        confirmer: &dyn DeletionConfirmer,
    ) -> Result<RunReport, Error> {
        let root = self.root()?;
        let scheduler = Scheduler::new(self.config.worker_count())?;

        // Phase 1: Scan
        info!("Scanning {} for {:?}...", root.display(), self.config.file_types);
        let scan_start = Instant::now();
        let entries = self.scan(&root, reporter)?;
        let scan_duration = scan_start.elapsed();

        // Phase 2: Verify and repair
        let backup = BackupManager::new(self.config.backup);
        info!(
            "Checking {} files with {} workers (backup {})...",
            entries.len(),
            scheduler.workers(),
            if backup.is_enabled() { "on" } else { "off" }
        );
        let audit = self.open_audit_log();
        let ctx = Arc::new(RepairContext {
            strategies: self.strategies.clone(),
            backup,
            audit: audit.clone(),
        });

        let repair_start = Instant::now();
        reporter.on_repair_start(entries.len());
        let outcome = scheduler.run(&entries, &ctx, reporter, &self.cancel);
        let repair_duration = repair_start.elapsed();
        reporter.on_repair_complete(&outcome.summary, outcome.aborted);

        let summary = outcome.summary;
        info!(
            "Repair pass {}: {} processed of {}, {} valid, {} repaired, {} corrupt, {} skipped",
            if outcome.aborted { "aborted" } else { "complete" },
            summary.processed,
            summary.total,
            summary.valid,
            summary.repaired,
            summary.corrupt,
            summary.skipped,
        );

        if outcome.aborted {
            return Ok(RunReport {
                status: RunStatus::Aborted,
                summary,
                duplicates: None,
                outcomes: outcome.outcomes,
                scan_duration,
                repair_duration,
                dedupe_duration: Duration::ZERO,
            });
        }

        // Phase 3: Duplicates
        let dedupe_start = Instant::now();
        let mut status = RunStatus::Complete;
        let duplicates = if self.config.find_duplicates {
            let report = self.dedupe_entries(&entries, reporter, confirmer, audit.as_deref());
            if report.is_none() {
                status = RunStatus::Aborted;
            }
            report
        } else {
            None
        };

        Ok(RunReport {
            status,
            summary,
            duplicates,
            outcomes: outcome.outcomes,
            scan_duration,
            repair_duration,
            dedupe_duration: dedupe_start.elapsed(),
        })
    }

    /// Duplicate pass only, without verification or repair.
    /// Returns `Error::Cancelled` when cancelled before deletion.
    pub fn dedupe(
        &self,
        reporter: &dyn ProgressReporter,
        confirmer: &dyn DeletionConfirmer,
    ) -> Result<DedupeReport, Error> {
        let root = self.root()?;
        let entries = self.scan(&root, reporter)?;
        let audit = self.open_audit_log();
        self.dedupe_entries(&entries, reporter, confirmer, audit.as_deref())
            .ok_or(Error::Cancelled)
    }

    fn root(&self) -> Result<PathBuf, Error> {
        let root = self
            .config
            .root_path
            .as_deref()
            .ok_or_else(|| Error::Other("no root path configured".to_string()))?;
        config::validate_root(root)?;
        Ok(PathBuf::from(root))
    }

    fn scan(&self, root: &Path, reporter: &dyn ProgressReporter) -> Result<Vec<FileEntry>, Error> {
        let start = Instant::now();
        reporter.on_scan_start(&root.to_string_lossy());
        let entries = scanner::scan_directory(root, self.config.file_types)?;
        let secs = start.elapsed().as_secs_f64();
        reporter.on_scan_complete(entries.len(), secs);
        debug!("Scan completed in {:.2}s, {} files", secs, entries.len());
        Ok(entries)
    }

    /// A broken audit database degrades durable logging but never stops a run.
    fn open_audit_log(&self) -> Option<Arc<Database>> {
        match Database::open(&self.config.db_path) {
            Ok(db) => Some(Arc::new(db)),
            Err(e) => {
                warn!(
                    "Audit log {} unavailable, continuing without it: {}",
                    self.config.db_path, e
                );
                None
            }
        }
    }

    /// `None` when cancelled before any deletion happened.
    fn dedupe_entries(
        &self,
        entries: &[FileEntry],
        reporter: &dyn ProgressReporter,
        confirmer: &dyn DeletionConfirmer,
        audit: Option<&Database>,
    ) -> Option<DedupeReport> {
        if self.cancel.is_cancelled() {
            return None;
        }

        // Files may have vanished or been rewritten during the repair pass.
        let paths: Vec<PathBuf> = entries
            .iter()
            .filter(|e| e.path.is_file())
            .map(|e| e.path.clone())
            .collect();

        info!("Looking for duplicates among {} files...", paths.len());
        reporter.on_dedupe_start(paths.len());
        let groups = duplicates::find_duplicates(&paths);

        if self.cancel.is_cancelled() {
            info!("Cancellation requested, duplicate deletion skipped");
            return None;
        }

        let report = duplicates::resolve_duplicates(&groups, confirmer, audit);
        reporter.on_dedupe_complete(&report);
        Some(report)
    }
}
