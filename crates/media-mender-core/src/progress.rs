use crate::analysis::duplicates::DedupeReport;
use crate::model::RepairOutcome;
use crate::scheduler::RunSummary;

/// Trait for reporting run progress.
///
/// The CLI implements it with tracing/indicatif. Every call is made from the
/// thread driving the run, never from a worker. All methods have default
/// no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self, _root: &str) {}
    fn on_scan_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_repair_start(&self, _total_files: usize) {}
    fn on_file_outcome(&self, _outcome: &RepairOutcome) {}
    fn on_repair_progress(&self, _processed: usize, _total: usize) {}
    fn on_repair_complete(&self, _summary: &RunSummary, _aborted: bool) {}
    fn on_dedupe_start(&self, _files: usize) {}
    fn on_dedupe_complete(&self, _report: &DedupeReport) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Asked once per run before any duplicate is deleted.
pub trait DeletionConfirmer: Send + Sync {
    fn confirm_deletion(&self, count: usize) -> bool;
}

/// Confirmer with a fixed answer, for unattended runs (`--yes`) and tests.
pub struct FixedConfirmer(pub bool);

impl DeletionConfirmer for FixedConfirmer {
    fn confirm_deletion(&self, _count: usize) -> bool {
        self.0
    }
}
