use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use media_mender_core::{DedupeReport, ProgressReporter, RepairOutcome, RepairStatus, RunSummary};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Scan phase: spinner (unknown total files upfront)
/// - Repair phase: progress bar, with a line per file that was not valid
/// - Dedupe phase: plain status lines, so the confirmation prompt stays readable
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn bar(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.bar();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.bar().take() {
            pb.finish_and_clear();
        }
    }

    /// Print above the bar when one is active.
    fn println(&self, line: String) {
        match self.bar().as_ref() {
            Some(pb) => pb.println(line),
            None => eprintln!("{}", line),
        }
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(TICK_CHARS)
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "  {spinner:.cyan} Checking [{bar:30.cyan/dim}] {pos}/{len} files ({eta} remaining)",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("━╸─")
    .tick_chars(TICK_CHARS)
}

impl ProgressReporter for CliReporter {
    fn on_scan_start(&self, root: &str) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(spinner_style());
        pb.set_message(format!("Scanning {}...", root));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_scan_complete(&self, total_files: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  {} Scan complete: {} media files in {:.2}s",
            "✓".green(),
            total_files,
            duration_secs
        );
    }

    fn on_repair_start(&self, total_files: usize) {
        let pb = ProgressBar::new(total_files as u64);
        pb.set_style(bar_style());
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_file_outcome(&self, outcome: &RepairOutcome) {
        let path = outcome.path.display();
        let line = match outcome.status {
            RepairStatus::Valid => return,
            RepairStatus::Repaired => format!("  {} {}", "repaired".yellow(), path),
            RepairStatus::Corrupt => format!("  {} {}: {}", "corrupt".red(), path, outcome.message()),
            RepairStatus::Skipped => format!("  {} {}", "skipped".dimmed(), path),
        };
        self.println(line);
    }

    fn on_repair_progress(&self, processed: usize, total: usize) {
        if let Some(pb) = self.bar().as_ref() {
            if pb.length() != Some(total as u64) {
                pb.set_length(total as u64);
            }
            pb.set_position(processed as u64);
        }
    }

    fn on_repair_complete(&self, summary: &RunSummary, aborted: bool) {
        self.finish_bar();
        if aborted {
            eprintln!(
                "  {} Repair pass cancelled after {} of {} files",
                "✗".red(),
                summary.processed,
                summary.total
            );
        } else {
            eprintln!(
                "  {} Repair pass complete: {} files checked",
                "✓".green(),
                summary.processed
            );
        }
    }

    fn on_dedupe_start(&self, files: usize) {
        eprintln!("  Looking for duplicates among {} files...", files);
    }

    fn on_dedupe_complete(&self, report: &DedupeReport) {
        eprintln!(
            "  {} Duplicate pass complete: {} groups, {} deleted, {} failed",
            "✓".green(),
            report.groups,
            report.deleted,
            report.failed
        );
    }
}
