use crate::backup::BackupManager;
use crate::cancel::CancelToken;
use crate::error::Error;
use crate::model::{FileEntry, RepairOutcome, RepairStatus};
use crate::progress::ProgressReporter;
use crate::repair::Strategies;
use crate::storage::Database;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Aggregate counts for one run. Every field is a plain count, so the
/// totals do not depend on completion order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
    pub valid: usize,
    pub repaired: usize,
    pub corrupt: usize,
    pub skipped: usize,
}

/// Mutable run state. Owned by the consumer loop in `Scheduler::run` only.
#[derive(Debug)]
struct RunState {
    cancel_requested: bool,
    summary: RunSummary,
}

impl RunState {
    fn new(total: usize) -> Self {
        Self {
            cancel_requested: false,
            summary: RunSummary {
                total,
                ..RunSummary::default()
            },
        }
    }

    fn record(&mut self, outcome: &RepairOutcome) {
        let summary = &mut self.summary;
        summary.processed += 1;
        match outcome.status {
            RepairStatus::Valid => summary.valid += 1,
            RepairStatus::Repaired => summary.repaired += 1,
            RepairStatus::Corrupt => summary.corrupt += 1,
            RepairStatus::Skipped => summary.skipped += 1,
        }
        debug_assert!(summary.processed <= summary.total);
    }
}

/// Everything a worker needs to process one file.
pub struct RepairContext {
    pub strategies: Strategies,
    pub backup: BackupManager,
    pub audit: Option<Arc<Database>>,
}

/// Result of a scheduler pass.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub aborted: bool,
    pub submitted: usize,
    pub outcomes: Vec<RepairOutcome>,
}

impl RunOutcome {
    /// Entries never handed to a worker because the run was cancelled.
    pub fn unsubmitted(&self) -> usize {
        self.summary.total - self.submitted
    }
}

/// Immutable event sent from a worker to the consumer loop.
enum WorkerEvent {
    Finished(RepairOutcome),
}

/// Bounded worker pool dispatching files to their repair strategy.
pub struct Scheduler {
    pool: ThreadPool,
    workers: usize,
}

impl Scheduler {
    pub fn new(workers: usize) -> Result<Self, Error> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("mender-worker-{}", i))
            .build()
            .map_err(|e| Error::SchedulerFatal(e.to_string()))?;
        debug!("Worker pool ready with {} threads", workers);
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process `entries` in scan order with at most `workers` units in flight.
    ///
    /// Cancellation is checked before each submission and before each
    /// completed result is accepted. Once seen, nothing new is submitted but
    /// every in-flight unit is drained and recorded.
    pub fn run(
        &self,
        entries: &[FileEntry],
        ctx: &Arc<RepairContext>,
        reporter: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> RunOutcome {
        let total = entries.len();
        let (tx, rx) = mpsc::channel::<WorkerEvent>();
        let mut state = RunState::new(total);
        let mut outcomes = Vec::with_capacity(total);
        let mut next = 0usize;
        let mut in_flight = 0usize;

        loop {
            while in_flight < self.workers && next < total && !state.cancel_requested {
                if cancel.is_cancelled() {
                    info!("Cancellation requested, no further files will be submitted");
                    state.cancel_requested = true;
                    break;
                }

                let entry = entries[next].clone();
                let ctx = Arc::clone(ctx);
                let tx = tx.clone();
                self.pool.spawn(move || {
                    let outcome = process_unit(&ctx, &entry);
                    // The receiver outlives every worker; a send error means the run was torn down.
                    let _ = tx.send(WorkerEvent::Finished(outcome));
                });
                next += 1;
                in_flight += 1;
            }

            if in_flight == 0 {
                break;
            }

            let WorkerEvent::Finished(outcome) = match rx.recv() {
                Ok(event) => event,
                Err(e) => {
                    error!("Worker channel closed unexpectedly: {}", e);
                    break;
                }
            };
            in_flight -= 1;

            if !state.cancel_requested && cancel.is_cancelled() {
                info!(
                    "Cancellation requested, draining {} in-flight files",
                    in_flight
                );
                state.cancel_requested = true;
            }

            state.record(&outcome);
            reporter.on_file_outcome(&outcome);
            reporter.on_repair_progress(state.summary.processed, total);
            outcomes.push(outcome);
        }

        RunOutcome {
            summary: state.summary,
            aborted: state.cancel_requested,
            submitted: next,
            outcomes,
        }
    }
}

/// Runs on a worker thread. Never panics outward and never fails: a strategy
/// panic becomes a `Corrupt` outcome, an audit failure is logged.
fn process_unit(ctx: &RepairContext, entry: &FileEntry) -> RepairOutcome {
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| {
        ctx.strategies.process(entry, &ctx.backup)
    })) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("Worker panicked on {}: {}", entry.path.display(), reason);
            RepairOutcome::new(entry, RepairStatus::Corrupt)
                .with_error(format!("worker panicked: {}", reason))
        }
    };

    if let Some(audit) = &ctx.audit {
        if let Err(e) = audit.upsert(&outcome) {
            warn!("{}", e);
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MediaKind;
    use crate::repair::{MediaProbe, ProbeReport, RepairStrategy};
    use crate::progress::SilentReporter;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Sleeps a little, then reports every file valid; panics on "boom" files.
    struct SleepyStrategy {
        concurrent: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SleepyStrategy {
        fn new() -> Self {
            Self {
                concurrent: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl RepairStrategy for SleepyStrategy {
        fn media_kind(&self) -> MediaKind {
            MediaKind::Image
        }

        fn verify(&self, path: &Path) -> Result<(), Error> {
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            if path.to_string_lossy().contains("boom") {
                panic!("decoder exploded");
            }
            Ok(())
        }
    }

    struct NeverProbe;

    impl MediaProbe for NeverProbe {
        fn probe(&self, path: &Path) -> Result<ProbeReport, Error> {
            Err(Error::Probe {
                path: path.to_path_buf(),
                reason: "unused".to_string(),
            })
        }
    }

    fn entries(names: &[&str]) -> Vec<FileEntry> {
        names
            .iter()
            .map(|n| FileEntry::from_path(&PathBuf::from(format!("/virtual/{}", n))).unwrap())
            .collect()
    }

    fn context(strategy: Arc<SleepyStrategy>) -> Arc<RepairContext> {
        Arc::new(RepairContext {
            strategies: Strategies::new(
                strategy,
                Arc::new(crate::repair::VideoStrategy::new(Arc::new(NeverProbe))),
            ),
            backup: BackupManager::disabled(),
            audit: None,
        })
    }

    #[test]
    fn test_every_entry_yields_one_outcome() {
        let strategy = Arc::new(SleepyStrategy::new());
        let ctx = context(Arc::clone(&strategy));
        let names: Vec<String> = (0..20).map(|i| format!("img{}.jpg", i)).collect();
        let names: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let files = entries(&names);

        let scheduler = Scheduler::new(3).unwrap();
        let result = scheduler.run(&files, &ctx, &SilentReporter, &CancelToken::new());

        assert!(!result.aborted);
        assert_eq!(result.summary.processed, 20);
        assert_eq!(result.summary.valid, 20);
        assert_eq!(result.outcomes.len(), 20);
        assert!(strategy.peak.load(Ordering::SeqCst) <= 3);

        let mut seen: Vec<_> = result.outcomes.iter().map(|o| o.path.clone()).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 20);
    }

    #[test]
    fn test_panicking_strategy_is_recorded_as_corrupt() {
        let ctx = context(Arc::new(SleepyStrategy::new()));
        let files = entries(&["a.jpg", "boom.jpg", "c.jpg"]);

        let result = Scheduler::new(2)
            .unwrap()
            .run(&files, &ctx, &SilentReporter, &CancelToken::new());

        assert_eq!(result.summary.processed, 3);
        assert_eq!(result.summary.corrupt, 1);
        assert_eq!(result.summary.valid, 2);
    }

    /// Cancels the token after a fixed number of progress callbacks.
    struct CancelAfter {
        after: usize,
        token: CancelToken,
        progress: Mutex<Vec<usize>>,
    }

    impl ProgressReporter for CancelAfter {
        fn on_repair_progress(&self, processed: usize, _total: usize) {
            self.progress.lock().unwrap().push(processed);
            if processed == self.after {
                self.token.cancel();
            }
        }
    }

    #[test]
    fn test_cancellation_stops_submission_and_drains() {
        let ctx = context(Arc::new(SleepyStrategy::new()));
        let names: Vec<String> = (0..30).map(|i| format!("img{}.jpg", i)).collect();
        let names: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let files = entries(&names);

        let token = CancelToken::new();
        let reporter = CancelAfter {
            after: 2,
            token: token.clone(),
            progress: Mutex::new(Vec::new()),
        };

        let result = Scheduler::new(2).unwrap().run(&files, &ctx, &reporter, &token);

        assert!(result.aborted);
        assert!(result.submitted < 30);
        // Every submitted unit is drained and recorded
        assert_eq!(result.summary.processed, result.submitted);
        assert!(result.summary.processed >= 2);
        assert_eq!(result.unsubmitted(), 30 - result.submitted);

        let progress = reporter.progress.lock().unwrap();
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_cancel_before_start_processes_nothing() {
        let ctx = context(Arc::new(SleepyStrategy::new()));
        let files = entries(&["a.jpg", "b.jpg"]);
        let token = CancelToken::new();
        token.cancel();

        let result = Scheduler::new(2).unwrap().run(&files, &ctx, &SilentReporter, &token);
        assert!(result.aborted);
        assert_eq!(result.submitted, 0);
        assert_eq!(result.summary.processed, 0);
    }
}
