pub mod image;
pub mod layout;
pub mod video;

use crate::backup::BackupManager;
use crate::error::Error;
use crate::hasher;
use crate::model::{FileEntry, MediaKind, RepairOutcome, RepairStatus};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, trace};

pub use self::image::ImageStrategy;
pub use self::video::{FfprobeProbe, MediaProbe, ProbeReport, VideoStrategy};

/// States a file moves through during one pass.
///
/// `Unchecked → Valid`, `Unchecked → AttemptRepair → {Repaired | Corrupt}`,
/// `Unchecked → Corrupt` for strategies without repair, and
/// `Unchecked → Skipped` when the file cannot be inspected at all.
#[derive(Debug)]
enum RepairState {
    Unchecked,
    AttemptRepair(Error),
    Valid,
    Repaired(Error),
    Corrupt(Error),
    Skipped(String),
}

/// Type-specific verify/repair capability.
pub trait RepairStrategy: Send + Sync {
    fn media_kind(&self) -> MediaKind;

    /// `Err(reason)` when the file cannot be inspected by this strategy at all
    /// (e.g. no decoder for the format). Such files are skipped untouched.
    fn can_inspect(&self, _entry: &FileEntry) -> Result<(), String> {
        Ok(())
    }

    /// Structural validation. Must not modify the file.
    fn verify(&self, path: &Path) -> Result<(), Error>;

    fn supports_repair(&self) -> bool {
        false
    }

    /// Rewrite the file in place. Implementations call
    /// `backup.ensure_backup` before touching the original.
    fn repair(&self, path: &Path, _backup: &BackupManager) -> Result<(), Error> {
        Err(Error::UnsupportedOrInvalidFormat {
            path: path.to_path_buf(),
            reason: "in-place repair not supported".to_string(),
        })
    }

    /// Drive one file through the state machine and build its outcome.
    /// Never fails: every error ends up in the outcome.
    fn process(&self, entry: &FileEntry, backup: &BackupManager) -> RepairOutcome {
        let path = entry.path.as_path();
        let mut state = RepairState::Unchecked;

        let terminal = loop {
            state = match state {
                RepairState::Unchecked => match self.can_inspect(entry) {
                    Err(reason) => RepairState::Skipped(reason),
                    Ok(()) => match self.verify(path) {
                        Ok(()) => RepairState::Valid,
                        Err(err) if self.supports_repair() && is_repairable(&err) => {
                            RepairState::AttemptRepair(err)
                        }
                        Err(err) => RepairState::Corrupt(err),
                    },
                },
                RepairState::AttemptRepair(defect) => {
                    debug!("Attempting repair of {}: {}", path.display(), defect);
                    match self.repair(path, backup).and_then(|_| self.verify(path)) {
                        Ok(()) => RepairState::Repaired(defect),
                        Err(err) => RepairState::Corrupt(err),
                    }
                }
                done => break done,
            };
        };

        let mut outcome = match terminal {
            RepairState::Valid => RepairOutcome::new(entry, RepairStatus::Valid),
            RepairState::Repaired(defect) => {
                info!("Repaired {}", path.display());
                RepairOutcome::new(entry, RepairStatus::Repaired)
                    .with_error(format!("repaired after {}: {}", defect.label(), defect))
            }
            RepairState::Corrupt(err) => {
                error!("Corrupt file {}: {}", path.display(), err);
                RepairOutcome::new(entry, RepairStatus::Corrupt)
                    .with_error(format!("{}: {}", err.label(), err))
            }
            RepairState::Skipped(reason) => {
                debug!("Skipped {}: {}", path.display(), reason);
                RepairOutcome::new(entry, RepairStatus::Skipped).with_error(reason)
            }
            RepairState::Unchecked | RepairState::AttemptRepair(_) => {
                unreachable!("state machine stops only on terminal states")
            }
        };

        fill_file_facts(&mut outcome);
        outcome
    }
}

/// Only format-level defects are worth a rewrite. A missing or unreadable
/// file cannot be fixed by re-encoding.
fn is_repairable(err: &Error) -> bool {
    matches!(err, Error::UnsupportedOrInvalidFormat { .. })
}

/// Attach size and checksum of the file as it now sits on disk.
fn fill_file_facts(outcome: &mut RepairOutcome) {
    if let Ok(metadata) = fs::metadata(&outcome.path) {
        if metadata.is_file() {
            outcome.file_size = Some(metadata.len());
            match hasher::checksum(&outcome.path) {
                Ok(digest) => outcome.checksum = Some(digest),
                Err(e) => debug!("No checksum for {}: {}", outcome.path.display(), e),
            }
        }
    }
}

/// The strategy set used by one run, selected by media kind.
#[derive(Clone)]
pub struct Strategies {
    image: Arc<dyn RepairStrategy>,
    video: Arc<dyn RepairStrategy>,
}

impl Strategies {
    pub fn new(image: Arc<dyn RepairStrategy>, video: Arc<dyn RepairStrategy>) -> Self {
        Self { image, video }
    }

    /// Image codec strategy plus an ffprobe-backed video strategy.
    pub fn with_ffprobe(ffprobe_path: &str) -> Self {
        Self::new(
            Arc::new(ImageStrategy::new()),
            Arc::new(VideoStrategy::new(Arc::new(FfprobeProbe::new(ffprobe_path)))),
        )
    }

    pub fn for_kind(&self, kind: MediaKind) -> Option<&dyn RepairStrategy> {
        match kind {
            MediaKind::Image => Some(self.image.as_ref()),
            MediaKind::Video => Some(self.video.as_ref()),
            MediaKind::Unsupported => None,
        }
    }

    /// Process one entry with the matching strategy.
    pub fn process(&self, entry: &FileEntry, backup: &BackupManager) -> RepairOutcome {
        match self.for_kind(entry.media_kind) {
            Some(strategy) => {
                trace!("Checking {} as {}", entry.path.display(), strategy.media_kind());
                strategy.process(entry, backup)
            }
            None => RepairOutcome::new(entry, RepairStatus::Skipped)
                .with_error(format!("unsupported extension .{}", entry.extension)),
        }
    }
}
