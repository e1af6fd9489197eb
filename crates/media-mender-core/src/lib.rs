pub mod analysis;
pub mod backup;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod model;
pub mod progress;
pub mod repair;
pub mod scanner;
pub mod scheduler;
pub mod storage;

pub use analysis::{DedupeReport, DuplicateGroup};
pub use cancel::CancelToken;
pub use config::AppConfig;
pub use engine::{RepairEngine, RunReport, RunStatus};
pub use error::Error;
pub use model::{FileEntry, MediaKind, RepairOutcome, RepairStatus, TypeFilter};
pub use progress::{DeletionConfirmer, FixedConfirmer, ProgressReporter, SilentReporter};
pub use scheduler::RunSummary;
