use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("Is a directory: {}", .0.display())]
    IsADirectory(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Unsupported or invalid format: {}: {reason}", .path.display())]
    UnsupportedOrInvalidFormat { path: PathBuf, reason: String },

    #[error("Backup failed for {}: {reason}", .path.display())]
    Backup { path: PathBuf, reason: String },

    #[error("Audit log write failed: {0}")]
    Persistence(String),

    #[error("Probe failed for {}: {reason}", .path.display())]
    Probe { path: PathBuf, reason: String },

    #[error("Worker pool could not be created: {0}")]
    SchedulerFatal(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Operation cancelled by user")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Classify an I/O error raised while touching `path`.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Error::PermissionDenied(path.to_path_buf()),
            _ if path.is_dir() => Error::IsADirectory(path.to_path_buf()),
            _ => Error::Io(io::Error::new(
                err.kind(),
                format!("{}: {}", path.display(), err),
            )),
        }
    }

    /// Short machine-friendly label, used as the prefix of audit error text.
    pub fn label(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::PermissionDenied(_) => "permission_denied",
            Error::IsADirectory(_) => "is_a_directory",
            Error::NotADirectory(_) => "not_a_directory",
            Error::UnsupportedOrInvalidFormat { .. } => "invalid_format",
            Error::Backup { .. } => "backup_error",
            Error::Persistence(_) => "persistence_error",
            Error::Probe { .. } => "probe_error",
            Error::SchedulerFatal(_) => "scheduler_fatal",
            Error::Io(_) => "io_error",
            Error::Config(_) => "config_error",
            Error::Database(_) => "database_error",
            Error::Cancelled => "cancelled",
            Error::Other(_) => "error",
        }
    }
}
