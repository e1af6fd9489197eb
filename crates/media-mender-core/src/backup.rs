use crate::error::Error;
use crate::hasher;
use dashmap::DashSet;
use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// `<path>.bak`, keeping the original extension in the name.
pub fn backup_path(path: &Path) -> PathBuf {
    with_suffix(path, ".bak")
}

/// Sibling path with `suffix` appended to the full file name.
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Snapshots files before they are mutated.
///
/// Backups are copy-then-verify: the original is copied to a temp sibling,
/// compared byte-for-byte, and only then renamed to `<path>.bak`. An
/// existing `.bak` is never overwritten, and each path is backed up at most
/// once per run.
pub struct BackupManager {
    enabled: bool,
    taken: DashSet<PathBuf>,
}

impl BackupManager {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            taken: DashSet::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Make sure a backup of `path` exists. Returns the backup location, or
    /// `None` when backups are disabled.
    pub fn ensure_backup(&self, path: &Path) -> Result<Option<PathBuf>, Error> {
        if !self.enabled {
            return Ok(None);
        }

        let target = backup_path(path);
        if self.taken.contains(path) || target.exists() {
            debug!("Backup already present for {}", path.display());
            self.taken.insert(path.to_path_buf());
            return Ok(Some(target));
        }

        let staging = with_suffix(path, ".bak.tmp");
        if let Err(reason) = copy_and_verify(path, &staging, &target) {
            if staging.exists() {
                if let Err(e) = fs::remove_file(&staging) {
                    warn!("Could not remove staging file {}: {}", staging.display(), e);
                }
            }
            return Err(Error::Backup {
                path: path.to_path_buf(),
                reason,
            });
        }

        self.taken.insert(path.to_path_buf());
        debug!("Backed up {} to {}", path.display(), target.display());
        Ok(Some(target))
    }
}

fn copy_and_verify(source: &Path, staging: &Path, target: &Path) -> Result<(), String> {
    fs::copy(source, staging).map_err(|e| format!("copy failed: {}", e))?;
    File::open(staging)
        .and_then(|f| f.sync_all())
        .map_err(|e| format!("sync failed: {}", e))?;

    match hasher::files_equal(source, staging) {
        Ok(true) => {}
        Ok(false) => return Err("backup copy does not match original".to_string()),
        Err(e) => return Err(format!("verification failed: {}", e)),
    }

    // Checked again right before the rename so a concurrent backup is never clobbered.
    if target.exists() {
        fs::remove_file(staging).map_err(|e| format!("cleanup failed: {}", e))?;
        return Ok(());
    }
    fs::rename(staging, target).map_err(|e| format!("rename failed: {}", e))
}
