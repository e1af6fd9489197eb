use crate::error::Error;
use crate::model::{FileEntry, TypeFilter};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Recursive directory traversal. Returns every regular file under `root`
/// whose extension matches `filter`, in a stable (name-sorted) order.
///
/// Symlinks are not followed and symlinked files are skipped. Unreadable
/// directories and walk loops are logged and skipped.
pub fn scan_directory(root: &Path, filter: TypeFilter) -> Result<Vec<FileEntry>, Error> {
    let root = fs::canonicalize(root).map_err(|e| Error::from_io(root, e))?;
    if !root.is_dir() {
        return Err(Error::NotADirectory(root));
    }

    let mut entries = Vec::new();
    let mut skipped = 0usize;

    for entry_result in WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                let location = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                if err.loop_ancestor().is_some() {
                    warn!("Skipping filesystem loop at {}", location);
                } else {
                    warn!("Skipping unreadable entry {}: {}", location, err);
                }
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        match FileEntry::from_path(entry.path()) {
            Some(file) if filter.accepts(file.media_kind) => entries.push(file),
            _ => skipped += 1,
        }
    }

    debug!(
        "Scanned {}: {} candidate files, {} ignored",
        root.display(),
        entries.len(),
        skipped
    );

    Ok(entries)
}
