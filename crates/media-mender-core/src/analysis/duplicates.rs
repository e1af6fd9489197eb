use crate::hasher;
use crate::progress::DeletionConfirmer;
use crate::storage::Database;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::hash::Hash;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Byte-identical files. `keep` is the earliest in scan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub keep: PathBuf,
    pub remove: Vec<PathBuf>,
    pub file_size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupeReport {
    pub groups: usize,
    pub candidates: usize,
    pub confirmed: bool,
    pub deleted: usize,
    pub failed: usize,
    pub skipped: usize,
    pub reclaimed_bytes: u64,
}

/// Group byte-identical files across the whole set.
///
/// Narrowing goes size → partial hash (first 1KB) → full checksum, and
/// every group is then confirmed by full byte comparison so a digest
/// collision can never put two different files in one group. Files that
/// cannot be read are logged and left out.
pub fn find_duplicates(paths: &[PathBuf]) -> Vec<DuplicateGroup> {
    // Phase 1: size buckets
    let sizes: Vec<(usize, u64)> = paths
        .iter()
        .enumerate()
        .filter_map(|(idx, path)| match fs::metadata(path) {
            Ok(meta) if meta.is_file() => Some((idx, meta.len())),
            Ok(_) => None,
            Err(e) => {
                error!("Error reading metadata for {}: {}", path.display(), e);
                None
            }
        })
        .collect();
    let size_of: HashMap<usize, u64> = sizes.iter().copied().collect();

    let mut candidates = Vec::new();
    for bucket in bucket_by(&sizes) {
        // Phase 2: partial hash to eliminate non-dupes quickly
        let partial: Vec<(usize, u64)> = bucket
            .par_iter()
            .filter_map(|&idx| match hasher::partial_hash(&paths[idx]) {
                Ok(hash) => Some((idx, hash)),
                Err(e) => {
                    error!("Error processing file '{}': {}", paths[idx].display(), e);
                    None
                }
            })
            .collect();

        for partial_bucket in bucket_by(&partial) {
            // Phase 3: full checksum only on partial-hash collisions
            let full: Vec<(usize, String)> = partial_bucket
                .par_iter()
                .filter_map(|&idx| match hasher::checksum(&paths[idx]) {
                    Ok(digest) => Some((idx, digest)),
                    Err(e) => {
                        error!("Error processing file '{}': {}", paths[idx].display(), e);
                        None
                    }
                })
                .collect();
            candidates.extend(bucket_by(&full));
        }
    }

    // Phase 4: confirm byte equality against each group's representative
    let mut groups: Vec<Vec<usize>> = candidates
        .par_iter()
        .flat_map_iter(|bucket| confirm_bucket(paths, bucket))
        .filter(|group| group.len() > 1)
        .collect();
    groups.sort_by_key(|group| group[0]);

    debug!("{} duplicate groups among {} files", groups.len(), paths.len());

    groups
        .into_iter()
        .map(|group| DuplicateGroup {
            keep: paths[group[0]].clone(),
            remove: group[1..].iter().map(|&idx| paths[idx].clone()).collect(),
            file_size: size_of.get(&group[0]).copied().unwrap_or(0),
        })
        .collect()
}

/// Buckets with more than one member, each in ascending index (scan) order.
fn bucket_by<K: Hash + Eq + Clone>(keyed: &[(usize, K)]) -> Vec<Vec<usize>> {
    let mut buckets: HashMap<K, Vec<usize>> = HashMap::new();
    for (idx, key) in keyed {
        buckets.entry(key.clone()).or_default().push(*idx);
    }
    buckets
        .into_values()
        .filter(|bucket| bucket.len() > 1)
        .map(|mut bucket| {
            bucket.sort_unstable();
            bucket
        })
        .collect()
}

fn confirm_bucket(paths: &[PathBuf], bucket: &[usize]) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for &idx in bucket {
        let mut placed = false;
        for group in groups.iter_mut() {
            match hasher::files_equal(&paths[group[0]], &paths[idx]) {
                Ok(true) => {
                    group.push(idx);
                    placed = true;
                    break;
                }
                Ok(false) => {}
                Err(e) => {
                    error!("Error comparing '{}': {}", paths[idx].display(), e);
                    placed = true;
                    break;
                }
            }
        }
        if !placed {
            groups.push(vec![idx]);
        }
    }
    groups
}

/// Ask for confirmation once, then delete every non-representative copy.
///
/// Declining deletes nothing. Each copy is compared with its representative
/// again right before removal; individual failures are logged and counted
/// without stopping the remaining deletions.
pub fn resolve_duplicates(
    groups: &[DuplicateGroup],
    confirmer: &dyn DeletionConfirmer,
    audit: Option<&Database>,
) -> DedupeReport {
    let candidates: usize = groups.iter().map(|g| g.remove.len()).sum();
    let mut report = DedupeReport {
        groups: groups.len(),
        candidates,
        ..DedupeReport::default()
    };

    if candidates == 0 {
        return report;
    }

    if !confirmer.confirm_deletion(candidates) {
        info!("Duplicate deletion declined, {} files kept", candidates);
        return report;
    }
    report.confirmed = true;

    for group in groups {
        for path in &group.remove {
            match hasher::files_equal(&group.keep, path) {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        "{} no longer matches {}, not deleting",
                        path.display(),
                        group.keep.display()
                    );
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!("Error re-checking {} before deletion: {}", path.display(), e);
                    report.failed += 1;
                    continue;
                }
            }

            match fs::remove_file(path) {
                Ok(()) => {
                    debug!("Deleted duplicate {}", path.display());
                    report.deleted += 1;
                    report.reclaimed_bytes += group.file_size;
                    if let Some(db) = audit {
                        if let Err(e) = db.delete_record(&path.to_string_lossy()) {
                            warn!("Could not drop audit row for {}: {}", path.display(), e);
                        }
                    }
                }
                Err(e) => {
                    error!("Error deleting {}: {}", path.display(), e);
                    report.failed += 1;
                }
            }
        }
    }

    info!(
        "Deleted {} duplicates ({} bytes), {} failed, {} skipped",
        report.deleted, report.reclaimed_bytes, report.failed, report.skipped
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::FixedConfirmer;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_identical_files_grouped_across_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let a = write(tmp.path(), "one/a.jpg", b"same bytes");
        let b = write(tmp.path(), "two/b.jpg", b"same bytes");
        let c = write(tmp.path(), "three/c.jpg", b"same bytes");
        let d = write(tmp.path(), "d.jpg", b"diff bytes");

        let groups = find_duplicates(&[a.clone(), b.clone(), d, c.clone()]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].keep, a);
        assert_eq!(groups[0].remove, vec![b, c]);
        assert_eq!(groups[0].file_size, 10);
    }

    #[test]
    fn test_single_byte_difference_is_not_duplicate() {
        let tmp = tempfile::tempdir().unwrap();
        let mut content = vec![0xAAu8; 8192];
        let a = write(tmp.path(), "a.png", &content);
        content[5000] = 0xAB;
        let b = write(tmp.path(), "b.png", &content);

        assert!(find_duplicates(&[a, b]).is_empty());
    }

    #[test]
    fn test_empty_files_are_duplicates_of_each_other() {
        let tmp = tempfile::tempdir().unwrap();
        let a = write(tmp.path(), "a.gif", b"");
        let b = write(tmp.path(), "b.gif", b"");
        let c = write(tmp.path(), "c.gif", b"x");

        let groups = find_duplicates(&[a.clone(), c, b.clone()]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].keep, a);
        assert_eq!(groups[0].remove, vec![b]);
        assert_eq!(groups[0].file_size, 0);
    }

    #[test]
    fn test_missing_files_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let a = write(tmp.path(), "a.gif", b"gif");
        let gone = tmp.path().join("gone.gif");
        let gone_too = tmp.path().join("gone_too.gif");
        assert!(find_duplicates(&[a, gone, gone_too]).is_empty());
    }

    struct CountingConfirmer {
        asked_with: AtomicUsize,
        answer: bool,
    }

    impl DeletionConfirmer for CountingConfirmer {
        fn confirm_deletion(&self, count: usize) -> bool {
            self.asked_with.store(count, Ordering::SeqCst);
            self.answer
        }
    }

    #[test]
    fn test_declined_deletion_keeps_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let a = write(tmp.path(), "a.mp4", b"video");
        let b = write(tmp.path(), "b.mp4", b"video");
        let groups = find_duplicates(&[a.clone(), b.clone()]);

        let confirmer = CountingConfirmer {
            asked_with: AtomicUsize::new(0),
            answer: false,
        };
        let report = resolve_duplicates(&groups, &confirmer, None);

        assert_eq!(confirmer.asked_with.load(Ordering::SeqCst), 1);
        assert!(!report.confirmed);
        assert_eq!(report.deleted, 0);
        assert!(a.exists() && b.exists());
    }

    #[test]
    fn test_accepted_deletion_removes_copies_and_survives_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let a = write(tmp.path(), "a.jpg", b"photo");
        let b = write(tmp.path(), "b.jpg", b"photo");
        let c = write(tmp.path(), "c.jpg", b"photo");
        let groups = find_duplicates(&[a.clone(), b.clone(), c.clone()]);

        // One copy disappears between detection and deletion
        fs::remove_file(&b).unwrap();

        let report = resolve_duplicates(&groups, &FixedConfirmer(true), None);
        assert!(report.confirmed);
        assert_eq!(report.candidates, 2);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed, 1);
        assert!(a.exists());
        assert!(!c.exists());
    }

    #[test]
    fn test_changed_copy_is_not_deleted() {
        let tmp = tempfile::tempdir().unwrap();
        let a = write(tmp.path(), "a.jpg", b"photo");
        let b = write(tmp.path(), "b.jpg", b"photo");
        let groups = find_duplicates(&[a, b.clone()]);

        fs::write(&b, b"edited").unwrap();
        let report = resolve_duplicates(&groups, &FixedConfirmer(true), None);
        assert_eq!(report.skipped, 1);
        assert!(b.exists());
    }
}
