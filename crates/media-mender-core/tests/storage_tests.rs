use std::path::PathBuf;

use media_mender_core::storage::Database;
use media_mender_core::{FileEntry, RepairOutcome, RepairStatus};

fn outcome(path: &str, status: RepairStatus) -> RepairOutcome {
    let entry = FileEntry::from_path(&PathBuf::from(path)).unwrap();
    let mut outcome = RepairOutcome::new(&entry, status);
    outcome.file_size = Some(1024);
    outcome.checksum = Some(format!("digest-{}", path));
    outcome
}

#[test]
fn test_upsert_and_get_record() {
    let db = Database::open_in_memory().unwrap();
    db.upsert(&outcome("/media/a.jpg", RepairStatus::Valid)).unwrap();

    let record = db.get_record("/media/a.jpg").unwrap().unwrap();
    assert_eq!(record.file_type, "image");
    assert_eq!(record.status, "valid");
    assert_eq!(record.file_size, Some(1024));
    assert_eq!(record.checksum.as_deref(), Some("digest-/media/a.jpg"));
    assert!(record.error_message.is_none());

    assert!(db.get_record("/media/missing.jpg").unwrap().is_none());
}

#[test]
fn test_upsert_replaces_existing_row() {
    let db = Database::open_in_memory().unwrap();
    let corrupt = outcome("/media/clip.mp4", RepairStatus::Corrupt).with_error("probe_error: bad");
    db.upsert(&corrupt).unwrap();
    db.upsert(&outcome("/media/clip.mp4", RepairStatus::Valid)).unwrap();

    assert_eq!(db.count_records().unwrap(), 1);
    let record = db.get_record("/media/clip.mp4").unwrap().unwrap();
    assert_eq!(record.file_type, "video");
    assert_eq!(record.status, "valid");
    assert!(record.error_message.is_none());
}

#[test]
fn test_list_records_filters_and_pages() {
    let db = Database::open_in_memory().unwrap();
    for i in 0..5 {
        db.upsert(&outcome(&format!("/m/{}.png", i), RepairStatus::Valid)).unwrap();
    }
    db.upsert(&outcome("/m/x.png", RepairStatus::Repaired)).unwrap();
    db.upsert(&outcome("/m/y.heic", RepairStatus::Skipped)).unwrap();

    let all = db.list_records(None, 0, 100).unwrap();
    assert_eq!(all.len(), 7);
    assert!(all.windows(2).all(|w| w[0].path <= w[1].path));

    let repaired = db.list_records(Some(RepairStatus::Repaired), 0, 100).unwrap();
    assert_eq!(repaired.len(), 1);
    assert_eq!(repaired[0].path, "/m/x.png");

    let page = db.list_records(Some(RepairStatus::Valid), 2, 2).unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].path, "/m/2.png");
}

#[test]
fn test_status_counts() {
    let db = Database::open_in_memory().unwrap();
    db.upsert(&outcome("/m/a.jpg", RepairStatus::Valid)).unwrap();
    db.upsert(&outcome("/m/b.jpg", RepairStatus::Valid)).unwrap();
    db.upsert(&outcome("/m/c.mp4", RepairStatus::Corrupt)).unwrap();

    let counts = db.status_counts().unwrap();
    assert_eq!(
        counts,
        vec![("corrupt".to_string(), 1), ("valid".to_string(), 2)]
    );
}

#[test]
fn test_delete_and_truncate() {
    let db = Database::open_in_memory().unwrap();
    db.upsert(&outcome("/m/a.jpg", RepairStatus::Valid)).unwrap();
    db.upsert(&outcome("/m/b.jpg", RepairStatus::Valid)).unwrap();

    assert!(db.delete_record("/m/a.jpg").unwrap());
    assert!(!db.delete_record("/m/a.jpg").unwrap());
    assert_eq!(db.count_records().unwrap(), 1);

    db.truncate_all().unwrap();
    assert_eq!(db.count_records().unwrap(), 0);
}

#[test]
fn test_reopening_file_database_keeps_rows() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("audit.db");
    {
        let db = Database::open(&path).unwrap();
        db.upsert(&outcome("/m/a.gif", RepairStatus::Repaired)).unwrap();
    }
    let db = Database::open(&path).unwrap();
    assert_eq!(db.count_records().unwrap(), 1);
    let version: i64 = db
        .connection()
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap();
    assert_eq!(version, 1);
}
