use chrono::{Duration, Utc};
use file_registry::storage::models::{FileRecord, FileState, FileType};
use file_registry::storage::{Database, ReleaseOutcome};

fn test_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    (dir, db)
}

fn sample_file(id: &str, content_hash: &str) -> FileRecord {
    let now = Utc::now();
    FileRecord {
        id: id.to_string(),
        content_hash: content_hash.to_string(),
        path: format!("sha256/{content_hash}"),
        byte_size: 1024,
        mime_type: "image/png".to_string(),
        file_type: FileType::Image,
        original_name: Some("photo.png".to_string()),
        reference_count: 1,
        orphaned_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[test]
fn test_register_and_get_file() {
    let (_dir, db) = test_db();
    let registration = db
        .register_file(&sample_file("file-1", "h1"), None, Utc::now())
        .unwrap();
    assert!(registration.created);

    let retrieved = db.get_file("file-1").unwrap().expect("file should exist");
    assert_eq!(retrieved.content_hash, "h1");
    assert_eq!(retrieved.reference_count, 1);
    assert_eq!(retrieved.original_name, Some("photo.png".to_string()));
    assert_eq!(retrieved.file_type, FileType::Image);

    let by_hash = db.get_file_by_hash("h1").unwrap().expect("hash should resolve");
    assert_eq!(by_hash.id, "file-1");
}

#[test]
fn test_register_same_hash_increments_existing() {
    let (_dir, db) = test_db();
    db.register_file(&sample_file("first", "same"), None, Utc::now())
        .unwrap();

    let second = db
        .register_file(&sample_file("second", "same"), None, Utc::now())
        .unwrap();
    assert!(!second.created);
    assert_eq!(second.record.id, "first");
    assert_eq!(second.record.reference_count, 2);

    assert!(db.get_file("second").unwrap().is_none());
    assert_eq!(db.get_all_files().unwrap().len(), 1);
}

#[test]
fn test_register_clears_orphan_mark() {
    let (_dir, db) = test_db();
    db.register_file(&sample_file("f", "h"), None, Utc::now())
        .unwrap();
    db.release_reference("f", None, Utc::now()).unwrap();
    assert!(db.get_file("f").unwrap().unwrap().orphaned_at.is_some());

    let again = db
        .register_file(&sample_file("other", "h"), None, Utc::now())
        .unwrap();
    assert_eq!(again.record.id, "f");
    assert_eq!(again.record.reference_count, 1);
    assert!(again.record.orphaned_at.is_none());
}

#[test]
fn test_release_to_zero_stamps_orphaned_at() {
    let (_dir, db) = test_db();
    db.register_file(&sample_file("r", "hr"), None, Utc::now())
        .unwrap();

    let now = Utc::now();
    match db.release_reference("r", None, now).unwrap() {
        ReleaseOutcome::Released(record) => {
            assert_eq!(record.reference_count, 0);
            assert_eq!(record.orphaned_at, Some(now));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn test_release_at_zero_is_rejected() {
    let (_dir, db) = test_db();
    db.register_file(&sample_file("z", "hz"), None, Utc::now())
        .unwrap();
    db.release_reference("z", None, Utc::now()).unwrap();

    let outcome = db.release_reference("z", None, Utc::now()).unwrap();
    assert!(matches!(outcome, ReleaseOutcome::AlreadyZero));
    assert_eq!(db.get_file("z").unwrap().unwrap().reference_count, 0);
}

#[test]
fn test_release_unknown_file() {
    let (_dir, db) = test_db();
    let outcome = db.release_reference("nope", None, Utc::now()).unwrap();
    assert!(matches!(outcome, ReleaseOutcome::NotFound));
}

#[test]
fn test_add_reference_clears_orphan_mark() {
    let (_dir, db) = test_db();
    db.register_file(&sample_file("a", "ha"), None, Utc::now())
        .unwrap();
    db.release_reference("a", None, Utc::now()).unwrap();

    let record = db
        .add_reference("a", None, Utc::now())
        .unwrap()
        .expect("file should exist");
    assert_eq!(record.reference_count, 1);
    assert!(record.orphaned_at.is_none());

    assert!(db.add_reference("missing", None, Utc::now()).unwrap().is_none());
}

#[test]
fn test_mark_orphaned_is_idempotent() {
    let (_dir, db) = test_db();
    let mut unreferenced = sample_file("zero", "h0");
    unreferenced.reference_count = 0;
    db.register_file(&unreferenced, None, Utc::now()).unwrap();
    db.register_file(&sample_file("live", "h1"), None, Utc::now())
        .unwrap();

    let first = Utc::now();
    assert_eq!(db.mark_orphaned(first).unwrap(), 1);
    assert_eq!(db.get_file("zero").unwrap().unwrap().orphaned_at, Some(first));
    assert!(db.get_file("live").unwrap().unwrap().orphaned_at.is_none());

    // The second run must not move the original stamp
    assert_eq!(db.mark_orphaned(first + Duration::hours(1)).unwrap(), 0);
    assert_eq!(db.get_file("zero").unwrap().unwrap().orphaned_at, Some(first));
}

#[test]
fn test_orphans_older_than_respects_cutoff() {
    let (_dir, db) = test_db();
    let now = Utc::now();
    for (id, hash) in [("old", "h-old"), ("recent", "h-recent")] {
        db.register_file(&sample_file(id, hash), None, now).unwrap();
    }
    db.release_reference("old", None, now - Duration::days(10))
        .unwrap();
    db.release_reference("recent", None, now - Duration::days(3))
        .unwrap();

    let candidates = db.orphans_older_than(now - Duration::days(7)).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].id, "old");
}

#[test]
fn test_delete_orphan_removes_record_and_indexes() {
    let (_dir, db) = test_db();
    let now = Utc::now();
    db.register_file(&sample_file("gone", "h-gone"), Some("product:1"), now)
        .unwrap();
    db.release_reference("gone", Some("product:1"), now - Duration::days(30))
        .unwrap();

    assert!(db.delete_orphan("gone", now).unwrap());
    assert!(db.get_file("gone").unwrap().is_none());
    assert!(db.get_file_by_hash("h-gone").unwrap().is_none());
    assert!(db.get_files_by_owner("product:1").unwrap().is_empty());
}

#[test]
fn test_delete_orphan_skips_referenced_file() {
    let (_dir, db) = test_db();
    let now = Utc::now();
    db.register_file(&sample_file("kept", "h-kept"), None, now)
        .unwrap();

    assert!(!db.delete_orphan("kept", now + Duration::days(1)).unwrap());
    assert!(!db.delete_orphan("missing", now).unwrap());
    assert!(db.get_file("kept").unwrap().is_some());
}

#[test]
fn test_stats() {
    let (_dir, db) = test_db();
    let now = Utc::now();
    db.register_file(&sample_file("s1", "hs1"), None, now).unwrap();
    db.register_file(&sample_file("s2", "hs2"), None, now).unwrap();
    db.register_file(&sample_file("s3", "hs3"), None, now).unwrap();
    db.release_reference("s3", None, now).unwrap();

    let stats = db.stats().unwrap();
    assert_eq!(stats.total_files, 3);
    assert_eq!(stats.total_size, 3 * 1024);
    assert_eq!(stats.active_count, 2);
    assert_eq!(stats.orphaned_count, 1);
}

#[test]
fn test_list_files_by_state() {
    let (_dir, db) = test_db();
    let now = Utc::now();
    db.register_file(&sample_file("live", "hl"), None, now).unwrap();
    db.register_file(&sample_file("dead", "hd"), None, now).unwrap();
    db.release_reference("dead", None, now).unwrap();

    let orphaned = db.list_files(Some(FileState::Orphaned), None).unwrap();
    assert_eq!(orphaned.len(), 1);
    assert_eq!(orphaned[0].id, "dead");

    let active = db.list_files(Some(FileState::Active), None).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "live");

    assert_eq!(db.list_files(None, None).unwrap().len(), 2);
}

#[test]
fn test_file_type_from_mime() {
    assert_eq!(FileType::from_mime("image/png"), FileType::Image);
    assert_eq!(FileType::from_mime("image/jpeg"), FileType::Image);
    assert_eq!(FileType::from_mime("video/mp4"), FileType::Video);
    assert_eq!(FileType::from_mime("audio/mpeg"), FileType::Audio);
    assert_eq!(FileType::from_mime("application/pdf"), FileType::Document);
    assert_eq!(FileType::from_mime("text/plain"), FileType::Document);
    assert_eq!(FileType::from_mime("text/csv"), FileType::Document);
    assert_eq!(
        FileType::from_mime("application/octet-stream"),
        FileType::Binary
    );
    assert_eq!(FileType::from_mime("unknown/type"), FileType::Binary);
}

// ============================================================================
// owner index tests
// ============================================================================

#[test]
fn test_owner_index_follows_references() {
    let (_dir, db) = test_db();
    let now = Utc::now();
    db.register_file(&sample_file("photo", "hp"), Some("product:1"), now)
        .unwrap();
    db.add_reference("photo", Some("banner:home"), now).unwrap();

    let product_files = db.get_files_by_owner("product:1").unwrap();
    assert_eq!(product_files.len(), 1);
    assert_eq!(product_files[0].id, "photo");
    assert_eq!(db.get_files_by_owner("banner:home").unwrap().len(), 1);

    let outcome = db
        .release_reference("photo", Some("banner:home"), now)
        .unwrap();
    assert!(matches!(outcome, ReleaseOutcome::Released(ref r) if r.reference_count == 1));
    assert!(db.get_files_by_owner("banner:home").unwrap().is_empty());
}

#[test]
fn test_release_by_owner_without_reference() {
    let (_dir, db) = test_db();
    let now = Utc::now();
    db.register_file(&sample_file("p", "hp"), Some("product:1"), now)
        .unwrap();

    let outcome = db.release_reference("p", Some("product:2"), now).unwrap();
    assert!(matches!(outcome, ReleaseOutcome::NotHeld));
    assert_eq!(db.get_file("p").unwrap().unwrap().reference_count, 1);
}

#[test]
fn test_owner_holding_same_file_twice() {
    let (_dir, db) = test_db();
    let now = Utc::now();
    db.register_file(&sample_file("dup", "hdup"), Some("product:7"), now)
        .unwrap();
    db.register_file(&sample_file("ignored", "hdup"), Some("product:7"), now)
        .unwrap();

    // Listing is distinct
    assert_eq!(db.get_files_by_owner("product:7").unwrap().len(), 1);

    // Two entries, so two owner-scoped releases and no more
    for expected in [1, 0] {
        let outcome = db.release_reference("dup", Some("product:7"), now).unwrap();
        assert!(matches!(outcome, ReleaseOutcome::Released(ref r) if r.reference_count == expected));
    }
    assert!(db.get_files_by_owner("product:7").unwrap().is_empty());
}

#[test]
fn test_anonymous_release_cannot_take_owned_reference() {
    let (_dir, db) = test_db();
    let now = Utc::now();
    db.register_file(&sample_file("shared", "hs"), Some("product:1"), now)
        .unwrap();

    let outcome = db.release_reference("shared", None, now).unwrap();
    assert!(matches!(outcome, ReleaseOutcome::NotHeld));
    assert_eq!(db.get_file("shared").unwrap().unwrap().reference_count, 1);

    db.add_reference("shared", Some("banner:2"), now).unwrap();
    let released = db.release_owner("product:1", now).unwrap();
    assert_eq!(released.len(), 1);

    // banner:2 still holds its reference
    let record = db.get_file("shared").unwrap().unwrap();
    assert_eq!(record.reference_count, 1);
    assert!(record.orphaned_at.is_none());
    let outcome = db.release_reference("shared", Some("banner:2"), now).unwrap();
    assert!(matches!(outcome, ReleaseOutcome::Released(ref r) if r.reference_count == 0));
}

#[test]
fn test_mixed_anonymous_and_owned_references() {
    let (_dir, db) = test_db();
    let now = Utc::now();
    db.register_file(&sample_file("m", "hm"), Some("product:1"), now)
        .unwrap();
    db.add_reference("m", None, now).unwrap();
    db.add_reference("m", Some("banner:2"), now).unwrap();
    assert_eq!(db.get_file("m").unwrap().unwrap().reference_count, 3);

    // Only one anonymous reference exists
    let outcome = db.release_reference("m", None, now).unwrap();
    assert!(matches!(outcome, ReleaseOutcome::Released(ref r) if r.reference_count == 2));
    let outcome = db.release_reference("m", None, now).unwrap();
    assert!(matches!(outcome, ReleaseOutcome::NotHeld));

    let released = db.release_owner("product:1", now).unwrap();
    assert_eq!(released.len(), 1);
    assert_eq!(db.get_file("m").unwrap().unwrap().reference_count, 1);
    assert_eq!(db.get_files_by_owner("banner:2").unwrap().len(), 1);

    let outcome = db.release_reference("m", Some("banner:2"), now).unwrap();
    assert!(matches!(outcome, ReleaseOutcome::Released(ref r) if r.reference_count == 0 && r.orphaned_at == Some(now)));
}

#[test]
fn test_release_owner_drops_all_references() {
    let (_dir, db) = test_db();
    let now = Utc::now();
    db.register_file(&sample_file("x", "hx"), Some("product:9"), now)
        .unwrap();
    db.register_file(&sample_file("y", "hy"), Some("product:9"), now)
        .unwrap();
    db.add_reference("y", Some("partner:3"), now).unwrap();

    let released = db.release_owner("product:9", now).unwrap();
    assert_eq!(released.len(), 2);

    assert_eq!(db.get_file("x").unwrap().unwrap().reference_count, 0);
    assert!(db.get_file("x").unwrap().unwrap().orphaned_at.is_some());
    assert_eq!(db.get_file("y").unwrap().unwrap().reference_count, 1);
    assert!(db.get_files_by_owner("product:9").unwrap().is_empty());
    assert_eq!(db.get_files_by_owner("partner:3").unwrap().len(), 1);
}
