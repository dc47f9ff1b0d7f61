use homecloud_meta::context::Context;
use homecloud_meta::storage::models::{NewFile, NewRevision};
use homecloud_meta::storage::{Database, ErrorKind};

fn test_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    (dir, db)
}

fn sample_revision(file_id: &str, storage_path: &str, size: u64) -> NewRevision {
    NewRevision {
        file_id: file_id.to_string(),
        storage_path: storage_path.to_string(),
        size,
        md5_checksum: Some(format!("md5-{storage_path}")),
        mime_type: "text/plain".to_string(),
        user_id: "alice".to_string(),
    }
}

#[test]
fn test_revisions_listed_newest_first() {
    let (_dir, db) = test_db();
    let ctx = Context::background();
    let file = db.create(&ctx, NewFile::new("alice", "essay.txt")).unwrap();

    let r1 = db
        .create_revision(&ctx, sample_revision(&file, "blobs/1", 100), 1)
        .unwrap();
    let r2 = db
        .create_revision(&ctx, sample_revision(&file, "blobs/2", 120), 2)
        .unwrap();

    let listed: Vec<_> = db
        .list_revisions(&ctx, &file)
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(listed, vec![r2, r1.clone()]);

    let first = db.get_revision(&ctx, &file, 1).unwrap().unwrap();
    assert_eq!(first.id, r1);
    assert_eq!(first.storage_path, "blobs/1");
    assert_eq!(first.size, 100);
    assert_eq!(first.user_id, "alice");
}

#[test]
fn test_revision_numbers_must_increase() {
    let (_dir, db) = test_db();
    let ctx = Context::background();
    let file = db.create(&ctx, NewFile::new("alice", "essay.txt")).unwrap();

    db.create_revision(&ctx, sample_revision(&file, "blobs/5", 1), 5)
        .unwrap();

    let err = db
        .create_revision(&ctx, sample_revision(&file, "blobs/5b", 1), 5)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = db
        .create_revision(&ctx, sample_revision(&file, "blobs/3", 1), 3)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    assert_eq!(db.list_revisions(&ctx, &file).unwrap().len(), 1);
}

#[test]
fn test_revision_numbers_are_per_file() {
    let (_dir, db) = test_db();
    let ctx = Context::background();
    let a = db.create(&ctx, NewFile::new("alice", "a.txt")).unwrap();
    let b = db.create(&ctx, NewFile::new("alice", "b.txt")).unwrap();

    db.create_revision(&ctx, sample_revision(&a, "blobs/a1", 1), 1)
        .unwrap();
    db.create_revision(&ctx, sample_revision(&b, "blobs/b1", 1), 1)
        .unwrap();

    assert_eq!(db.list_revisions(&ctx, &a).unwrap().len(), 1);
    assert_eq!(db.list_revisions(&ctx, &b).unwrap().len(), 1);
}

#[test]
fn test_create_revision_requires_file() {
    let (_dir, db) = test_db();
    let ctx = Context::background();

    let err = db
        .create_revision(&ctx, sample_revision("ghost", "blobs/x", 1), 1)
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_get_missing_revision_is_none() {
    let (_dir, db) = test_db();
    let ctx = Context::background();
    let file = db.create(&ctx, NewFile::new("alice", "a.txt")).unwrap();

    assert!(db.get_revision(&ctx, &file, 1).unwrap().is_none());
    assert!(db.list_revisions(&ctx, &file).unwrap().is_empty());
    assert!(db.list_revisions(&ctx, "ghost").unwrap().is_empty());
}

#[test]
fn test_commit_revision_updates_file() {
    let (_dir, db) = test_db();
    let ctx = Context::background();
    let file = db.create(&ctx, NewFile::new("alice", "essay.txt")).unwrap();

    let first = db
        .commit_revision(&ctx, sample_revision(&file, "blobs/c1", 10))
        .unwrap();
    let second = db
        .commit_revision(&ctx, sample_revision(&file, "blobs/c2", 20))
        .unwrap();
    assert_eq!(first.revision_id, 1);
    assert_eq!(second.revision_id, 2);

    let record = db.get_by_id(&ctx, &file).unwrap().unwrap();
    assert_eq!(record.version, 3);
    assert_eq!(record.revision_id.as_deref(), Some(second.id.as_str()));
    assert_eq!(record.storage_path, "blobs/c2");
    assert_eq!(record.size, 20);
    assert_eq!(record.md5_checksum.as_deref(), Some("md5-blobs/c2"));
}

#[test]
fn test_commit_after_explicit_revision_continues_numbering() {
    let (_dir, db) = test_db();
    let ctx = Context::background();
    let file = db.create(&ctx, NewFile::new("alice", "essay.txt")).unwrap();

    db.create_revision(&ctx, sample_revision(&file, "blobs/7", 1), 7)
        .unwrap();
    let next = db
        .commit_revision(&ctx, sample_revision(&file, "blobs/8", 1))
        .unwrap();
    assert_eq!(next.revision_id, 8);
}

#[test]
fn test_delete_revision() {
    let (_dir, db) = test_db();
    let ctx = Context::background();
    let file = db.create(&ctx, NewFile::new("alice", "essay.txt")).unwrap();

    let r1 = db
        .create_revision(&ctx, sample_revision(&file, "blobs/1", 1), 1)
        .unwrap();
    let r2 = db
        .create_revision(&ctx, sample_revision(&file, "blobs/2", 1), 2)
        .unwrap();

    db.delete_revision(&ctx, &r1).unwrap();
    let remaining: Vec<_> = db
        .list_revisions(&ctx, &file)
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(remaining, vec![r2]);

    assert!(db.delete_revision(&ctx, &r1).unwrap_err().is_not_found());
}

#[test]
fn test_revisions_survive_file_delete() {
    let (_dir, db) = test_db();
    let ctx = Context::background();
    let file = db.create(&ctx, NewFile::new("alice", "essay.txt")).unwrap();
    db.create_revision(&ctx, sample_revision(&file, "blobs/1", 1), 1)
        .unwrap();

    db.delete(&ctx, &file).unwrap();
    assert_eq!(db.list_revisions(&ctx, &file).unwrap().len(), 1);
}

#[test]
fn test_commit_after_max_revision_number_conflicts() {
    let (_dir, db) = test_db();
    let ctx = Context::background();
    let file = db.create(&ctx, NewFile::new("alice", "essay.txt")).unwrap();

    db.create_revision(&ctx, sample_revision(&file, "blobs/last", 1), i64::MAX)
        .unwrap();
    let err = db
        .commit_revision(&ctx, sample_revision(&file, "blobs/next", 1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // The failed commit left the file and its history alone.
    assert_eq!(db.list_revisions(&ctx, &file).unwrap().len(), 1);
    assert_eq!(db.get_by_id(&ctx, &file).unwrap().unwrap().version, 1);
}

#[test]
fn test_concurrent_commits_number_revisions_without_gaps() {
    const WRITERS: usize = 8;
    const COMMITS_PER_WRITER: usize = 10;

    let (_dir, db) = test_db();
    let ctx = Context::background();
    let file = db.create(&ctx, NewFile::new("alice", "shared.txt")).unwrap();

    std::thread::scope(|scope| {
        for writer in 0..WRITERS {
            let db = db.clone();
            let file = file.as_str();
            scope.spawn(move || {
                let ctx = Context::background();
                for n in 0..COMMITS_PER_WRITER {
                    let path = format!("blobs/{writer}-{n}");
                    db.commit_revision(&ctx, sample_revision(file, &path, 1))
                        .unwrap();
                }
            });
        }
    });

    let total = (WRITERS * COMMITS_PER_WRITER) as i64;
    let mut numbers: Vec<i64> = db
        .list_revisions(&ctx, &file)
        .unwrap()
        .into_iter()
        .map(|r| r.revision_id)
        .collect();
    numbers.sort_unstable();
    assert_eq!(numbers, (1..=total).collect::<Vec<_>>());

    let record = db.get_by_id(&ctx, &file).unwrap().unwrap();
    assert_eq!(record.version, 1 + total as u64);
}
