use std::collections::HashSet;
use std::time::Duration;

use homecloud_meta::config::Config;
use homecloud_meta::context::Context;
use homecloud_meta::service::{Copier, FileTree, MetadataService, Permissions, QuotaLedger, Revisions};
use homecloud_meta::storage::models::{NewFile, NewPermission, NewRevision};
use homecloud_meta::storage::{ErrorKind, ListQuery, Role};
use homecloud_meta::telemetry::{self, LogFormat};

fn test_service(test_mode: bool) -> (tempfile::TempDir, MetadataService) {
    // Only the first call per test binary installs the subscriber.
    let _ = telemetry::init(LogFormat::Plain);
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().join("data").to_string_lossy().into_owned(),
        test_mode,
        ..Config::default()
    };
    let service = MetadataService::open(config).unwrap();
    (dir, service)
}

#[tokio::test]
async fn test_file_lifecycle_through_service() {
    let (_dir, service) = test_service(false);
    let ctx = service.context();

    let folder = service
        .create(&ctx, NewFile::folder("alice", "Docs"))
        .await
        .unwrap();
    let id = service
        .create(&ctx, NewFile::new("alice", "Report.pdf").in_parent(folder.as_str()))
        .await
        .unwrap();

    service.star(&ctx, &id).await.unwrap();
    service.rename(&ctx, &id, "Report-final.pdf").await.unwrap();
    service.move_file(&ctx, &id, None).await.unwrap();

    let file = service.get_by_id(&ctx, &id).await.unwrap().unwrap();
    assert_eq!(file.name, "Report-final.pdf");
    assert!(file.starred);
    assert!(file.parent_id.is_none());

    let found = service
        .get_by_path(&ctx, "alice", "/Report-final.pdf")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, id);

    service.soft_delete(&ctx, &id).await.unwrap();
    assert_eq!(service.list_trashed(&ctx, "alice").await.unwrap().len(), 1);
    service.restore(&ctx, &id).await.unwrap();

    let page = service.list(&ctx, ListQuery::new("alice")).await.unwrap();
    assert_eq!(page.total, 2);
}

#[tokio::test]
async fn test_revisions_through_service() {
    let (_dir, service) = test_service(false);
    let ctx = service.context();
    let file = service
        .create(&ctx, NewFile::new("alice", "a.txt"))
        .await
        .unwrap();

    let revision = service
        .commit_revision(
            &ctx,
            NewRevision {
                file_id: file.clone(),
                storage_path: "blobs/1".to_string(),
                size: 12,
                user_id: "alice".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(revision.revision_id, 1);

    let listed = service.list_revisions(&ctx, &file).await.unwrap();
    assert_eq!(listed, vec![revision.clone()]);
    assert_eq!(
        service.get_revision(&ctx, &file, 1).await.unwrap(),
        Some(revision)
    );
}

#[tokio::test]
async fn test_permissions_and_copy_through_service() {
    let (_dir, service) = test_service(false);
    let ctx = service.context();
    let file = service
        .create(&ctx, NewFile::new("alice", "plan.md"))
        .await
        .unwrap();

    service
        .create_permission(&ctx, NewPermission::user(file.as_str(), "bob", Role::Writer))
        .await
        .unwrap();
    assert!(service.has_role(&ctx, &file, "bob", "COMMENTER").await.unwrap());
    assert!(!service.has_role(&ctx, &file, "bob", "OWNER").await.unwrap());

    let copy = service.copy(&ctx, &file, None, "plan (1).md").await.unwrap();
    assert_eq!(copy.version, 1);
    // Grants stay with the source.
    assert!(!service.has_role(&ctx, &copy.id, "bob", "READER").await.unwrap());
}

#[tokio::test]
async fn test_quota_through_service() {
    let (_dir, service) = test_service(false);
    let ctx = service.context();

    service.create_account(&ctx, "alice", 1000).await.unwrap();
    let file = service
        .create(&ctx, NewFile { size: 10, ..NewFile::new("alice", "a.bin") })
        .await
        .unwrap();
    service.adjust_usage(&ctx, "alice", 10).await.unwrap();

    assert_eq!(service.resize_file(&ctx, &file, 600).await.unwrap(), 600);
    let summary = service.storage_summary(&ctx, "alice").await.unwrap();
    assert_eq!(summary.remaining, Some(400));

    service.purge_file(&ctx, &file).await.unwrap();
    let account = service.get_account(&ctx, "alice").await.unwrap().unwrap();
    assert_eq!(account.used_space, 0);
}

#[tokio::test]
async fn test_cancelled_context_short_circuits() {
    let (_dir, service) = test_service(false);
    let ctx = Context::with_timeout(Duration::from_secs(5));
    ctx.cancel();

    let err = service
        .create(&ctx, NewFile::new("alice", "a.txt"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let live = service.context();
    assert!(service.get_tree(&live, "alice", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_purge_all_requires_test_mode() {
    let (_dir, service) = test_service(false);
    let ctx = service.context();
    service
        .create(&ctx, NewFile::new("alice", "a.txt"))
        .await
        .unwrap();

    let err = service.purge_all(&ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(service.get_tree(&ctx, "alice", None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_purge_all_in_test_mode() {
    let (_dir, service) = test_service(true);
    let ctx = service.context();
    service
        .create(&ctx, NewFile::new("alice", "a.txt"))
        .await
        .unwrap();
    service.create_account(&ctx, "alice", 0).await.unwrap();

    let stats = service.purge_all(&ctx).await.unwrap();
    assert_eq!(stats.files, 1);
    assert_eq!(stats.accounts, 1);
    assert!(service.get_account(&ctx, "alice").await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancelled_write_is_never_applied() {
    let (_dir, service) = test_service(false);

    let mut committed = HashSet::new();
    let mut cancelled = Vec::new();
    for i in 0..300u64 {
        let ctx = Context::with_timeout(Duration::from_micros(i % 300));
        let name = format!("f-{i}");
        match service.create(&ctx, NewFile::new("alice", name.as_str())).await {
            Ok(_) => {
                committed.insert(name);
            }
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::Cancelled);
                cancelled.push(name);
            }
        }
    }

    let live = service.context();
    let stored: HashSet<String> = service
        .get_tree(&live, "alice", None)
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(stored, committed);
    for name in &cancelled {
        assert!(!stored.contains(name), "{name} was reported cancelled but stored");
    }
}
