use homecloud_meta::context::Context;
use homecloud_meta::storage::models::{GranteeType, NewFile, NewPermission, PermissionUpdate};
use homecloud_meta::storage::{Database, Role};

fn test_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    (dir, db)
}

fn shared_file(db: &Database, ctx: &Context) -> String {
    db.create(ctx, NewFile::new("alice", "shared.doc")).unwrap()
}

#[test]
fn test_has_role_follows_hierarchy() {
    let (_dir, db) = test_db();
    let ctx = Context::background();
    let file = shared_file(&db, &ctx);

    for granted in Role::ALL {
        let grantee = format!("user-{granted}");
        db.create_permission(&ctx, NewPermission::user(file.as_str(), grantee.as_str(), granted))
            .unwrap();

        for required in Role::ALL {
            let has = db
                .has_role(&ctx, &file, &grantee, required.as_str())
                .unwrap();
            assert_eq!(
                has,
                granted.rank() >= required.rank(),
                "{granted} vs required {required}"
            );
        }
    }
}

#[test]
fn test_file_owner_role_sits_between_writer_and_organizer() {
    let (_dir, db) = test_db();
    let ctx = Context::background();
    let file = shared_file(&db, &ctx);
    db.create_permission(&ctx, NewPermission::user(file.as_str(), "bob", Role::FileOwner))
        .unwrap();

    assert!(db.has_role(&ctx, &file, "bob", "WRITER").unwrap());
    assert!(db.has_role(&ctx, &file, "bob", "FILE_OWNER").unwrap());
    assert!(!db.has_role(&ctx, &file, "bob", "ORGANIZER").unwrap());
}

#[test]
fn test_unknown_role_matches_nothing() {
    let (_dir, db) = test_db();
    let ctx = Context::background();
    let file = shared_file(&db, &ctx);
    db.create_permission(&ctx, NewPermission::user(file.as_str(), "bob", Role::Owner))
        .unwrap();

    assert!(!db.has_role(&ctx, &file, "bob", "SUPERUSER").unwrap());
    assert!(!db.has_role(&ctx, &file, "bob", "writer").unwrap());
}

#[test]
fn test_no_grant_means_no_role() {
    let (_dir, db) = test_db();
    let ctx = Context::background();
    let file = shared_file(&db, &ctx);

    assert!(!db.has_role(&ctx, &file, "carol", "READER").unwrap());
    assert!(db.effective_role(&ctx, &file, "carol").unwrap().is_none());
    assert!(!db.has_role(&ctx, "ghost", "carol", "READER").unwrap());
}

#[test]
fn test_multiple_grants_are_unioned() {
    let (_dir, db) = test_db();
    let ctx = Context::background();
    let file = shared_file(&db, &ctx);
    db.create_permission(&ctx, NewPermission::user(file.as_str(), "bob", Role::Reader))
        .unwrap();
    db.create_permission(&ctx, NewPermission::user(file.as_str(), "bob", Role::Organizer))
        .unwrap();

    assert!(db.has_role(&ctx, &file, "bob", "ORGANIZER").unwrap());
    assert_eq!(
        db.effective_role(&ctx, &file, "bob").unwrap(),
        Some(Role::Organizer)
    );
}

#[test]
fn test_public_grant_does_not_match_named_user() {
    let (_dir, db) = test_db();
    let ctx = Context::background();
    let file = shared_file(&db, &ctx);
    db.create_permission(&ctx, NewPermission::anyone(file.as_str(), Role::Reader))
        .unwrap();

    assert!(!db.has_role(&ctx, &file, "bob", "READER").unwrap());
    assert_eq!(db.list_permissions(&ctx, &file).unwrap().len(), 1);
}

#[test]
fn test_grants_are_per_file() {
    let (_dir, db) = test_db();
    let ctx = Context::background();
    let a = shared_file(&db, &ctx);
    let b = db.create(&ctx, NewFile::new("alice", "other.doc")).unwrap();
    db.create_permission(&ctx, NewPermission::user(a.as_str(), "bob", Role::Writer))
        .unwrap();

    assert!(db.has_role(&ctx, &a, "bob", "READER").unwrap());
    assert!(!db.has_role(&ctx, &b, "bob", "READER").unwrap());
}

#[test]
fn test_permission_crud() {
    let (_dir, db) = test_db();
    let ctx = Context::background();
    let file = shared_file(&db, &ctx);

    let grant = db
        .create_permission(
            &ctx,
            NewPermission {
                allow_share: true,
                ..NewPermission::user(file.as_str(), "bob", Role::Commenter)
            },
        )
        .unwrap();
    let fetched = db.get_permission(&ctx, &grant.id).unwrap().unwrap();
    assert_eq!(fetched, grant);
    assert!(fetched.allow_share);

    let updated = db
        .update_permission(
            &ctx,
            &grant.id,
            PermissionUpdate {
                grantee_id: Some("team-7".to_string()),
                grantee_type: GranteeType::Group,
                role: Role::Writer,
                allow_share: false,
            },
        )
        .unwrap();
    assert_eq!(updated.role, Role::Writer);
    assert_eq!(updated.grantee_type, GranteeType::Group);
    assert!(db.has_role(&ctx, &file, "team-7", "WRITER").unwrap());
    assert!(!db.has_role(&ctx, &file, "bob", "READER").unwrap());

    db.delete_permission(&ctx, &grant.id).unwrap();
    assert!(db.get_permission(&ctx, &grant.id).unwrap().is_none());
    assert!(db.list_permissions(&ctx, &file).unwrap().is_empty());
    assert!(db
        .delete_permission(&ctx, &grant.id)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_create_permission_requires_file() {
    let (_dir, db) = test_db();
    let ctx = Context::background();

    let err = db
        .create_permission(&ctx, NewPermission::user("ghost", "bob", Role::Reader))
        .unwrap_err();
    assert!(err.is_not_found());
}
