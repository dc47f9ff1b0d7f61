//! Async facade over the metadata store.
//!
//! Each component is a trait so callers can depend on the behaviour rather
//! than on redb. [`MetadataService`] implements all of them by running the
//! synchronous [`Database`] operations on tokio's blocking pool.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::config::Config;
use crate::context::Context;
use crate::storage::models::{
    FilePermission, FileRecord, FileRevision, NewFile, NewPermission, NewRevision,
    PermissionUpdate, StorageAccount, StorageSummary,
};
use crate::storage::{
    Database, FilePage, ListQuery, PurgeStats, PurgedFile, Role, StoreError, StoreResult,
};

#[async_trait]
pub trait FileTree: Send + Sync {
    async fn create(&self, ctx: &Context, file: NewFile) -> StoreResult<String>;
    async fn get_by_id(&self, ctx: &Context, id: &str) -> StoreResult<Option<FileRecord>>;
    async fn get_by_path(
        &self,
        ctx: &Context,
        owner_id: &str,
        path: &str,
    ) -> StoreResult<Option<FileRecord>>;
    async fn update(&self, ctx: &Context, file: FileRecord) -> StoreResult<()>;
    async fn soft_delete(&self, ctx: &Context, id: &str) -> StoreResult<()>;
    async fn restore(&self, ctx: &Context, id: &str) -> StoreResult<()>;
    async fn delete(&self, ctx: &Context, id: &str) -> StoreResult<()>;
    async fn list(&self, ctx: &Context, query: ListQuery) -> StoreResult<FilePage>;
    async fn list_by_parent(
        &self,
        ctx: &Context,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> StoreResult<Vec<FileRecord>>;
    async fn list_starred(&self, ctx: &Context, owner_id: &str) -> StoreResult<Vec<FileRecord>>;
    async fn list_trashed(&self, ctx: &Context, owner_id: &str) -> StoreResult<Vec<FileRecord>>;
    async fn search(
        &self,
        ctx: &Context,
        owner_id: &str,
        query: &str,
    ) -> StoreResult<Vec<FileRecord>>;
    async fn get_tree(
        &self,
        ctx: &Context,
        owner_id: &str,
        root_id: Option<&str>,
    ) -> StoreResult<Vec<FileRecord>>;
    async fn get_subtree(
        &self,
        ctx: &Context,
        owner_id: &str,
        root_id: &str,
    ) -> StoreResult<Vec<FileRecord>>;
    async fn star(&self, ctx: &Context, id: &str) -> StoreResult<()>;
    async fn unstar(&self, ctx: &Context, id: &str) -> StoreResult<()>;
    async fn move_file(
        &self,
        ctx: &Context,
        id: &str,
        new_parent_id: Option<&str>,
    ) -> StoreResult<()>;
    async fn rename(&self, ctx: &Context, id: &str, new_name: &str) -> StoreResult<()>;
    async fn get_size(&self, ctx: &Context, id: &str) -> StoreResult<u64>;
    async fn update_size(&self, ctx: &Context, id: &str, size: u64) -> StoreResult<()>;
    async fn mark_viewed(&self, ctx: &Context, id: &str) -> StoreResult<()>;
    async fn set_indexable_text(&self, ctx: &Context, id: &str, text: &str) -> StoreResult<()>;
    async fn get_indexable_text(&self, ctx: &Context, id: &str) -> StoreResult<Option<String>>;
    async fn verify_integrity(&self, ctx: &Context, id: &str) -> StoreResult<bool>;
    async fn checksums(&self, ctx: &Context, id: &str) -> StoreResult<BTreeMap<String, String>>;
}

#[async_trait]
pub trait Revisions: Send + Sync {
    async fn create_revision(
        &self,
        ctx: &Context,
        revision: NewRevision,
        revision_id: i64,
    ) -> StoreResult<String>;
    async fn commit_revision(&self, ctx: &Context, revision: NewRevision)
        -> StoreResult<FileRevision>;
    async fn list_revisions(&self, ctx: &Context, file_id: &str) -> StoreResult<Vec<FileRevision>>;
    async fn get_revision(
        &self,
        ctx: &Context,
        file_id: &str,
        revision_id: i64,
    ) -> StoreResult<Option<FileRevision>>;
    async fn delete_revision(&self, ctx: &Context, id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait Permissions: Send + Sync {
    async fn has_role(
        &self,
        ctx: &Context,
        file_id: &str,
        grantee_id: &str,
        required_role: &str,
    ) -> StoreResult<bool>;
    async fn effective_role(
        &self,
        ctx: &Context,
        file_id: &str,
        grantee_id: &str,
    ) -> StoreResult<Option<Role>>;
    async fn create_permission(
        &self,
        ctx: &Context,
        permission: NewPermission,
    ) -> StoreResult<FilePermission>;
    async fn get_permission(&self, ctx: &Context, id: &str) -> StoreResult<Option<FilePermission>>;
    async fn list_permissions(
        &self,
        ctx: &Context,
        file_id: &str,
    ) -> StoreResult<Vec<FilePermission>>;
    async fn update_permission(
        &self,
        ctx: &Context,
        id: &str,
        update: PermissionUpdate,
    ) -> StoreResult<FilePermission>;
    async fn delete_permission(&self, ctx: &Context, id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait Copier: Send + Sync {
    async fn copy(
        &self,
        ctx: &Context,
        file_id: &str,
        new_parent_id: Option<&str>,
        new_name: &str,
    ) -> StoreResult<FileRecord>;
}

#[async_trait]
pub trait QuotaLedger: Send + Sync {
    async fn create_account(
        &self,
        ctx: &Context,
        user_id: &str,
        storage_quota: u64,
    ) -> StoreResult<StorageAccount>;
    async fn get_account(&self, ctx: &Context, user_id: &str)
        -> StoreResult<Option<StorageAccount>>;
    async fn set_quota(&self, ctx: &Context, user_id: &str, storage_quota: u64) -> StoreResult<()>;
    async fn record_usage(&self, ctx: &Context, user_id: &str, used_space: u64)
        -> StoreResult<()>;
    async fn adjust_usage(&self, ctx: &Context, user_id: &str, delta: i64) -> StoreResult<u64>;
    async fn resize_file(&self, ctx: &Context, file_id: &str, new_size: u64) -> StoreResult<u64>;
    async fn purge_file(&self, ctx: &Context, file_id: &str) -> StoreResult<PurgedFile>;
    async fn storage_summary(&self, ctx: &Context, user_id: &str) -> StoreResult<StorageSummary>;
}

/// The store plus the configuration it was opened with.
#[derive(Clone)]
pub struct MetadataService {
    db: Database,
    config: Config,
}

impl MetadataService {
    pub fn open(config: Config) -> StoreResult<Self> {
        let db = Database::open(&config.data_dir)?;
        tracing::info!(data_dir = %config.data_dir, "Metadata store opened");
        Ok(Self { db, config })
    }

    pub fn new(db: Database, config: Config) -> Self {
        Self { db, config }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A context carrying the configured operation timeout.
    pub fn context(&self) -> Context {
        self.config.context()
    }

    /// Delete every record. Refused unless the service runs in test mode.
    pub async fn purge_all(&self, ctx: &Context) -> StoreResult<PurgeStats> {
        if !self.config.test_mode {
            return Err(StoreError::invalid("purge is only available in test mode"));
        }
        self.run(ctx, |db, ctx| db.purge_all(ctx)).await
    }

    /// Run a store operation on the blocking pool.
    ///
    /// The outcome always comes from the task itself. Its pre-commit context
    /// check decides between commit and abort, so a `Cancelled` result means
    /// nothing was written and any other result reflects what was.
    async fn run<T, F>(&self, ctx: &Context, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database, &Context) -> StoreResult<T> + Send + 'static,
    {
        ctx.check()?;
        let db = self.db.clone();
        let task_ctx = ctx.clone();
        tokio::task::spawn_blocking(move || op(&db, &task_ctx)).await?
    }
}

#[async_trait]
impl FileTree for MetadataService {
    async fn create(&self, ctx: &Context, file: NewFile) -> StoreResult<String> {
        self.run(ctx, move |db, ctx| db.create(ctx, file)).await
    }

    async fn get_by_id(&self, ctx: &Context, id: &str) -> StoreResult<Option<FileRecord>> {
        let id = id.to_string();
        self.run(ctx, move |db, ctx| db.get_by_id(ctx, &id)).await
    }

    async fn get_by_path(
        &self,
        ctx: &Context,
        owner_id: &str,
        path: &str,
    ) -> StoreResult<Option<FileRecord>> {
        let (owner_id, path) = (owner_id.to_string(), path.to_string());
        self.run(ctx, move |db, ctx| db.get_by_path(ctx, &owner_id, &path))
            .await
    }

    async fn update(&self, ctx: &Context, file: FileRecord) -> StoreResult<()> {
        self.run(ctx, move |db, ctx| db.update(ctx, &file)).await
    }

    async fn soft_delete(&self, ctx: &Context, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.run(ctx, move |db, ctx| db.soft_delete(ctx, &id)).await
    }

    async fn restore(&self, ctx: &Context, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.run(ctx, move |db, ctx| db.restore(ctx, &id)).await
    }

    async fn delete(&self, ctx: &Context, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.run(ctx, move |db, ctx| db.delete(ctx, &id)).await
    }

    async fn list(&self, ctx: &Context, query: ListQuery) -> StoreResult<FilePage> {
        self.run(ctx, move |db, ctx| db.list(ctx, &query)).await
    }

    async fn list_by_parent(
        &self,
        ctx: &Context,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> StoreResult<Vec<FileRecord>> {
        let owner_id = owner_id.to_string();
        let parent_id = parent_id.map(str::to_string);
        self.run(ctx, move |db, ctx| {
            db.list_by_parent(ctx, &owner_id, parent_id.as_deref())
        })
        .await
    }

    async fn list_starred(&self, ctx: &Context, owner_id: &str) -> StoreResult<Vec<FileRecord>> {
        let owner_id = owner_id.to_string();
        self.run(ctx, move |db, ctx| db.list_starred(ctx, &owner_id))
            .await
    }

    async fn list_trashed(&self, ctx: &Context, owner_id: &str) -> StoreResult<Vec<FileRecord>> {
        let owner_id = owner_id.to_string();
        self.run(ctx, move |db, ctx| db.list_trashed(ctx, &owner_id))
            .await
    }

    async fn search(
        &self,
        ctx: &Context,
        owner_id: &str,
        query: &str,
    ) -> StoreResult<Vec<FileRecord>> {
        let (owner_id, query) = (owner_id.to_string(), query.to_string());
        self.run(ctx, move |db, ctx| db.search(ctx, &owner_id, &query))
            .await
    }

    async fn get_tree(
        &self,
        ctx: &Context,
        owner_id: &str,
        root_id: Option<&str>,
    ) -> StoreResult<Vec<FileRecord>> {
        let owner_id = owner_id.to_string();
        let root_id = root_id.map(str::to_string);
        self.run(ctx, move |db, ctx| {
            db.get_tree(ctx, &owner_id, root_id.as_deref())
        })
        .await
    }

    async fn get_subtree(
        &self,
        ctx: &Context,
        owner_id: &str,
        root_id: &str,
    ) -> StoreResult<Vec<FileRecord>> {
        let (owner_id, root_id) = (owner_id.to_string(), root_id.to_string());
        self.run(ctx, move |db, ctx| db.get_subtree(ctx, &owner_id, &root_id))
            .await
    }

    async fn star(&self, ctx: &Context, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.run(ctx, move |db, ctx| db.star(ctx, &id)).await
    }

    async fn unstar(&self, ctx: &Context, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.run(ctx, move |db, ctx| db.unstar(ctx, &id)).await
    }

    async fn move_file(
        &self,
        ctx: &Context,
        id: &str,
        new_parent_id: Option<&str>,
    ) -> StoreResult<()> {
        let id = id.to_string();
        let new_parent_id = new_parent_id.map(str::to_string);
        self.run(ctx, move |db, ctx| {
            db.move_file(ctx, &id, new_parent_id.as_deref())
        })
        .await
    }

    async fn rename(&self, ctx: &Context, id: &str, new_name: &str) -> StoreResult<()> {
        let (id, new_name) = (id.to_string(), new_name.to_string());
        self.run(ctx, move |db, ctx| db.rename(ctx, &id, &new_name))
            .await
    }

    async fn get_size(&self, ctx: &Context, id: &str) -> StoreResult<u64> {
        let id = id.to_string();
        self.run(ctx, move |db, ctx| db.get_size(ctx, &id)).await
    }

    async fn update_size(&self, ctx: &Context, id: &str, size: u64) -> StoreResult<()> {
        let id = id.to_string();
        self.run(ctx, move |db, ctx| db.update_size(ctx, &id, size))
            .await
    }

    async fn mark_viewed(&self, ctx: &Context, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.run(ctx, move |db, ctx| db.mark_viewed(ctx, &id)).await
    }

    async fn set_indexable_text(&self, ctx: &Context, id: &str, text: &str) -> StoreResult<()> {
        let (id, text) = (id.to_string(), text.to_string());
        self.run(ctx, move |db, ctx| db.set_indexable_text(ctx, &id, &text))
            .await
    }

    async fn get_indexable_text(&self, ctx: &Context, id: &str) -> StoreResult<Option<String>> {
        let id = id.to_string();
        self.run(ctx, move |db, ctx| db.get_indexable_text(ctx, &id))
            .await
    }

    async fn verify_integrity(&self, ctx: &Context, id: &str) -> StoreResult<bool> {
        let id = id.to_string();
        self.run(ctx, move |db, ctx| db.verify_integrity(ctx, &id))
            .await
    }

    async fn checksums(&self, ctx: &Context, id: &str) -> StoreResult<BTreeMap<String, String>> {
        let id = id.to_string();
        self.run(ctx, move |db, ctx| db.checksums(ctx, &id)).await
    }
}

#[async_trait]
impl Revisions for MetadataService {
    async fn create_revision(
        &self,
        ctx: &Context,
        revision: NewRevision,
        revision_id: i64,
    ) -> StoreResult<String> {
        self.run(ctx, move |db, ctx| {
            db.create_revision(ctx, revision, revision_id)
        })
        .await
    }

    async fn commit_revision(
        &self,
        ctx: &Context,
        revision: NewRevision,
    ) -> StoreResult<FileRevision> {
        self.run(ctx, move |db, ctx| db.commit_revision(ctx, revision))
            .await
    }

    async fn list_revisions(&self, ctx: &Context, file_id: &str) -> StoreResult<Vec<FileRevision>> {
        let file_id = file_id.to_string();
        self.run(ctx, move |db, ctx| db.list_revisions(ctx, &file_id))
            .await
    }

    async fn get_revision(
        &self,
        ctx: &Context,
        file_id: &str,
        revision_id: i64,
    ) -> StoreResult<Option<FileRevision>> {
        let file_id = file_id.to_string();
        self.run(ctx, move |db, ctx| {
            db.get_revision(ctx, &file_id, revision_id)
        })
        .await
    }

    async fn delete_revision(&self, ctx: &Context, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.run(ctx, move |db, ctx| db.delete_revision(ctx, &id))
            .await
    }
}

#[async_trait]
impl Permissions for MetadataService {
    async fn has_role(
        &self,
        ctx: &Context,
        file_id: &str,
        grantee_id: &str,
        required_role: &str,
    ) -> StoreResult<bool> {
        let (file_id, grantee_id, required_role) = (
            file_id.to_string(),
            grantee_id.to_string(),
            required_role.to_string(),
        );
        self.run(ctx, move |db, ctx| {
            db.has_role(ctx, &file_id, &grantee_id, &required_role)
        })
        .await
    }

    async fn effective_role(
        &self,
        ctx: &Context,
        file_id: &str,
        grantee_id: &str,
    ) -> StoreResult<Option<Role>> {
        let (file_id, grantee_id) = (file_id.to_string(), grantee_id.to_string());
        self.run(ctx, move |db, ctx| {
            db.effective_role(ctx, &file_id, &grantee_id)
        })
        .await
    }

    async fn create_permission(
        &self,
        ctx: &Context,
        permission: NewPermission,
    ) -> StoreResult<FilePermission> {
        self.run(ctx, move |db, ctx| db.create_permission(ctx, permission))
            .await
    }

    async fn get_permission(&self, ctx: &Context, id: &str) -> StoreResult<Option<FilePermission>> {
        let id = id.to_string();
        self.run(ctx, move |db, ctx| db.get_permission(ctx, &id))
            .await
    }

    async fn list_permissions(
        &self,
        ctx: &Context,
        file_id: &str,
    ) -> StoreResult<Vec<FilePermission>> {
        let file_id = file_id.to_string();
        self.run(ctx, move |db, ctx| db.list_permissions(ctx, &file_id))
            .await
    }

    async fn update_permission(
        &self,
        ctx: &Context,
        id: &str,
        update: PermissionUpdate,
    ) -> StoreResult<FilePermission> {
        let id = id.to_string();
        self.run(ctx, move |db, ctx| db.update_permission(ctx, &id, update))
            .await
    }

    async fn delete_permission(&self, ctx: &Context, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.run(ctx, move |db, ctx| db.delete_permission(ctx, &id))
            .await
    }
}

#[async_trait]
impl Copier for MetadataService {
    async fn copy(
        &self,
        ctx: &Context,
        file_id: &str,
        new_parent_id: Option<&str>,
        new_name: &str,
    ) -> StoreResult<FileRecord> {
        let (file_id, new_name) = (file_id.to_string(), new_name.to_string());
        let new_parent_id = new_parent_id.map(str::to_string);
        self.run(ctx, move |db, ctx| {
            db.copy(ctx, &file_id, new_parent_id.as_deref(), &new_name)
        })
        .await
    }
}

#[async_trait]
impl QuotaLedger for MetadataService {
    async fn create_account(
        &self,
        ctx: &Context,
        user_id: &str,
        storage_quota: u64,
    ) -> StoreResult<StorageAccount> {
        let user_id = user_id.to_string();
        self.run(ctx, move |db, ctx| {
            db.create_account(ctx, &user_id, storage_quota)
        })
        .await
    }

    async fn get_account(
        &self,
        ctx: &Context,
        user_id: &str,
    ) -> StoreResult<Option<StorageAccount>> {
        let user_id = user_id.to_string();
        self.run(ctx, move |db, ctx| db.get_account(ctx, &user_id))
            .await
    }

    async fn set_quota(&self, ctx: &Context, user_id: &str, storage_quota: u64) -> StoreResult<()> {
        let user_id = user_id.to_string();
        self.run(ctx, move |db, ctx| db.set_quota(ctx, &user_id, storage_quota))
            .await
    }

    async fn record_usage(
        &self,
        ctx: &Context,
        user_id: &str,
        used_space: u64,
    ) -> StoreResult<()> {
        let user_id = user_id.to_string();
        self.run(ctx, move |db, ctx| db.record_usage(ctx, &user_id, used_space))
            .await
    }

    async fn adjust_usage(&self, ctx: &Context, user_id: &str, delta: i64) -> StoreResult<u64> {
        let user_id = user_id.to_string();
        self.run(ctx, move |db, ctx| db.adjust_usage(ctx, &user_id, delta))
            .await
    }

    async fn resize_file(&self, ctx: &Context, file_id: &str, new_size: u64) -> StoreResult<u64> {
        let file_id = file_id.to_string();
        self.run(ctx, move |db, ctx| db.resize_file(ctx, &file_id, new_size))
            .await
    }

    async fn purge_file(&self, ctx: &Context, file_id: &str) -> StoreResult<PurgedFile> {
        let file_id = file_id.to_string();
        self.run(ctx, move |db, ctx| db.purge_file(ctx, &file_id))
            .await
    }

    async fn storage_summary(&self, ctx: &Context, user_id: &str) -> StoreResult<StorageSummary> {
        let user_id = user_id.to_string();
        self.run(ctx, move |db, ctx| db.storage_summary(ctx, &user_id))
            .await
    }
}
