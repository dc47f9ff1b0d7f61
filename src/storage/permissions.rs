use chrono::Utc;
use redb::{ReadTransaction, WriteTransaction};

use super::db::*;
use super::files::require_file;
use super::models::{FilePermission, NewPermission, PermissionUpdate};
use super::roles::{Role, RoleRequirement};
use super::tables::*;
use crate::context::Context;

impl Database {
    // ========================================================================
    // Permission resolution
    // ========================================================================

    /// Whether `grantee_id` holds at least `required_role` on `file_id`.
    ///
    /// Grants are unioned; any one of them reaching the required rank is enough.
    /// An unrecognised role string only matches a grant with exactly that name.
    pub fn has_role(
        &self,
        ctx: &Context,
        file_id: &str,
        grantee_id: &str,
        required_role: &str,
    ) -> StoreResult<bool> {
        let requirement = RoleRequirement::parse(required_role);
        let read_txn = self.begin_read(ctx)?;
        let granted = grants_for(&read_txn, file_id, grantee_id)?
            .into_iter()
            .any(|p| requirement.is_satisfied_by(p.role));
        Ok(granted)
    }

    /// The strongest role any of the grantee's grants gives on the file.
    pub fn effective_role(
        &self,
        ctx: &Context,
        file_id: &str,
        grantee_id: &str,
    ) -> StoreResult<Option<Role>> {
        let read_txn = self.begin_read(ctx)?;
        let role = grants_for(&read_txn, file_id, grantee_id)?
            .into_iter()
            .map(|p| p.role)
            .max();
        Ok(role)
    }

    // ========================================================================
    // Permission operations
    // ========================================================================

    pub fn create_permission(
        &self,
        ctx: &Context,
        permission: NewPermission,
    ) -> StoreResult<FilePermission> {
        let write_txn = self.begin_write(ctx)?;
        require_file(&write_txn, &permission.file_id)?;

        let record = FilePermission {
            id: uuid::Uuid::new_v4().to_string(),
            file_id: permission.file_id,
            grantee_id: permission.grantee_id,
            grantee_type: permission.grantee_type,
            role: permission.role,
            allow_share: permission.allow_share,
            created_at: Utc::now(),
        };
        store(&write_txn, PERMISSIONS, &record.id, &record)?;
        index_insert(&write_txn, FILE_PERMISSIONS, &record.file_id, &record.id)?;
        self.commit(ctx, write_txn)?;

        tracing::debug!(
            file_id = %record.file_id,
            grantee_id = ?record.grantee_id,
            role = %record.role,
            "Granted permission"
        );
        Ok(record)
    }

    pub fn get_permission(&self, ctx: &Context, id: &str) -> StoreResult<Option<FilePermission>> {
        let read_txn = self.begin_read(ctx)?;
        read(&read_txn, PERMISSIONS, id)
    }

    /// All grants on a file, newest first.
    pub fn list_permissions(
        &self,
        ctx: &Context,
        file_id: &str,
    ) -> StoreResult<Vec<FilePermission>> {
        let read_txn = self.begin_read(ctx)?;
        let mut permissions = file_permissions(&read_txn, file_id)?;
        permissions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(permissions)
    }

    /// Replace the grantee, role and share flag of a grant.
    pub fn update_permission(
        &self,
        ctx: &Context,
        id: &str,
        update: PermissionUpdate,
    ) -> StoreResult<FilePermission> {
        let write_txn = self.begin_write(ctx)?;
        let mut permission: FilePermission = load(&write_txn, PERMISSIONS, id)?
            .ok_or_else(|| StoreError::not_found("permission", id))?;

        permission.grantee_id = update.grantee_id;
        permission.grantee_type = update.grantee_type;
        permission.role = update.role;
        permission.allow_share = update.allow_share;
        store(&write_txn, PERMISSIONS, id, &permission)?;
        self.commit(ctx, write_txn)?;

        tracing::debug!(permission = %id, role = %permission.role, "Updated permission");
        Ok(permission)
    }

    pub fn delete_permission(&self, ctx: &Context, id: &str) -> StoreResult<()> {
        let write_txn = self.begin_write(ctx)?;
        let permission: FilePermission = load(&write_txn, PERMISSIONS, id)?
            .ok_or_else(|| StoreError::not_found("permission", id))?;
        erase(&write_txn, PERMISSIONS, id)?;
        index_remove(&write_txn, FILE_PERMISSIONS, &permission.file_id, id)?;
        self.commit(ctx, write_txn)?;

        tracing::debug!(file_id = %permission.file_id, permission = %id, "Revoked permission");
        Ok(())
    }
}

fn file_permissions(txn: &ReadTransaction, file_id: &str) -> StoreResult<Vec<FilePermission>> {
    let ids = read_index(txn, FILE_PERMISSIONS, file_id)?;
    let mut permissions = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(permission) = read::<FilePermission>(txn, PERMISSIONS, &id)? {
            permissions.push(permission);
        }
    }
    Ok(permissions)
}

fn grants_for(
    txn: &ReadTransaction,
    file_id: &str,
    grantee_id: &str,
) -> StoreResult<Vec<FilePermission>> {
    Ok(file_permissions(txn, file_id)?
        .into_iter()
        .filter(|p| p.grantee_id.as_deref() == Some(grantee_id))
        .collect())
}

/// Remove every grant on a file. Returns how many were removed.
pub(crate) fn remove_permissions(txn: &WriteTransaction, file_id: &str) -> StoreResult<u64> {
    let ids = load_index(txn, FILE_PERMISSIONS, file_id)?;
    for id in &ids {
        erase(txn, PERMISSIONS, id)?;
    }
    erase(txn, FILE_PERMISSIONS, file_id)?;
    Ok(ids.len() as u64)
}
