use chrono::Utc;
use redb::WriteTransaction;

use super::db::*;
use super::files::{remove_file, require_file};
use super::models::{StorageAccount, StorageSummary};
use super::permissions::remove_permissions;
use super::revisions::remove_revisions;
use super::tables::*;
use crate::context::Context;

/// What a purge removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PurgedFile {
    pub revisions: u64,
    pub permissions: u64,
    pub released_bytes: u64,
}

impl Database {
    // ========================================================================
    // Storage accounts
    // ========================================================================

    /// Create the storage counters for a user, starting at zero usage.
    pub fn create_account(
        &self,
        ctx: &Context,
        user_id: &str,
        storage_quota: u64,
    ) -> StoreResult<StorageAccount> {
        if user_id.trim().is_empty() {
            return Err(StoreError::invalid("user_id is required"));
        }

        let write_txn = self.begin_write(ctx)?;
        if load::<StorageAccount>(&write_txn, ACCOUNTS, user_id)?.is_some() {
            return Err(StoreError::conflict(format!(
                "storage account already exists for {user_id}"
            )));
        }

        let now = Utc::now();
        let account = StorageAccount {
            user_id: user_id.to_string(),
            storage_quota,
            used_space: 0,
            created_at: now,
            updated_at: now,
        };
        store(&write_txn, ACCOUNTS, user_id, &account)?;
        self.commit(ctx, write_txn)?;

        tracing::debug!(user_id = %user_id, storage_quota, "Created storage account");
        Ok(account)
    }

    pub fn get_account(&self, ctx: &Context, user_id: &str) -> StoreResult<Option<StorageAccount>> {
        let read_txn = self.begin_read(ctx)?;
        read(&read_txn, ACCOUNTS, user_id)
    }

    pub fn set_quota(&self, ctx: &Context, user_id: &str, storage_quota: u64) -> StoreResult<()> {
        self.mutate_account(ctx, user_id, |account| {
            account.storage_quota = storage_quota;
        })?;
        Ok(())
    }

    /// Overwrite `used_space` with an absolute value. Exceeding the quota is allowed.
    pub fn record_usage(&self, ctx: &Context, user_id: &str, used_space: u64) -> StoreResult<()> {
        let account = self.mutate_account(ctx, user_id, |account| {
            account.used_space = used_space;
        })?;
        warn_if_over_quota(&account);
        Ok(())
    }

    /// Add `delta` (possibly negative) to `used_space` atomically; returns the new total.
    pub fn adjust_usage(&self, ctx: &Context, user_id: &str, delta: i64) -> StoreResult<u64> {
        let write_txn = self.begin_write(ctx)?;
        let used = apply_usage_delta(&write_txn, user_id, delta)?;
        self.commit(ctx, write_txn)?;
        Ok(used)
    }

    /// Set a file's size and move its owner's usage by the difference, in one transaction.
    ///
    /// Returns the owner's new `used_space`. The owner must have a storage account.
    pub fn resize_file(&self, ctx: &Context, file_id: &str, new_size: u64) -> StoreResult<u64> {
        let write_txn = self.begin_write(ctx)?;
        let mut file = require_file(&write_txn, file_id)?;
        let delta = size_delta(file.size, new_size);

        file.size = new_size;
        file.updated_at = Utc::now();
        store(&write_txn, FILES, file_id, &file)?;
        let used = apply_usage_delta(&write_txn, &file.owner_id, delta)?;
        self.commit(ctx, write_txn)?;

        tracing::debug!(file_id = %file_id, size = new_size, delta, "Resized file");
        Ok(used)
    }

    /// Permanently delete a file with its revisions and grants, releasing its size
    /// from the owner's usage.
    ///
    /// Unlike [`Database::delete`] this cascades. An owner without a storage
    /// account is not an error; there is nothing to release against.
    pub fn purge_file(&self, ctx: &Context, file_id: &str) -> StoreResult<PurgedFile> {
        let write_txn = self.begin_write(ctx)?;
        let file = require_file(&write_txn, file_id)?;

        let revisions = remove_revisions(&write_txn, file_id)?;
        let permissions = remove_permissions(&write_txn, file_id)?;
        remove_file(&write_txn, &file)?;

        let has_account = load::<StorageAccount>(&write_txn, ACCOUNTS, &file.owner_id)?.is_some();
        if has_account {
            apply_usage_delta(&write_txn, &file.owner_id, size_delta(file.size, 0))?;
        }
        self.commit(ctx, write_txn)?;

        tracing::debug!(
            file_id = %file_id,
            owner_id = %file.owner_id,
            revisions,
            permissions,
            "Purged file"
        );
        Ok(PurgedFile {
            revisions,
            permissions,
            released_bytes: if has_account { file.size } else { 0 },
        })
    }

    /// Quota, usage and headroom for a user. Reporting only.
    pub fn storage_summary(&self, ctx: &Context, user_id: &str) -> StoreResult<StorageSummary> {
        let account = self
            .get_account(ctx, user_id)?
            .ok_or_else(|| StoreError::not_found("storage account", user_id))?;
        Ok(account.summary())
    }

    fn mutate_account<F>(&self, ctx: &Context, user_id: &str, f: F) -> StoreResult<StorageAccount>
    where
        F: FnOnce(&mut StorageAccount),
    {
        let write_txn = self.begin_write(ctx)?;
        let mut account = require_account(&write_txn, user_id)?;
        f(&mut account);
        account.updated_at = Utc::now();
        store(&write_txn, ACCOUNTS, user_id, &account)?;
        self.commit(ctx, write_txn)?;
        Ok(account)
    }
}

fn require_account(txn: &WriteTransaction, user_id: &str) -> StoreResult<StorageAccount> {
    load(txn, ACCOUNTS, user_id)?.ok_or_else(|| StoreError::not_found("storage account", user_id))
}

fn size_delta(old: u64, new: u64) -> i64 {
    let delta = i128::from(new) - i128::from(old);
    delta.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

fn apply_usage_delta(txn: &WriteTransaction, user_id: &str, delta: i64) -> StoreResult<u64> {
    let mut account = require_account(txn, user_id)?;
    let used = if delta >= 0 {
        account.used_space.saturating_add(delta.unsigned_abs())
    } else {
        let release = delta.unsigned_abs();
        if release > account.used_space {
            tracing::warn!(
                user_id = %user_id,
                used_space = account.used_space,
                release,
                "Usage release exceeds recorded usage, clamping to zero"
            );
        }
        account.used_space.saturating_sub(release)
    };

    account.used_space = used;
    account.updated_at = Utc::now();
    store(txn, ACCOUNTS, user_id, &account)?;
    warn_if_over_quota(&account);
    Ok(used)
}

fn warn_if_over_quota(account: &StorageAccount) {
    if account.summary().over_quota {
        tracing::warn!(
            user_id = %account.user_id,
            used_space = account.used_space,
            storage_quota = account.storage_quota,
            "Recorded usage exceeds quota"
        );
    }
}
