use chrono::Utc;
use redb::WriteTransaction;

use super::db::*;
use super::files::require_file;
use super::models::{FileRevision, NewRevision};
use super::tables::*;
use crate::context::Context;

impl Database {
    // ========================================================================
    // Revision operations
    // ========================================================================

    /// Append a revision with a caller-assigned `revision_id`.
    ///
    /// The number must be greater than every revision already recorded for the
    /// file; a collision or a step backwards is a [`StoreError::Conflict`].
    pub fn create_revision(
        &self,
        ctx: &Context,
        revision: NewRevision,
        revision_id: i64,
    ) -> StoreResult<String> {
        let write_txn = self.begin_write(ctx)?;
        require_file(&write_txn, &revision.file_id)?;

        if let Some(max) = max_revision_id(&write_txn, &revision.file_id)? {
            if revision_id <= max {
                return Err(StoreError::conflict(format!(
                    "revision {revision_id} for file {} is not after {max}",
                    revision.file_id
                )));
            }
        }

        let record = insert_revision(&write_txn, revision, revision_id)?;
        self.commit(ctx, write_txn)?;

        tracing::debug!(
            file_id = %record.file_id,
            revision_id = record.revision_id,
            "Created revision"
        );
        Ok(record.id)
    }

    /// Record a new content version and make it the file's current one.
    ///
    /// The revision number is the file's current maximum plus one, assigned in
    /// the same transaction that updates the file's content pointer, version
    /// and `revision_id`.
    pub fn commit_revision(&self, ctx: &Context, revision: NewRevision) -> StoreResult<FileRevision> {
        let write_txn = self.begin_write(ctx)?;
        let mut file = require_file(&write_txn, &revision.file_id)?;

        let next = match max_revision_id(&write_txn, &file.id)? {
            Some(max) => max.checked_add(1).ok_or_else(|| {
                StoreError::conflict(format!("revision numbers exhausted for file {}", file.id))
            })?,
            None => 1,
        };
        let record = insert_revision(&write_txn, revision, next)?;

        file.revision_id = Some(record.id.clone());
        file.version += 1;
        file.storage_path = record.storage_path.clone();
        file.size = record.size;
        file.md5_checksum = record.md5_checksum.clone();
        file.mime_type = record.mime_type.clone();
        file.updated_at = record.created_at;
        store(&write_txn, FILES, &file.id, &file)?;

        self.commit(ctx, write_txn)?;

        tracing::debug!(
            file_id = %file.id,
            revision_id = record.revision_id,
            version = file.version,
            "Committed revision"
        );
        Ok(record)
    }

    /// All revisions of a file, newest first.
    pub fn list_revisions(&self, ctx: &Context, file_id: &str) -> StoreResult<Vec<FileRevision>> {
        let read_txn = self.begin_read(ctx)?;
        let ids = read_index(&read_txn, FILE_REVISIONS, file_id)?;

        let mut revisions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(revision) = read::<FileRevision>(&read_txn, REVISIONS, &id)? {
                revisions.push(revision);
            }
        }
        revisions.sort_by(|a, b| b.revision_id.cmp(&a.revision_id));
        Ok(revisions)
    }

    /// The revision numbered `revision_id` of `file_id`.
    pub fn get_revision(
        &self,
        ctx: &Context,
        file_id: &str,
        revision_id: i64,
    ) -> StoreResult<Option<FileRevision>> {
        let read_txn = self.begin_read(ctx)?;
        for id in read_index(&read_txn, FILE_REVISIONS, file_id)? {
            if let Some(revision) = read::<FileRevision>(&read_txn, REVISIONS, &id)? {
                if revision.revision_id == revision_id {
                    return Ok(Some(revision));
                }
            }
        }
        Ok(None)
    }

    /// Delete one revision by its UUID. The owning file's `revision_id` is left as is.
    pub fn delete_revision(&self, ctx: &Context, id: &str) -> StoreResult<()> {
        let write_txn = self.begin_write(ctx)?;
        let revision: FileRevision =
            load(&write_txn, REVISIONS, id)?.ok_or_else(|| StoreError::not_found("revision", id))?;
        erase(&write_txn, REVISIONS, id)?;
        index_remove(&write_txn, FILE_REVISIONS, &revision.file_id, id)?;
        self.commit(ctx, write_txn)?;

        tracing::debug!(file_id = %revision.file_id, revision = %id, "Deleted revision");
        Ok(())
    }
}

fn insert_revision(
    txn: &WriteTransaction,
    revision: NewRevision,
    revision_id: i64,
) -> StoreResult<FileRevision> {
    let record = FileRevision {
        id: uuid::Uuid::new_v4().to_string(),
        file_id: revision.file_id,
        revision_id,
        storage_path: revision.storage_path,
        size: revision.size,
        md5_checksum: revision.md5_checksum,
        mime_type: revision.mime_type,
        user_id: revision.user_id,
        created_at: Utc::now(),
    };
    store(txn, REVISIONS, &record.id, &record)?;
    index_insert(txn, FILE_REVISIONS, &record.file_id, &record.id)?;
    Ok(record)
}

fn max_revision_id(txn: &WriteTransaction, file_id: &str) -> StoreResult<Option<i64>> {
    let mut max = None;
    for id in load_index(txn, FILE_REVISIONS, file_id)? {
        if let Some(revision) = load::<FileRevision>(txn, REVISIONS, &id)? {
            max = max.max(Some(revision.revision_id));
        }
    }
    Ok(max)
}

/// Remove every revision of a file. Returns how many were removed.
pub(crate) fn remove_revisions(txn: &WriteTransaction, file_id: &str) -> StoreResult<u64> {
    let ids = load_index(txn, FILE_REVISIONS, file_id)?;
    for id in &ids {
        erase(txn, REVISIONS, id)?;
    }
    erase(txn, FILE_REVISIONS, file_id)?;
    Ok(ids.len() as u64)
}
