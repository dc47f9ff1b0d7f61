use chrono::Utc;

use super::db::*;
use super::files::{check_parent, insert_file, load_file, require_file};
use super::models::FileRecord;
use crate::context::Context;

impl Database {
    /// Duplicate a file's current metadata as a fresh lineage.
    ///
    /// The copy gets a new id, the given parent and name, fresh timestamps,
    /// `version` 1, and cleared star, trash and view state. Revisions and
    /// permissions are not carried over. Source read and copy insert share one
    /// write transaction, so a concurrently deleted source is `NotFound`.
    pub fn copy(
        &self,
        ctx: &Context,
        file_id: &str,
        new_parent_id: Option<&str>,
        new_name: &str,
    ) -> StoreResult<FileRecord> {
        let write_txn = self.begin_write(ctx)?;
        let source = require_file(&write_txn, file_id)?;
        check_parent(&write_txn, &source.owner_id, new_parent_id)?;

        let copy = fresh_copy(&source, new_parent_id, new_name);
        insert_file(&write_txn, &copy)?;

        // Re-read so the caller sees exactly what was persisted.
        let persisted = load_file(&write_txn, &copy.id)?
            .ok_or_else(|| StoreError::not_found("file", copy.id.as_str()))?;
        self.commit(ctx, write_txn)?;

        tracing::debug!(
            source_id = %file_id,
            file_id = %persisted.id,
            parent_id = ?new_parent_id,
            "Copied file"
        );
        Ok(persisted)
    }
}

fn fresh_copy(source: &FileRecord, new_parent_id: Option<&str>, new_name: &str) -> FileRecord {
    let now = Utc::now();
    FileRecord {
        id: uuid::Uuid::new_v4().to_string(),
        parent_id: new_parent_id.map(str::to_string),
        name: new_name.to_string(),
        created_at: now,
        updated_at: now,
        starred: false,
        is_trashed: false,
        trashed_at: None,
        last_viewed_at: None,
        viewed_by_me: false,
        version: 1,
        ..source.clone()
    }
}
