use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use chrono::Utc;
use redb::{ReadTransaction, WriteTransaction};

use super::db::*;
use super::listing::{FilePage, ListQuery, ParentFilter, SortDirection, SortField};
use super::models::{FileRecord, NewFile};
use super::tables::*;
use crate::context::Context;

/// Page-size ceiling for the fixed-filter listings.
pub const LIST_CEILING: usize = 1000;
/// Page-size ceiling for [`Database::get_tree`].
pub const TREE_CEILING: usize = 10_000;

impl Database {
    // ========================================================================
    // File operations
    // ========================================================================

    /// Insert a new file and return its id.
    pub fn create(&self, ctx: &Context, file: NewFile) -> StoreResult<String> {
        if file.owner_id.trim().is_empty() {
            return Err(StoreError::invalid("owner_id is required"));
        }

        check_trash_state(file.is_trashed, file.trashed_at.is_some())?;

        let write_txn = self.begin_write(ctx)?;
        check_parent(&write_txn, &file.owner_id, file.parent_id.as_deref())?;

        let id = uuid::Uuid::new_v4().to_string();
        let record = file.into_record(id.clone(), Utc::now());
        insert_file(&write_txn, &record)?;
        self.commit(ctx, write_txn)?;

        tracing::debug!(file_id = %id, owner_id = %record.owner_id, "Created file");
        Ok(id)
    }

    /// Get a file by its UUID
    pub fn get_by_id(&self, ctx: &Context, id: &str) -> StoreResult<Option<FileRecord>> {
        let read_txn = self.begin_read(ctx)?;
        read(&read_txn, FILES, id)
    }

    /// Look up a root-level entry by exact name.
    ///
    /// Only a single segment is supported. A leading `/` is ignored, an empty
    /// path matches nothing, and duplicates resolve to the oldest live entry.
    pub fn get_by_path(
        &self,
        ctx: &Context,
        owner_id: &str,
        path: &str,
    ) -> StoreResult<Option<FileRecord>> {
        let name = path.strip_prefix('/').unwrap_or(path);
        if name.contains('/') {
            return Err(StoreError::invalid(format!(
                "multi-segment paths are not supported: {path}"
            )));
        }
        if name.is_empty() {
            return Ok(None);
        }

        let read_txn = self.begin_read(ctx)?;
        let found = owner_files(&read_txn, owner_id)?
            .into_iter()
            .filter(|f| f.parent_id.is_none() && f.name == name)
            .min_by(|a, b| {
                a.is_trashed
                    .cmp(&b.is_trashed)
                    .then(a.created_at.cmp(&b.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            });
        Ok(found)
    }

    /// Replace every mutable field of a file with the given record.
    ///
    /// `owner_id` and `created_at` cannot change; `updated_at` is always refreshed.
    pub fn update(&self, ctx: &Context, file: &FileRecord) -> StoreResult<()> {
        check_trash_state(file.is_trashed, file.trashed_at.is_some())?;

        let write_txn = self.begin_write(ctx)?;
        let existing = require_file(&write_txn, &file.id)?;

        if existing.owner_id != file.owner_id {
            return Err(StoreError::invalid("owner_id cannot be changed"));
        }
        if existing.parent_id != file.parent_id {
            check_move_target(&write_txn, &existing, file.parent_id.as_deref())?;
        }

        let mut replacement = file.clone();
        replacement.created_at = existing.created_at;
        replacement.updated_at = Utc::now();
        store(&write_txn, FILES, &replacement.id, &replacement)?;
        self.commit(ctx, write_txn)?;

        tracing::debug!(file_id = %file.id, "Updated file");
        Ok(())
    }

    /// Move a file to the trash.
    pub fn soft_delete(&self, ctx: &Context, id: &str) -> StoreResult<()> {
        self.mutate_file(ctx, id, |_, file| {
            let now = Utc::now();
            file.is_trashed = true;
            file.trashed_at = Some(now);
            file.updated_at = now;
            Ok(())
        })?;
        tracing::debug!(file_id = %id, "Trashed file");
        Ok(())
    }

    /// Take a file out of the trash. The parent's trash state is not checked.
    pub fn restore(&self, ctx: &Context, id: &str) -> StoreResult<()> {
        self.mutate_file(ctx, id, |_, file| {
            file.is_trashed = false;
            file.trashed_at = None;
            Ok(())
        })?;
        tracing::debug!(file_id = %id, "Restored file");
        Ok(())
    }

    /// Remove the file row permanently. Revisions and permissions are left in place.
    pub fn delete(&self, ctx: &Context, id: &str) -> StoreResult<()> {
        let write_txn = self.begin_write(ctx)?;
        let file = require_file(&write_txn, id)?;
        remove_file(&write_txn, &file)?;
        self.commit(ctx, write_txn)?;

        tracing::debug!(file_id = %id, "Deleted file");
        Ok(())
    }

    /// One page of the owner's files plus the total number of matches.
    pub fn list(&self, ctx: &Context, query: &ListQuery) -> StoreResult<FilePage> {
        let read_txn = self.begin_read(ctx)?;
        let files = owner_files(&read_txn, &query.owner_id)?;
        Ok(query.apply(files))
    }

    /// Live children of `parent_id` (root when `None`), by name.
    pub fn list_by_parent(
        &self,
        ctx: &Context,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> StoreResult<Vec<FileRecord>> {
        let query = ListQuery::new(owner_id)
            .parent(ParentFilter::from_parent_id(parent_id))
            .page(LIST_CEILING, 0)
            .order(SortField::Name, SortDirection::Asc);
        Ok(self.list(ctx, &query)?.files)
    }

    /// Starred live files at the owner's root.
    pub fn list_starred(&self, ctx: &Context, owner_id: &str) -> StoreResult<Vec<FileRecord>> {
        let query = ListQuery::new(owner_id)
            .starred(true)
            .page(LIST_CEILING, 0)
            .order(SortField::UpdatedAt, SortDirection::Desc);
        Ok(self.list(ctx, &query)?.files)
    }

    /// Trashed files at the owner's root, most recently trashed first.
    ///
    /// Use [`Database::list`] with [`ParentFilter::Any`] for the whole tree.
    pub fn list_trashed(&self, ctx: &Context, owner_id: &str) -> StoreResult<Vec<FileRecord>> {
        let query = ListQuery::new(owner_id)
            .trashed(true)
            .page(LIST_CEILING, 0)
            .order(SortField::TrashedAt, SortDirection::Desc);
        Ok(self.list(ctx, &query)?.files)
    }

    /// Case-insensitive substring search over name and indexable text of live files.
    pub fn search(
        &self,
        ctx: &Context,
        owner_id: &str,
        query: &str,
    ) -> StoreResult<Vec<FileRecord>> {
        let needle = query.to_lowercase();
        let read_txn = self.begin_read(ctx)?;
        let mut hits: Vec<FileRecord> = owner_files(&read_txn, owner_id)?
            .into_iter()
            .filter(|f| !f.is_trashed)
            .filter(|f| {
                f.name.to_lowercase().contains(&needle)
                    || f
                        .indexable_text
                        .as_deref()
                        .is_some_and(|text| text.to_lowercase().contains(&needle))
            })
            .collect();
        super::listing::sort_files(&mut hits, SortField::UpdatedAt, SortDirection::Desc);
        Ok(hits)
    }

    /// Every live file the owner has, as a flat list by name.
    ///
    /// `_root_id` is accepted for interface compatibility and ignored; use
    /// [`Database::get_subtree`] for a walk rooted at a folder.
    pub fn get_tree(
        &self,
        ctx: &Context,
        owner_id: &str,
        _root_id: Option<&str>,
    ) -> StoreResult<Vec<FileRecord>> {
        let query = ListQuery::new(owner_id)
            .parent(ParentFilter::Any)
            .page(TREE_CEILING, 0)
            .order(SortField::Name, SortDirection::Asc);
        Ok(self.list(ctx, &query)?.files)
    }

    /// Breadth-first walk of the live entries under `root_id`, root first.
    ///
    /// A trashed entry hides its whole subtree. An unknown root yields an empty list.
    pub fn get_subtree(
        &self,
        ctx: &Context,
        owner_id: &str,
        root_id: &str,
    ) -> StoreResult<Vec<FileRecord>> {
        let read_txn = self.begin_read(ctx)?;
        let files = owner_files(&read_txn, owner_id)?;

        let mut children: HashMap<String, Vec<FileRecord>> = HashMap::new();
        let mut root = None;
        for file in files {
            if file.is_trashed {
                continue;
            }
            if file.id == root_id {
                root = Some(file.clone());
            }
            if let Some(parent) = file.parent_id.clone() {
                children.entry(parent).or_default().push(file);
            }
        }

        let Some(root) = root else {
            return Ok(Vec::new());
        };

        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([root]);
        let mut walked = Vec::new();
        while let Some(file) = queue.pop_front() {
            if !seen.insert(file.id.clone()) {
                continue;
            }
            if let Some(mut kids) = children.remove(&file.id) {
                super::listing::sort_files(&mut kids, SortField::Name, SortDirection::Asc);
                queue.extend(kids);
            }
            walked.push(file);
        }
        Ok(walked)
    }

    pub fn star(&self, ctx: &Context, id: &str) -> StoreResult<()> {
        self.mutate_file(ctx, id, |_, file| {
            file.starred = true;
            Ok(())
        })?;
        Ok(())
    }

    pub fn unstar(&self, ctx: &Context, id: &str) -> StoreResult<()> {
        self.mutate_file(ctx, id, |_, file| {
            file.starred = false;
            Ok(())
        })?;
        Ok(())
    }

    /// Re-parent a file. `None` moves it to the owner's root.
    ///
    /// Moving a file under itself or one of its descendants is rejected.
    pub fn move_file(
        &self,
        ctx: &Context,
        id: &str,
        new_parent_id: Option<&str>,
    ) -> StoreResult<()> {
        self.mutate_file(ctx, id, |txn, file| {
            check_move_target(txn, file, new_parent_id)?;
            file.parent_id = new_parent_id.map(str::to_string);
            Ok(())
        })?;
        tracing::debug!(file_id = %id, parent_id = ?new_parent_id, "Moved file");
        Ok(())
    }

    pub fn rename(&self, ctx: &Context, id: &str, new_name: &str) -> StoreResult<()> {
        self.mutate_file(ctx, id, |_, file| {
            file.name = new_name.to_string();
            Ok(())
        })?;
        tracing::debug!(file_id = %id, name = %new_name, "Renamed file");
        Ok(())
    }

    /// Stored size of an existing file.
    pub fn get_size(&self, ctx: &Context, id: &str) -> StoreResult<u64> {
        let read_txn = self.begin_read(ctx)?;
        let file: FileRecord =
            read(&read_txn, FILES, id)?.ok_or_else(|| StoreError::not_found("file", id))?;
        Ok(file.size)
    }

    /// Set the stored size without touching the owner's usage.
    ///
    /// See [`Database::resize_file`] for the variant that keeps the quota ledger in step.
    pub fn update_size(&self, ctx: &Context, id: &str, size: u64) -> StoreResult<()> {
        self.mutate_file(ctx, id, |_, file| {
            file.size = size;
            Ok(())
        })?;
        Ok(())
    }

    pub fn mark_viewed(&self, ctx: &Context, id: &str) -> StoreResult<()> {
        self.mutate_file(ctx, id, |_, file| {
            file.last_viewed_at = Some(Utc::now());
            file.viewed_by_me = true;
            Ok(())
        })?;
        Ok(())
    }

    pub fn set_indexable_text(&self, ctx: &Context, id: &str, text: &str) -> StoreResult<()> {
        self.mutate_file(ctx, id, |_, file| {
            file.indexable_text = Some(text.to_string());
            Ok(())
        })?;
        Ok(())
    }

    /// Extracted text of an existing file, if any was recorded.
    pub fn get_indexable_text(&self, ctx: &Context, id: &str) -> StoreResult<Option<String>> {
        let read_txn = self.begin_read(ctx)?;
        let file: FileRecord =
            read(&read_txn, FILES, id)?.ok_or_else(|| StoreError::not_found("file", id))?;
        Ok(file.indexable_text)
    }

    /// Whether a row exists for `id`. Content is not re-hashed.
    pub fn verify_integrity(&self, ctx: &Context, id: &str) -> StoreResult<bool> {
        let read_txn = self.begin_read(ctx)?;
        Ok(read::<FileRecord>(&read_txn, FILES, id)?.is_some())
    }

    /// Checksums recorded on the row, keyed by algorithm (`md5`, `sha256`).
    pub fn checksums(&self, ctx: &Context, id: &str) -> StoreResult<BTreeMap<String, String>> {
        let read_txn = self.begin_read(ctx)?;
        let file: FileRecord =
            read(&read_txn, FILES, id)?.ok_or_else(|| StoreError::not_found("file", id))?;

        let mut checksums = BTreeMap::new();
        if let Some(md5) = file.md5_checksum {
            checksums.insert("md5".to_string(), md5);
        }
        if let Some(sha256) = file.sha256_checksum {
            checksums.insert("sha256".to_string(), sha256);
        }
        Ok(checksums)
    }

    /// Read-modify-write one file in a single transaction, bumping `updated_at`.
    pub(crate) fn mutate_file<F>(&self, ctx: &Context, id: &str, f: F) -> StoreResult<FileRecord>
    where
        F: FnOnce(&WriteTransaction, &mut FileRecord) -> StoreResult<()>,
    {
        let write_txn = self.begin_write(ctx)?;
        let mut file = require_file(&write_txn, id)?;
        file.updated_at = Utc::now();
        f(&write_txn, &mut file)?;
        store(&write_txn, FILES, id, &file)?;
        self.commit(ctx, write_txn)?;
        Ok(file)
    }
}

// ============================================================================
// Transaction-level helpers
// ============================================================================

pub(crate) fn load_file(txn: &WriteTransaction, id: &str) -> StoreResult<Option<FileRecord>> {
    load(txn, FILES, id)
}

pub(crate) fn require_file(txn: &WriteTransaction, id: &str) -> StoreResult<FileRecord> {
    load_file(txn, id)?.ok_or_else(|| StoreError::not_found("file", id))
}

/// Store a new record and add it to the owner index.
pub(crate) fn insert_file(txn: &WriteTransaction, file: &FileRecord) -> StoreResult<()> {
    debug_assert!(!file.id.is_empty(), "file id must not be empty");
    store(txn, FILES, &file.id, file)?;
    index_insert(txn, OWNER_FILES, &file.owner_id, &file.id)
}

/// Remove a record and its owner index entry.
pub(crate) fn remove_file(txn: &WriteTransaction, file: &FileRecord) -> StoreResult<()> {
    erase(txn, FILES, &file.id)?;
    index_remove(txn, OWNER_FILES, &file.owner_id, &file.id)
}

/// `is_trashed` and `trashed_at` are set and cleared together.
fn check_trash_state(is_trashed: bool, has_trashed_at: bool) -> StoreResult<()> {
    if is_trashed != has_trashed_at {
        return Err(StoreError::invalid("is_trashed and trashed_at must be set together"));
    }
    Ok(())
}

/// A parent, when given, must exist and belong to the same owner.
pub(crate) fn check_parent(
    txn: &WriteTransaction,
    owner_id: &str,
    parent_id: Option<&str>,
) -> StoreResult<()> {
    let Some(parent_id) = parent_id else {
        return Ok(());
    };
    let parent =
        load_file(txn, parent_id)?.ok_or_else(|| StoreError::not_found("parent", parent_id))?;
    if parent.owner_id != owner_id {
        return Err(StoreError::invalid(format!(
            "parent {parent_id} belongs to a different owner"
        )));
    }
    Ok(())
}

/// Validate a new parent for `file`: same owner, and not the file or any of its descendants.
fn check_move_target(
    txn: &WriteTransaction,
    file: &FileRecord,
    new_parent_id: Option<&str>,
) -> StoreResult<()> {
    check_parent(txn, &file.owner_id, new_parent_id)?;

    let mut cursor = new_parent_id.map(str::to_string);
    let mut visited = HashSet::new();
    while let Some(ancestor_id) = cursor {
        if ancestor_id == file.id {
            return Err(StoreError::invalid(format!(
                "cannot move {} beneath itself",
                file.id
            )));
        }
        if !visited.insert(ancestor_id.clone()) {
            break;
        }
        cursor = load_file(txn, &ancestor_id)?.and_then(|a| a.parent_id);
    }
    Ok(())
}

/// Every file the owner has, via the owner index.
pub(crate) fn owner_files(txn: &ReadTransaction, owner_id: &str) -> StoreResult<Vec<FileRecord>> {
    let ids = read_index(txn, OWNER_FILES, owner_id)?;
    let mut files = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(file) = read::<FileRecord>(txn, FILES, &id)? {
            files.push(file);
        }
    }
    Ok(files)
}
