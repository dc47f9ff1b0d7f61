//! Filtering, allow-listed sorting and pagination for file listings.

use std::cmp::Ordering;
use std::str::FromStr;

use super::db::StoreError;
use super::models::FileRecord;

/// Columns a listing may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    Name,
    CreatedAt,
    #[default]
    UpdatedAt,
    Size,
    TrashedAt,
    LastViewedAt,
}

impl FromStr for SortField {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(SortField::Name),
            "created_at" => Ok(SortField::CreatedAt),
            "updated_at" => Ok(SortField::UpdatedAt),
            "size" => Ok(SortField::Size),
            "trashed_at" => Ok(SortField::TrashedAt),
            "last_viewed_at" => Ok(SortField::LastViewedAt),
            other => Err(StoreError::invalid(format!("unsupported sort column: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortDirection {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(StoreError::invalid(format!("unsupported sort direction: {other}"))),
        }
    }
}

/// Which part of the owner's tree a listing covers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ParentFilter {
    /// Entries with no parent.
    #[default]
    Root,
    /// Direct children of the given file.
    Parent(String),
    /// Every entry the owner has, at any depth.
    Any,
}

impl ParentFilter {
    /// An empty or absent parent id means the tree root.
    pub fn from_parent_id(parent_id: Option<&str>) -> Self {
        match parent_id {
            Some(id) if !id.is_empty() => ParentFilter::Parent(id.to_string()),
            _ => ParentFilter::Root,
        }
    }

    fn matches(&self, file: &FileRecord) -> bool {
        match self {
            ParentFilter::Root => file.parent_id.is_none(),
            ParentFilter::Parent(id) => file.parent_id.as_deref() == Some(id.as_str()),
            ParentFilter::Any => true,
        }
    }
}

/// Filter and page request for [`crate::storage::Database::list`].
///
/// `is_trashed` is not a tri-state: `false` always narrows to live entries and
/// `true` to trashed ones. `starred` only ever narrows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListQuery {
    pub owner_id: String,
    pub parent: ParentFilter,
    pub is_trashed: bool,
    pub starred: bool,
    /// 0 means no limit.
    pub limit: usize,
    pub offset: usize,
    pub order_by: SortField,
    pub order_dir: SortDirection,
}

impl ListQuery {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            ..Default::default()
        }
    }

    /// Build a query from raw transport values, validating the sort pair.
    ///
    /// Empty sort strings fall back to `updated_at DESC`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_raw(
        parent_id: Option<&str>,
        owner_id: &str,
        is_trashed: bool,
        starred: bool,
        limit: usize,
        offset: usize,
        order_by: &str,
        order_dir: &str,
    ) -> Result<Self, StoreError> {
        let (order_by, order_dir) = if order_by.trim().is_empty() {
            (SortField::UpdatedAt, SortDirection::Desc)
        } else {
            let field = order_by.parse()?;
            let dir = if order_dir.trim().is_empty() {
                SortDirection::Asc
            } else {
                order_dir.parse()?
            };
            (field, dir)
        };

        Ok(Self {
            owner_id: owner_id.to_string(),
            parent: ParentFilter::from_parent_id(parent_id),
            is_trashed,
            starred,
            limit,
            offset,
            order_by,
            order_dir,
        })
    }

    pub fn parent(mut self, parent: ParentFilter) -> Self {
        self.parent = parent;
        self
    }

    pub fn trashed(mut self, is_trashed: bool) -> Self {
        self.is_trashed = is_trashed;
        self
    }

    pub fn starred(mut self, starred: bool) -> Self {
        self.starred = starred;
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn order(mut self, order_by: SortField, order_dir: SortDirection) -> Self {
        self.order_by = order_by;
        self.order_dir = order_dir;
        self
    }

    pub fn matches(&self, file: &FileRecord) -> bool {
        file.owner_id == self.owner_id
            && self.parent.matches(file)
            && file.is_trashed == self.is_trashed
            && (!self.starred || file.starred)
    }

    /// Filter, sort and page `files`. `total` counts every match before paging.
    pub fn apply(&self, files: Vec<FileRecord>) -> FilePage {
        let mut matched: Vec<FileRecord> = files.into_iter().filter(|f| self.matches(f)).collect();
        sort_files(&mut matched, self.order_by, self.order_dir);

        let total = matched.len() as u64;
        let window = matched.into_iter().skip(self.offset);
        let files = if self.limit > 0 {
            window.take(self.limit).collect()
        } else {
            window.collect()
        };

        FilePage { files, total }
    }
}

/// One page of a listing plus the un-paged match count.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilePage {
    pub files: Vec<FileRecord>,
    pub total: u64,
}

/// Sort by the requested column, breaking ties by id so pages never overlap.
pub fn sort_files(files: &mut [FileRecord], field: SortField, dir: SortDirection) {
    files.sort_by(|a, b| {
        let ordering = compare(a, b, field);
        let ordering = match dir {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        ordering.then_with(|| a.id.cmp(&b.id))
    });
}

fn compare(a: &FileRecord, b: &FileRecord, field: SortField) -> Ordering {
    match field {
        SortField::Name => a.name.cmp(&b.name),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::Size => a.size.cmp(&b.size),
        SortField::TrashedAt => a.trashed_at.cmp(&b.trashed_at),
        SortField::LastViewedAt => a.last_viewed_at.cmp(&b.last_viewed_at),
    }
}
