use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::roles::Role;

/// A file or folder stored in redb
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    // Identity and placement
    pub id: String,
    pub owner_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub file_extension: Option<String>,
    pub mime_type: String,

    // Content pointer into the blob store
    pub storage_path: String,
    pub size: u64,
    #[serde(default)]
    pub md5_checksum: Option<String>,
    #[serde(default)]
    pub sha256_checksum: Option<String>,
    pub is_folder: bool,

    // Lifecycle
    pub is_trashed: bool,
    #[serde(default)]
    pub trashed_at: Option<DateTime<Utc>>,
    pub starred: bool,
    pub version: u64,
    #[serde(default)]
    pub revision_id: Option<String>,

    // View state
    #[serde(default)]
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub viewed_by_me: bool,

    // Presentation links, opaque to the store
    #[serde(default)]
    pub thumbnail_link: Option<String>,
    #[serde(default)]
    pub web_view_link: Option<String>,
    #[serde(default)]
    pub web_content_link: Option<String>,
    #[serde(default)]
    pub icon_link: Option<String>,

    #[serde(default)]
    pub indexable_text: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for a new file. Identity and timestamps come from the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewFile {
    pub owner_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub file_extension: Option<String>,
    pub mime_type: String,
    pub storage_path: String,
    pub size: u64,
    pub md5_checksum: Option<String>,
    pub sha256_checksum: Option<String>,
    pub is_folder: bool,
    pub is_trashed: bool,
    pub trashed_at: Option<DateTime<Utc>>,
    pub starred: bool,
    /// Defaults to 1 when absent.
    pub version: Option<u64>,
    pub revision_id: Option<String>,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub viewed_by_me: bool,
    pub thumbnail_link: Option<String>,
    pub web_view_link: Option<String>,
    pub web_content_link: Option<String>,
    pub icon_link: Option<String>,
    pub indexable_text: Option<String>,
}

impl NewFile {
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            name: name.into(),
            mime_type: "application/octet-stream".to_string(),
            ..Default::default()
        }
    }

    pub fn folder(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            is_folder: true,
            mime_type: FOLDER_MIME_TYPE.to_string(),
            ..Self::new(owner_id, name)
        }
    }

    pub fn in_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub(crate) fn into_record(self, id: String, now: DateTime<Utc>) -> FileRecord {
        FileRecord {
            id,
            owner_id: self.owner_id,
            parent_id: self.parent_id,
            name: self.name,
            file_extension: self.file_extension,
            mime_type: self.mime_type,
            storage_path: self.storage_path,
            size: self.size,
            md5_checksum: self.md5_checksum,
            sha256_checksum: self.sha256_checksum,
            is_folder: self.is_folder,
            is_trashed: self.is_trashed,
            trashed_at: self.trashed_at,
            starred: self.starred,
            version: self.version.unwrap_or(1),
            revision_id: self.revision_id,
            last_viewed_at: self.last_viewed_at,
            viewed_by_me: self.viewed_by_me,
            thumbnail_link: self.thumbnail_link,
            web_view_link: self.web_view_link,
            web_content_link: self.web_content_link,
            icon_link: self.icon_link,
            indexable_text: self.indexable_text,
            created_at: now,
            updated_at: now,
        }
    }
}

pub const FOLDER_MIME_TYPE: &str = "application/vnd.homecloud.folder";

/// An immutable snapshot of one content version of a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRevision {
    pub id: String,
    pub file_id: String,
    /// Unique and strictly increasing within `file_id`.
    pub revision_id: i64,
    pub storage_path: String,
    pub size: u64,
    #[serde(default)]
    pub md5_checksum: Option<String>,
    pub mime_type: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewRevision {
    pub file_id: String,
    pub storage_path: String,
    pub size: u64,
    pub md5_checksum: Option<String>,
    pub mime_type: String,
    pub user_id: String,
}

/// Kind of principal a permission is granted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GranteeType {
    User,
    Group,
    Domain,
    Anyone,
}

/// A grant of access on a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePermission {
    pub id: String,
    pub file_id: String,
    /// `None` for public grants.
    #[serde(default)]
    pub grantee_id: Option<String>,
    pub grantee_type: GranteeType,
    pub role: Role,
    pub allow_share: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPermission {
    pub file_id: String,
    pub grantee_id: Option<String>,
    pub grantee_type: GranteeType,
    pub role: Role,
    pub allow_share: bool,
}

impl NewPermission {
    pub fn user(file_id: impl Into<String>, user_id: impl Into<String>, role: Role) -> Self {
        Self {
            file_id: file_id.into(),
            grantee_id: Some(user_id.into()),
            grantee_type: GranteeType::User,
            role,
            allow_share: false,
        }
    }

    pub fn anyone(file_id: impl Into<String>, role: Role) -> Self {
        Self {
            file_id: file_id.into(),
            grantee_id: None,
            grantee_type: GranteeType::Anyone,
            role,
            allow_share: false,
        }
    }
}

/// Replacement values for the mutable fields of a permission
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionUpdate {
    pub grantee_id: Option<String>,
    pub grantee_type: GranteeType,
    pub role: Role,
    pub allow_share: bool,
}

/// Storage counters for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageAccount {
    pub user_id: String,
    /// Bytes allowed; 0 means unlimited.
    pub storage_quota: u64,
    /// Bytes recorded as used. May exceed the quota.
    pub used_space: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StorageAccount {
    pub fn is_unlimited(&self) -> bool {
        self.storage_quota == 0
    }

    pub fn summary(&self) -> StorageSummary {
        let remaining =
            (!self.is_unlimited()).then(|| self.storage_quota.saturating_sub(self.used_space));
        StorageSummary {
            storage_quota: self.storage_quota,
            used_space: self.used_space,
            remaining,
            over_quota: !self.is_unlimited() && self.used_space > self.storage_quota,
        }
    }
}

/// Read-only usage report. The store never acts on `over_quota`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageSummary {
    pub storage_quota: u64,
    pub used_space: u64,
    /// `None` when the quota is unlimited.
    pub remaining: Option<u64>,
    pub over_quota: bool,
}
