mod copy;
pub mod db;
mod files;
pub mod listing;
pub mod models;
mod permissions;
mod quota;
mod revisions;
pub mod roles;
mod tables;

pub use db::{Database, ErrorKind, PurgeStats, StoreError, StoreResult};
pub use files::{LIST_CEILING, TREE_CEILING};
pub use listing::{FilePage, ListQuery, ParentFilter, SortDirection, SortField};
pub use quota::PurgedFile;
pub use roles::{Role, RoleRequirement};
