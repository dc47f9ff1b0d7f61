use redb::TableDefinition;

/// Every table keys records by a string id and stores msgpack bytes.
pub type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// File records: uuid -> FileRecord (msgpack)
pub const FILES: RecordTable = TableDefinition::new("files");

/// Owner index: owner_id -> msgpack Vec of file UUIDs
pub const OWNER_FILES: RecordTable = TableDefinition::new("owner_files");

/// Revision records: uuid -> FileRevision (msgpack)
pub const REVISIONS: RecordTable = TableDefinition::new("revisions");

/// Revision index: file_id -> msgpack Vec of revision UUIDs
pub const FILE_REVISIONS: RecordTable = TableDefinition::new("file_revisions");

/// Permission records: uuid -> FilePermission (msgpack)
pub const PERMISSIONS: RecordTable = TableDefinition::new("permissions");

/// Permission index: file_id -> msgpack Vec of permission UUIDs
pub const FILE_PERMISSIONS: RecordTable = TableDefinition::new("file_permissions");

/// Storage counters: user_id -> StorageAccount (msgpack)
pub const ACCOUNTS: RecordTable = TableDefinition::new("accounts");

/// All tables, in the order they are created and purged.
pub const ALL_TABLES: [RecordTable; 7] = [
    FILES,
    OWNER_FILES,
    REVISIONS,
    FILE_REVISIONS,
    PERMISSIONS,
    FILE_PERMISSIONS,
    ACCOUNTS,
];
