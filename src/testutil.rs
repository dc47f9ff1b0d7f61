//! Shared helpers for unit tests.

use crate::storage::models::NewFile;
use crate::storage::Database;

/// Open a database in a fresh temporary directory.
pub fn test_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db = Database::open(dir.path().join("data")).expect("Failed to open test database");
    (dir, db)
}

/// A small text file with content pointer and checksums filled in.
pub fn sample_file(owner_id: &str, name: &str) -> NewFile {
    NewFile {
        file_extension: name.rsplit_once('.').map(|(_, ext)| ext.to_string()),
        mime_type: "text/plain".to_string(),
        storage_path: format!("blobs/{owner_id}/{name}"),
        size: 100,
        md5_checksum: Some("9e107d9d372bb6826bd81d3542a419d6".to_string()),
        sha256_checksum: Some(
            "d7a8fbb307d7809469ca9abcb0082e4f8d5651e46d3cdb762d02d0bf37c9e592".to_string(),
        ),
        ..NewFile::new(owner_id, name)
    }
}
