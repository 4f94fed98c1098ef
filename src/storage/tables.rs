use redb::TableDefinition;

/// File records: uuid -> FileRecord (msgpack)
pub const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");

/// Unique content index: sha256 hex -> uuid
pub const CONTENT_HASHES: TableDefinition<&str, &str> = TableDefinition::new("content_hashes");

/// Owner index: owner -> msgpack Vec of file UUIDs (one entry per reference)
pub const OWNER_FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("owner_files");

/// Persisted settings records: name -> msgpack
pub const SETTINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");
