//! Redb table definitions for persistent document storage.
//!
//! Blob tables have fixed names. Run and metric collections are named by
//! the client configuration, so their definitions are built at runtime.

use redb::TableDefinition;

// Blobs
// Key: blob id, Value: bincode-encoded FileRecord
pub const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("fs.files");
// Key: (filename, md5), Value: blob id
pub const FILE_ADDRESSES: TableDefinition<(&str, &str), &str> =
    TableDefinition::new("fs.files.address");
// Key: blob id, Value: raw contents (only when no blob directory is configured)
pub const CHUNKS: TableDefinition<&str, &[u8]> = TableDefinition::new("fs.chunks");

/// Run collection. Key: run id, Value: JSON-encoded document
#[must_use]
pub const fn runs(name: &str) -> TableDefinition<'_, u64, &'static [u8]> {
    TableDefinition::new(name)
}

/// Metric collection. Key: (run id, metric name), Value: bincode-encoded series
#[must_use]
pub const fn metrics(name: &str) -> TableDefinition<'_, (u64, &'static str), &'static [u8]> {
    TableDefinition::new(name)
}
