//! Runvault Metadata Store - documents and blobs on redb
//!
//! This crate defines the store seams the ingestion client talks to
//! ([`DocumentStore`] for run and metric documents, [`BlobStore`] for
//! content-addressed source files) and their redb-backed implementation.
//! Every operation runs in a single redb transaction, which is what gives
//! the client single-document atomicity. Stores are opened per operation,
//! so several processes can ingest into the same file.

pub mod blob;
pub mod document;
pub mod store;
pub mod tables;
pub mod types;

use runvault_common::{BlobId, Document, MetricBatch, MetricSeries, RunId};
use serde_json::Value;

// Re-exports
pub use store::{DEFAULT_BUSY_TIMEOUT, RedbStore, StoreError, StoreResult};
pub use types::{FileRecord, PushOutcome};

/// Run and metric documents, addressed by collection name
pub trait DocumentStore: Send + Sync {
    /// Fetch a run document by id
    fn find_run(&self, collection: &str, id: RunId) -> StoreResult<Option<Document>>;

    /// Highest run id present in the collection
    fn max_run_id(&self, collection: &str) -> StoreResult<Option<RunId>>;

    /// Insert a new run document.
    ///
    /// Fails with [`StoreError::DuplicateKey`] if `id` is already present.
    fn insert_run(&self, collection: &str, id: RunId, doc: &Document) -> StoreResult<()>;

    /// Replace the named top-level fields of a run, creating it if absent
    fn set_run_fields(&self, collection: &str, id: RunId, fields: &Document) -> StoreResult<()>;

    /// Append values to a nested array field (e.g. `["info", "metrics"]`).
    ///
    /// Missing intermediate objects and the array itself are created.
    fn push_run_array(
        &self,
        collection: &str,
        id: RunId,
        path: &[&str],
        values: &[Value],
    ) -> StoreResult<()>;

    /// Append a batch to the (run, name) series, creating it if absent
    fn push_metric(
        &self,
        collection: &str,
        run_id: RunId,
        name: &str,
        batch: &MetricBatch,
    ) -> StoreResult<PushOutcome>;

    /// Fetch a metric series
    fn find_metric(
        &self,
        collection: &str,
        run_id: RunId,
        name: &str,
    ) -> StoreResult<Option<MetricSeries>>;
}

/// Content-addressed blob storage
pub trait BlobStore: Send + Sync {
    /// Look up a blob by stored filename and MD5 digest
    fn find_blob(&self, filename: &str, md5: &str) -> StoreResult<Option<BlobId>>;

    /// Store `data` under `filename`, returning the store-assigned id
    fn put_blob(&self, filename: &str, data: &[u8]) -> StoreResult<BlobId>;

    /// Make `id` reachable under another (filename, md5) address.
    ///
    /// Returns the blob the address points at afterwards; an address that
    /// is already taken is left alone.
    fn add_blob_address(&self, filename: &str, md5: &str, id: BlobId) -> StoreResult<BlobId>;

    /// Read a blob's contents
    fn get_blob(&self, id: BlobId) -> StoreResult<Option<Vec<u8>>>;

    /// Number of stored blobs
    fn count_blobs(&self) -> StoreResult<u64>;
}
