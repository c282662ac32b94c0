//! Stored types for blob bookkeeping and store operation results.
//!
//! File records are serialized to redb via bincode.

use chrono::{DateTime, Utc};
use runvault_common::{BlobId, MetricId};
use serde::{Deserialize, Serialize};

/// Index entry for a stored blob
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: BlobId,
    /// Virtual path the blob was stored under
    pub filename: String,
    /// MD5 of the stored bytes, lowercase hex
    pub md5: String,
    pub length: u64,
    pub upload_time: DateTime<Utc>,
}

/// Result of an upsert-append on a metric series
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PushOutcome {
    /// Identity of the series that received the batch
    pub id: MetricId,
    /// True when this call created the series
    pub created: bool,
}
