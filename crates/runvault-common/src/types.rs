//! Core type definitions for Runvault
//!
//! This module defines the identifiers, the run record handed to the
//! ingestion client, and the documents the client persists: stored runs,
//! metric series and source references.

use chrono::NaiveDateTime;
use derive_more::{From, Into};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Numeric identifier of a stored run
pub type RunId = u64;

/// Free-form JSON object (config, host info, meta)
pub type Document = Map<String, Value>;

/// Metric batches keyed by metric name
pub type MetricsMap = BTreeMap<String, MetricBatch>;

/// Format tag written into every stored run
pub const STORED_RUN_FORMAT: &str = "runvault-0.1";

/// Timestamp layout used in run records
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Identifier of a stored blob
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
pub struct BlobId(Uuid);

impl BlobId {
    /// Generate a new random blob ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a blob ID from its string form
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Get the underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for BlobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.0)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier generated for a metric series when it is first created
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
pub struct MetricId(Uuid);

impl MetricId {
    /// Generate a new random metric ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MetricId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MetricId({})", self.0)
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Final status of a recorded run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Interrupted,
    Timeout,
}

/// Serde adapter for run-record timestamps
mod record_time {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&time.format(super::TIME_FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, super::TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

// ---- Run record (ingestion input) ----

/// One entry of a source manifest: `[name, md5]` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct SourceManifestEntry {
    pub name: String,
    pub md5: String,
}

impl SourceManifestEntry {
    pub fn new(name: impl Into<String>, md5: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            md5: md5.into(),
        }
    }
}

impl From<(String, String)> for SourceManifestEntry {
    fn from((name, md5): (String, String)) -> Self {
        Self { name, md5 }
    }
}

impl From<SourceManifestEntry> for (String, String) {
    fn from(entry: SourceManifestEntry) -> Self {
        (entry.name, entry.md5)
    }
}

/// Experiment descriptor as recorded by the live run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub name: String,
    pub base_dir: String,
    /// Source files in the order they were captured
    #[serde(default)]
    pub sources: Vec<SourceManifestEntry>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub repositories: Vec<Value>,
    #[serde(default)]
    pub mainfile: Option<String>,
}

/// Metadata of a completed run, as read from `run.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub experiment: ExperimentRecord,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub host: Document,
    #[serde(with = "record_time")]
    pub start_time: NaiveDateTime,
    #[serde(with = "record_time")]
    pub stop_time: NaiveDateTime,
    #[serde(with = "record_time")]
    pub heartbeat: NaiveDateTime,
    pub status: RunStatus,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub meta: Document,
}

// ---- Stored run (persisted document) ----

/// Source file name paired with the blob holding its content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, BlobId)", into = "(String, BlobId)")]
pub struct SourceRef {
    pub name: String,
    pub blob: BlobId,
}

impl From<(String, BlobId)> for SourceRef {
    fn from((name, blob): (String, BlobId)) -> Self {
        Self { name, blob }
    }
}

impl From<SourceRef> for (String, BlobId) {
    fn from(source: SourceRef) -> Self {
        (source.name, source.blob)
    }
}

/// Experiment descriptor with sources rewritten to blob references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredExperiment {
    pub name: String,
    pub base_dir: String,
    pub sources: Vec<SourceRef>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub repositories: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mainfile: Option<String>,
}

impl StoredExperiment {
    /// Build the stored descriptor from a record and its resolved sources
    #[must_use]
    pub fn from_record(record: &ExperimentRecord, sources: Vec<SourceRef>) -> Self {
        Self {
            name: record.name.clone(),
            base_dir: record.base_dir.clone(),
            sources,
            dependencies: record.dependencies.clone(),
            repositories: record.repositories.clone(),
            mainfile: record.mainfile.clone(),
        }
    }
}

/// Registry entry pointing at a metric series of the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRef {
    pub name: String,
    pub id: MetricId,
}

/// The `info` section of a stored run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<MetricRef>,
    /// Keys written by other tools are carried through untouched
    #[serde(flatten)]
    pub extra: Document,
}

/// Persisted run document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRun {
    #[serde(rename = "_id")]
    pub id: RunId,
    pub experiment: StoredExperiment,
    pub format: String,
    pub command: String,
    pub host: Document,
    pub start_time: NaiveDateTime,
    pub stop_time: NaiveDateTime,
    pub heartbeat: NaiveDateTime,
    pub config: Document,
    pub meta: Document,
    pub status: RunStatus,
    pub result: Value,
    pub resources: Vec<Value>,
    pub artifacts: Vec<Value>,
    pub captured_out: String,
    #[serde(default)]
    pub info: RunInfo,
}

impl StoredRun {
    /// Assemble the base document for a run.
    ///
    /// Captured output starts empty and the info registry starts blank;
    /// both are filled by follow-up saves once the id is final.
    #[must_use]
    pub fn from_record(
        id: RunId,
        record: &RunRecord,
        config: Document,
        sources: Vec<SourceRef>,
    ) -> Self {
        Self {
            id,
            experiment: StoredExperiment::from_record(&record.experiment, sources),
            format: STORED_RUN_FORMAT.to_string(),
            command: record.command.clone(),
            host: record.host.clone(),
            start_time: record.start_time,
            stop_time: record.stop_time,
            heartbeat: record.heartbeat,
            config,
            meta: record.meta.clone(),
            status: record.status,
            result: record.result.clone(),
            resources: Vec::new(),
            artifacts: Vec::new(),
            captured_out: String::new(),
            info: RunInfo::default(),
        }
    }
}

// ---- Metrics ----

/// A batch of data points for one metric, as recorded by the live run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricBatch {
    pub steps: Vec<i64>,
    pub values: Vec<f64>,
    pub timestamps: Vec<NaiveDateTime>,
}

impl MetricBatch {
    /// Number of data points in the batch
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check that the three sequences line up
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.steps.len() == self.values.len() && self.steps.len() == self.timestamps.len() {
            Ok(())
        } else {
            Err(Error::MetricLengthMismatch {
                name: name.to_string(),
                steps: self.steps.len(),
                values: self.values.len(),
                timestamps: self.timestamps.len(),
            })
        }
    }
}

/// Stored time series for one (run, metric name) pair.
///
/// The three sequences only grow by appending and always have equal length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub id: MetricId,
    pub run_id: RunId,
    pub name: String,
    pub steps: Vec<i64>,
    pub values: Vec<f64>,
    pub timestamps: Vec<NaiveDateTime>,
}

impl MetricSeries {
    /// Create a series seeded with the given batch
    #[must_use]
    pub fn from_batch(id: MetricId, run_id: RunId, name: &str, batch: &MetricBatch) -> Self {
        Self {
            id,
            run_id,
            name: name.to_string(),
            steps: batch.steps.clone(),
            values: batch.values.clone(),
            timestamps: batch.timestamps.clone(),
        }
    }

    /// Append a batch to the end of the series
    pub fn append(&mut self, batch: &MetricBatch) {
        self.steps.extend_from_slice(&batch.steps);
        self.values.extend_from_slice(&batch.values);
        self.timestamps.extend_from_slice(&batch.timestamps);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
