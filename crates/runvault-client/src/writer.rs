//! Run document writes.
//!
//! The first write of a run surfaces every failure. Follow-up saves
//! (captured output, metric registry) are best-effort: a transient store
//! failure is logged and dropped, and the next save is expected to bring
//! the document up to date. Unencodable documents always surface.

use crate::error::{ClientError, Result};
use runvault_common::{Document, MetricRef, RunId, StoredRun};
use runvault_meta_store::{DocumentStore, StoreError, StoreResult};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Field path of the metric registry inside a run document
const METRIC_REGISTRY: [&str; 2] = ["info", "metrics"];

/// Serialize a stored run into a store document
pub fn to_document(run: &StoredRun) -> Result<Document> {
    match serde_json::to_value(run) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ClientError::UnserializableEntry(format!(
            "run serialized to {other} instead of an object"
        ))),
        Err(e) => Err(ClientError::UnserializableEntry(e.to_string())),
    }
}

/// Writes run documents into one run collection
#[derive(Clone)]
pub struct DocumentWriter {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl DocumentWriter {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Upsert a fully assembled run keyed by its id.
    ///
    /// Fields of an existing document that `run` does not name are kept.
    pub fn upsert(&self, run: &StoredRun) -> Result<()> {
        let doc = to_document(run)?;
        self.store.set_run_fields(&self.collection, run.id, &doc)?;
        debug!("Upserted run {} in '{}'", run.id, self.collection);
        Ok(())
    }

    /// Replace only the named fields of a run (best-effort)
    pub fn save_fields(&self, id: RunId, fields: &Document) -> Result<()> {
        let result = self.store.set_run_fields(&self.collection, id, fields);
        self.best_effort(id, result)
    }

    /// Append entries to the run's `info.metrics` registry (best-effort)
    pub fn register_metrics(&self, id: RunId, refs: &[MetricRef]) -> Result<()> {
        if refs.is_empty() {
            return Ok(());
        }
        let values = refs
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ClientError::UnserializableEntry(e.to_string()))?;
        let result = self
            .store
            .push_run_array(&self.collection, id, &METRIC_REGISTRY, &values);
        self.best_effort(id, result)
    }

    fn best_effort(&self, id: RunId, result: StoreResult<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(StoreError::Transient(msg)) => {
                // Wait for the next save
                warn!(
                    "Dropped save of run {} in '{}' after transient store failure: {}",
                    id, self.collection, msg
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
