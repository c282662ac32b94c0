//! Metric batch merging.
//!
//! Each batch is appended to its (run id, metric name) series in one
//! atomic upsert. The call that creates a series registers it under the
//! run's `info.metrics`; appends to an existing series leave the registry
//! alone.
//!
//! Appends are atomic but not idempotent: resubmitting a batch after an
//! ambiguous failure stores its points twice. Concurrent writers to the same
//! series may interleave, so array order need not follow submission order.

use crate::error::Result;
use crate::writer::DocumentWriter;
use runvault_common::{MetricRef, MetricsMap, RunId};
use runvault_meta_store::DocumentStore;
use std::sync::Arc;
use tracing::debug;

/// Appends metric batches into one metric collection
pub struct MetricsMerger {
    store: Arc<dyn DocumentStore>,
    collection: String,
    writer: DocumentWriter,
}

impl MetricsMerger {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        writer: DocumentWriter,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            writer,
        }
    }

    /// Merge every batch into the run's series.
    ///
    /// All batches are validated before the first write. Returns the
    /// registry entries of the series this call created.
    pub fn merge(&self, run_id: RunId, metrics: &MetricsMap) -> Result<Vec<MetricRef>> {
        for (name, batch) in metrics {
            batch.validate(name)?;
        }

        let mut created = Vec::new();
        for (name, batch) in metrics {
            let outcome = self
                .store
                .push_metric(&self.collection, run_id, name, batch)?;
            if outcome.created {
                created.push(MetricRef {
                    name: name.clone(),
                    id: outcome.id,
                });
            }
        }

        self.writer.register_metrics(run_id, &created)?;
        debug!(
            "Merged {} metric(s) into run {} ({} new)",
            metrics.len(),
            run_id,
            created.len()
        );
        Ok(created)
    }
}
