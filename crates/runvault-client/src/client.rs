//! Run ingestion client

use crate::allocator::IdAllocator;
use crate::artifacts::ArtifactStore;
use crate::captured::rewrite_run_marker;
use crate::error::{ClientError, Result};
use crate::metrics::MetricsMerger;
use crate::overwrite::OverwriteCoordinator;
use crate::writer::DocumentWriter;
use runvault_common::{
    ClientConfig, CollectionNames, Document, MetricSeries, MetricsMap, RunDirectory, RunId,
    RunRecord, StoredRun,
};
use runvault_meta_store::{BlobStore, DocumentStore, RedbStore, StoreError};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Persists finished runs into one pair of run and metric collections.
///
/// A client built with `overwrite` set replaces that run on its first
/// [`finished_event`](Client::finished_event) and refuses every later one.
pub struct Client {
    collections: CollectionNames,
    docs: Arc<dyn DocumentStore>,
    writer: DocumentWriter,
    allocator: IdAllocator,
    merger: MetricsMerger,
    artifacts: ArtifactStore,
    overwrite: Option<OverwriteCoordinator>,
    priority: i32,
}

impl Client {
    /// Open the store at `config.url` and build a client on it.
    ///
    /// Collection names are checked before the store is touched.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let collections = config.collection_names()?;
        let path = config.database_path()?;
        let store = Arc::new(RedbStore::open(&path, config.blob_dir.clone())?);
        info!("Opened run store at {:?}", path);
        Self::build(config, collections, store.clone(), store)
    }

    /// Build a client on an already-open store handle.
    ///
    /// `config.url` must be unset; a handle and a url are mutually exclusive.
    pub fn with_store<S>(config: &ClientConfig, store: Arc<S>) -> Result<Self>
    where
        S: DocumentStore + BlobStore + 'static,
    {
        Self::with_stores(config, store.clone(), store)
    }

    /// Build a client on separate document and blob store handles
    pub fn with_stores(
        config: &ClientConfig,
        docs: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        if config.url.is_some() {
            return Err(ClientError::invalid_config(
                "a store handle and a url cannot both be given",
            ));
        }
        let collections = config.collection_names()?;
        Self::build(config, collections, docs, blobs)
    }

    fn build(
        config: &ClientConfig,
        collections: CollectionNames,
        docs: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        let runs = collections.runs.as_str().to_string();
        let overwrite = config
            .overwrite
            .map(|id| OverwriteCoordinator::locate(docs.as_ref(), &runs, id))
            .transpose()?;

        let writer = DocumentWriter::new(docs.clone(), runs.clone());
        let allocator = IdAllocator::new(docs.clone(), runs);
        let merger = MetricsMerger::new(
            docs.clone(),
            collections.metrics.as_str(),
            writer.clone(),
        );

        Ok(Self {
            collections,
            docs,
            writer,
            allocator,
            merger,
            artifacts: ArtifactStore::new(blobs),
            overwrite,
            priority: config.priority,
        })
    }

    /// Persist one finished run and return its stored id.
    ///
    /// Order of effects: source blobs, run document, captured output,
    /// metrics. `explicit_id` pins the id of a fresh run and is ignored when
    /// overwriting. Failures after the run document is written leave it in
    /// place.
    pub fn finished_event(
        &mut self,
        run: &RunRecord,
        captured_out: &str,
        config: &Document,
        metrics: Option<&MetricsMap>,
        source_dir: Option<&Path>,
        explicit_id: Option<RunId>,
    ) -> Result<RunId> {
        if let Some(coordinator) = &self.overwrite {
            coordinator.ensure_available()?;
        }
        if let Some(metrics) = metrics {
            for (name, batch) in metrics {
                batch.validate(name)?;
            }
        }

        let sources = match source_dir {
            Some(dir) => self.artifacts.resolve_sources(&run.experiment, dir)?,
            None => Vec::new(),
        };
        let source_count = sources.len();
        let mut stored = StoredRun::from_record(
            explicit_id.unwrap_or_default(),
            run,
            config.clone(),
            sources,
        );

        let id = match (self.overwrite.as_mut(), explicit_id) {
            (Some(coordinator), _) => coordinator.finish(stored, &self.writer)?,
            (None, Some(id)) => self.allocator.insert_with_id(&mut stored, id)?,
            (None, None) => self.allocator.insert_next(&mut stored)?,
        };

        let mut fields = Document::new();
        fields.insert(
            "captured_out".to_string(),
            Value::String(rewrite_run_marker(captured_out, id).into_owned()),
        );
        self.writer.save_fields(id, &fields)?;

        let metric_count = match metrics {
            Some(metrics) if !metrics.is_empty() => {
                self.merger.merge(id, metrics)?;
                metrics.len()
            }
            _ => 0,
        };

        info!(
            "Stored run {} in '{}' ({} source(s), {} metric(s))",
            id,
            self.collections.runs,
            source_count,
            metric_count
        );
        Ok(id)
    }

    /// Persist a run loaded from a run directory
    pub fn ingest(&mut self, dir: &RunDirectory, explicit_id: Option<RunId>) -> Result<RunId> {
        self.finished_event(
            &dir.run,
            &dir.captured_out,
            &dir.config,
            Some(&dir.metrics),
            dir.source_dir.as_deref(),
            explicit_id,
        )
    }

    /// Raw run document
    pub fn run(&self, id: RunId) -> Result<Option<Document>> {
        Ok(self.docs.find_run(self.collections.runs.as_str(), id)?)
    }

    /// Run document decoded as a [`StoredRun`]
    pub fn stored_run(&self, id: RunId) -> Result<Option<StoredRun>> {
        self.run(id)?
            .map(|doc| serde_json::from_value(Value::Object(doc)))
            .transpose()
            .map_err(|e| StoreError::Json(e).into())
    }

    /// Metric series of a run
    pub fn metric(&self, id: RunId, name: &str) -> Result<Option<MetricSeries>> {
        Ok(self
            .docs
            .find_metric(self.collections.metrics.as_str(), id, name)?)
    }

    #[must_use]
    pub const fn collections(&self) -> &CollectionNames {
        &self.collections
    }

    /// Scheduling priority recorded in the config; not used for ingestion
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Run id this client overwrites, if any
    #[must_use]
    pub fn overwrite_target(&self) -> Option<RunId> {
        self.overwrite.as_ref().map(OverwriteCoordinator::target)
    }
}
