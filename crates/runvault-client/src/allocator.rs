//! Run id allocation.
//!
//! New runs get `max(id) + 1`, or 1 for an empty collection. Reading the
//! maximum and inserting are separate store round trips, so two allocators
//! can pick the same candidate; the loser's insert fails on the unique key
//! and it recomputes. The loop is unbounded; it ends once contention
//! drains.

use crate::error::{ClientError, Result};
use crate::writer::to_document;
use runvault_common::{RunId, StoredRun};
use runvault_meta_store::{DocumentStore, StoreError};
use std::sync::Arc;
use tracing::debug;

/// Assigns ids to new run documents
pub struct IdAllocator {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl IdAllocator {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Insert `run` under the next free id and record that id in `run.id`
    pub fn insert_next(&self, run: &mut StoredRun) -> Result<RunId> {
        let doc = to_document(run)?;
        let mut lost_races = 0u32;
        loop {
            let candidate = match self.store.max_run_id(&self.collection)? {
                Some(max) => max.checked_add(1).ok_or_else(|| {
                    ClientError::IdSpaceExhausted(max, self.collection.clone())
                })?,
                None => 1,
            };
            match self.store.insert_run(&self.collection, candidate, &doc) {
                Ok(()) => {
                    run.id = candidate;
                    debug!(
                        "Allocated run id {} in '{}' after {} lost race(s)",
                        candidate, self.collection, lost_races
                    );
                    return Ok(candidate);
                }
                Err(StoreError::DuplicateKey { .. }) => {
                    lost_races += 1;
                    debug!(
                        "Run id {} taken by a concurrent writer, recomputing",
                        candidate
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Insert `run` under a caller-chosen id; no retry on collision
    pub fn insert_with_id(&self, run: &mut StoredRun, id: RunId) -> Result<RunId> {
        run.id = id;
        let doc = to_document(run)?;
        match self.store.insert_run(&self.collection, id, &doc) {
            Ok(()) => Ok(id),
            Err(StoreError::DuplicateKey { .. }) => Err(ClientError::DuplicateRunId(id)),
            Err(e) => Err(e.into()),
        }
    }
}
