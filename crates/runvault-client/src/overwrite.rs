//! Replacing an existing run in place.

use crate::error::{ClientError, Result};
use crate::writer::DocumentWriter;
use runvault_common::{RunId, RunInfo, StoredRun};
use runvault_meta_store::DocumentStore;
use tracing::info;

/// Governs the single-use overwrite of one existing run.
///
/// The target must exist when the coordinator is built. [`finish`] goes
/// through once; every later call fails with
/// [`ClientError::DoubleOverwrite`] without touching the store.
///
/// [`finish`]: OverwriteCoordinator::finish
#[derive(Debug)]
pub struct OverwriteCoordinator {
    target: RunId,
    spent: bool,
}

impl OverwriteCoordinator {
    /// Locate the run to overwrite
    pub fn locate(store: &dyn DocumentStore, collection: &str, target: RunId) -> Result<Self> {
        if store.find_run(collection, target)?.is_none() {
            return Err(ClientError::NotFound(target));
        }
        Ok(Self {
            target,
            spent: false,
        })
    }

    #[must_use]
    pub const fn target(&self) -> RunId {
        self.target
    }

    #[must_use]
    pub const fn is_spent(&self) -> bool {
        self.spent
    }

    /// Fail early if the overwrite was already used
    pub const fn ensure_available(&self) -> Result<()> {
        if self.spent {
            Err(ClientError::DoubleOverwrite(self.target))
        } else {
            Ok(())
        }
    }

    /// Replace the mutable sections of the target run with `run`.
    ///
    /// The id is forced to the target's and `info` starts empty, like the
    /// captured output and the resource and artifact lists. Metric series
    /// of the old run stay in the metric collection; only series created
    /// from now on are registered again.
    pub fn finish(&mut self, mut run: StoredRun, writer: &DocumentWriter) -> Result<RunId> {
        self.ensure_available()?;
        self.spent = true;

        run.id = self.target;
        run.info = RunInfo::default();
        writer.upsert(&run)?;
        info!("Overwrote run {} in '{}'", self.target, writer.collection());
        Ok(self.target)
    }
}
