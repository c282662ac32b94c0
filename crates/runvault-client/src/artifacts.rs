//! Source file snapshots as content-addressed blobs.

use crate::error::{ClientError, Result};
use runvault_common::checksum::content_md5;
use runvault_common::{ContentAddress, ExperimentRecord, SourceRef};
use runvault_meta_store::BlobStore;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves a run's source manifest to blob references
pub struct ArtifactStore {
    blobs: Arc<dyn BlobStore>,
}

impl ArtifactStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Map each manifest entry to a blob, storing files not seen before.
    ///
    /// Entries are looked up by (`base_dir/name`, md5). Only misses read the
    /// file from `source_dir`. A file whose content no longer matches its
    /// manifest digest is stored under its real digest and also made
    /// reachable under the manifest one, so later runs with the same
    /// manifest hit the lookup. The result keeps manifest order. A listed
    /// file missing from `source_dir` aborts the whole resolution.
    pub fn resolve_sources(
        &self,
        experiment: &ExperimentRecord,
        source_dir: &Path,
    ) -> Result<Vec<SourceRef>> {
        let mut sources = Vec::with_capacity(experiment.sources.len());
        for entry in &experiment.sources {
            let address = ContentAddress::new(&experiment.base_dir, &entry.name, &entry.md5);
            let blob = match self.blobs.find_blob(&address.path, &address.md5)? {
                Some(id) => {
                    debug!("Reusing blob {} for {}", id, address);
                    id
                }
                None => {
                    let local = source_dir.join(&entry.name);
                    let data = fs::read(&local).map_err(|source| ClientError::MissingSourceFile {
                        name: entry.name.clone(),
                        path: local.clone(),
                        source,
                    })?;
                    let id = self.blobs.put_blob(&address.path, &data)?;
                    let actual = content_md5(&data);
                    if actual == address.md5 {
                        id
                    } else {
                        warn!(
                            "Source {} has digest {} but the manifest lists {}",
                            address.path, actual, address.md5
                        );
                        self.blobs.add_blob_address(&address.path, &address.md5, id)?
                    }
                }
            };
            sources.push(SourceRef {
                name: entry.name.clone(),
                blob,
            });
        }
        Ok(sources)
    }
}
