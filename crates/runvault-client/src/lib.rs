//! Runvault Client - persists finished runs into the shared store
//!
//! The client takes a parsed run record and writes it as a run document,
//! metric series and deduplicated source blobs:
//!
//! - [`IdAllocator`] assigns the next free run id under concurrent writers
//! - [`OverwriteCoordinator`] replaces an existing run, at most once per client
//! - [`DocumentWriter`] upserts the run document and its follow-up fields
//! - [`MetricsMerger`] appends metric batches and registers new series
//! - [`ArtifactStore`] resolves source files to content-addressed blobs

pub mod allocator;
pub mod artifacts;
pub mod captured;
pub mod client;
pub mod error;
pub mod metrics;
pub mod overwrite;
pub mod writer;

pub use allocator::IdAllocator;
pub use artifacts::ArtifactStore;
pub use client::Client;
pub use error::{ClientError, Result};
pub use metrics::MetricsMerger;
pub use overwrite::OverwriteCoordinator;
pub use writer::DocumentWriter;
