//! Runvault Common - Shared types and utilities
//!
//! This crate provides the run-record and stored-document types, client
//! configuration, content hashing and the on-disk run directory loader
//! used across all Runvault components.

pub mod checksum;
pub mod config;
pub mod error;
pub mod record;
pub mod types;

pub use checksum::ContentAddress;
pub use config::{ClientConfig, CollectionName, CollectionNames};
pub use error::{Error, Result};
pub use record::RunDirectory;
pub use types::*;
