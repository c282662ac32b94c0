//! Configuration types for Runvault
//!
//! The client is configured through an explicit structure; unknown fields
//! are rejected rather than forwarded to the store.

use crate::error::{Error, Result};
use crate::types::RunId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Advisory priority recorded for the client
pub const DEFAULT_PRIORITY: i32 = 30;

/// Database used when none is configured
pub const DEFAULT_DB_NAME: &str = "runvault";

/// Names the store keeps for its own bookkeeping
pub const RESERVED_COLLECTION_NAMES: [&str; 6] = [
    "fs.files",
    "fs.chunks",
    "_properties",
    "system.indexes",
    "search_space",
    "search_spaces",
];

const STORE_SCHEME: &str = "redb://";

/// Store connection configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Store location: `redb://<dir>` or a plain directory
    #[serde(default)]
    pub url: Option<String>,
    /// Target database; stored as `<dir>/<db_name>.redb`
    #[serde(default = "default_db_name")]
    pub db_name: String,
    /// When non-empty, collections become `<prefix>_runs` / `<prefix>_metrics`
    #[serde(default)]
    pub collection_prefix: String,
    /// Existing run to replace instead of allocating a new id
    #[serde(default)]
    pub overwrite: Option<RunId>,
    /// Advisory only
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Directory for blob contents; blobs live inside the database when unset
    #[serde(default)]
    pub blob_dir: Option<PathBuf>,
}

fn default_db_name() -> String {
    DEFAULT_DB_NAME.to_string()
}

const fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: None,
            db_name: default_db_name(),
            collection_prefix: String::new(),
            overwrite: None,
            priority: DEFAULT_PRIORITY,
            blob_dir: None,
        }
    }
}

impl ClientConfig {
    /// Create a configuration pointing at the given store location
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Compute and validate the run and metric collection names
    pub fn collection_names(&self) -> Result<CollectionNames> {
        let prefix = if self.collection_prefix.is_empty() {
            String::new()
        } else {
            format!("{}_", self.collection_prefix)
        };
        CollectionNames::new(format!("{prefix}runs"), format!("{prefix}metrics"))
    }

    /// Resolve the database file this configuration points at
    pub fn database_path(&self) -> Result<PathBuf> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| Error::invalid_config("no store url configured"))?;
        let dir = url.strip_prefix(STORE_SCHEME).unwrap_or(url);
        if dir.contains("://") {
            return Err(Error::invalid_config(format!(
                "unsupported store url '{url}', expected {STORE_SCHEME}<dir> or a directory"
            )));
        }
        if dir.is_empty() {
            return Err(Error::invalid_config("store url has an empty path"));
        }
        if self.db_name.is_empty() || self.db_name.contains(['/', '\\']) {
            return Err(Error::invalid_config(format!(
                "invalid database name '{}'",
                self.db_name
            )));
        }
        Ok(Path::new(dir).join(format!("{}.redb", self.db_name)))
    }
}

/// A collection name that is not on the reserved list
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CollectionName(String);

impl CollectionName {
    /// Validate a collection name
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::invalid_config("collection name is empty"));
        }
        if RESERVED_COLLECTION_NAMES.contains(&name.as_str()) {
            return Err(Error::ReservedCollectionName(name));
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionName({:?})", self.0)
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The pair of collections a client writes to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionNames {
    pub runs: CollectionName,
    pub metrics: CollectionName,
}

impl CollectionNames {
    /// Validate both names; the run collection is checked first
    pub fn new(runs: impl Into<String>, metrics: impl Into<String>) -> Result<Self> {
        Ok(Self {
            runs: CollectionName::new(runs)?,
            metrics: CollectionName::new(metrics)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.db_name, DEFAULT_DB_NAME);
        assert_eq!(config.priority, 30);
        assert!(config.collection_prefix.is_empty());
        assert!(config.overwrite.is_none());
    }

    #[test]
    fn test_collection_names_without_prefix() {
        let names = ClientConfig::default().collection_names().unwrap();
        assert_eq!(names.runs.as_str(), "runs");
        assert_eq!(names.metrics.as_str(), "metrics");
    }

    #[test]
    fn test_collection_names_with_prefix() {
        let config = ClientConfig {
            collection_prefix: "mnist".into(),
            ..Default::default()
        };
        let names = config.collection_names().unwrap();
        assert_eq!(names.runs.as_str(), "mnist_runs");
        assert_eq!(names.metrics.as_str(), "mnist_metrics");
    }

    #[test]
    fn test_reserved_collection_names_rejected() {
        for reserved in RESERVED_COLLECTION_NAMES {
            assert!(matches!(
                CollectionNames::new("runs", reserved),
                Err(Error::ReservedCollectionName(name)) if name == reserved
            ));
            assert!(matches!(
                CollectionNames::new(reserved, "metrics"),
                Err(Error::ReservedCollectionName(_))
            ));
        }
        assert!(CollectionName::new("fs.files_runs").is_ok());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let parsed: std::result::Result<ClientConfig, _> =
            serde_json::from_str(r#"{"url": "/tmp/db", "socketTimeoutMS": 100}"#);
        assert!(parsed.is_err());

        let parsed: ClientConfig =
            serde_json::from_str(r#"{"url": "/tmp/db", "overwrite": 4}"#).unwrap();
        assert_eq!(parsed.overwrite, Some(4));
        assert_eq!(parsed.priority, DEFAULT_PRIORITY);
    }

    #[test]
    fn test_database_path() {
        let config = ClientConfig::with_url("redb:///var/lib/runvault");
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/var/lib/runvault/runvault.redb")
        );

        let config = ClientConfig {
            db_name: "experiments".into(),
            ..ClientConfig::with_url("./data")
        };
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("./data/experiments.redb")
        );
    }

    #[test]
    fn test_database_path_errors() {
        assert!(ClientConfig::default().database_path().is_err());
        assert!(
            ClientConfig::with_url("mongodb://localhost:27017")
                .database_path()
                .is_err()
        );
        assert!(ClientConfig::with_url("redb://").database_path().is_err());

        let config = ClientConfig {
            db_name: "../escape".into(),
            ..ClientConfig::with_url("/data")
        };
        assert!(config.database_path().is_err());
    }
}
