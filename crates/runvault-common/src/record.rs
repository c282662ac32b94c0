//! On-disk run directory loader
//!
//! A finished run is recorded as a directory:
//!
//! ```text
//! <run dir>/
//!   run.json       run metadata (experiment, host, timestamps, status)
//!   config.json    configuration
//!   metrics.json   metric batches keyed by name (optional)
//!   cout.txt       captured console output (optional)
//!   source/        snapshot of the files listed in the source manifest (optional)
//! ```

use crate::error::{Error, Result};
use crate::types::{Document, MetricsMap, RunRecord};
use serde::de::DeserializeOwned;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const RUN_FILE: &str = "run.json";
pub const CONFIG_FILE: &str = "config.json";
pub const METRICS_FILE: &str = "metrics.json";
pub const COUT_FILE: &str = "cout.txt";
pub const SOURCE_DIR: &str = "source";

/// A parsed run directory, ready to hand to the ingestion client
#[derive(Debug, Clone)]
pub struct RunDirectory {
    pub path: PathBuf,
    pub run: RunRecord,
    pub config: Document,
    pub metrics: MetricsMap,
    pub captured_out: String,
    pub source_dir: Option<PathBuf>,
}

impl RunDirectory {
    /// Load and validate a run directory
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(Error::RunDirectoryNotFound(path.to_path_buf()));
        }

        let run: RunRecord = read_json(&path.join(RUN_FILE))?;
        let config: Document = read_json(&path.join(CONFIG_FILE))?;

        let metrics_path = path.join(METRICS_FILE);
        let metrics: MetricsMap = if metrics_path.exists() {
            read_json(&metrics_path)?
        } else {
            MetricsMap::new()
        };
        for (name, batch) in &metrics {
            batch.validate(name)?;
        }

        let cout_path = path.join(COUT_FILE);
        let captured_out = match fs::read_to_string(&cout_path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(Error::ReadFile {
                    path: cout_path,
                    source,
                });
            }
        };

        let source_dir = Some(path.join(SOURCE_DIR)).filter(|dir| dir.is_dir());

        debug!(
            "Loaded run directory {:?}: {} sources, {} metrics",
            path,
            run.experiment.sources.len(),
            metrics.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            run,
            config,
            metrics,
            captured_out,
            source_dir,
        })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|source| Error::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| Error::MalformedRecord {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunStatus;
    use serde_json::json;
    use tempfile::tempdir;

    fn write_json(path: &Path, value: &serde_json::Value) {
        fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
    }

    fn run_json() -> serde_json::Value {
        json!({
            "experiment": {
                "name": "demo",
                "base_dir": "/work/demo",
                "sources": [["main.py", "0cc175b9c0f1b6a831c399e269772661"]],
            },
            "command": "main",
            "host": {"hostname": "box"},
            "start_time": "2024-01-02T03:04:05.000006",
            "stop_time": "2024-01-02T03:05:05.000006",
            "heartbeat": "2024-01-02T03:05:00.000000",
            "status": "FAILED",
            "result": null,
            "meta": {},
        })
    }

    #[test]
    fn test_load_full_directory() {
        let dir = tempdir().unwrap();
        write_json(&dir.path().join(RUN_FILE), &run_json());
        write_json(&dir.path().join(CONFIG_FILE), &json!({"seed": 42}));
        write_json(
            &dir.path().join(METRICS_FILE),
            &json!({
                "loss": {
                    "steps": [0, 1],
                    "values": [0.5, 0.25],
                    "timestamps": ["2024-01-02T03:04:06.000000", "2024-01-02T03:04:07.000000"],
                }
            }),
        );
        fs::write(dir.path().join(COUT_FILE), "Started run with ID \"3\"\n").unwrap();
        fs::create_dir(dir.path().join(SOURCE_DIR)).unwrap();

        let loaded = RunDirectory::load(dir.path()).unwrap();
        assert_eq!(loaded.run.status, RunStatus::Failed);
        assert_eq!(loaded.config["seed"], 42);
        assert_eq!(loaded.metrics["loss"].len(), 2);
        assert!(loaded.captured_out.starts_with("Started run"));
        assert_eq!(loaded.source_dir, Some(dir.path().join(SOURCE_DIR)));
    }

    #[test]
    fn test_load_minimal_directory() {
        let dir = tempdir().unwrap();
        write_json(&dir.path().join(RUN_FILE), &run_json());
        write_json(&dir.path().join(CONFIG_FILE), &json!({}));

        let loaded = RunDirectory::load(dir.path()).unwrap();
        assert!(loaded.metrics.is_empty());
        assert!(loaded.captured_out.is_empty());
        assert!(loaded.source_dir.is_none());
    }

    #[test]
    fn test_load_missing_directory() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            RunDirectory::load(&missing),
            Err(Error::RunDirectoryNotFound(p)) if p == missing
        ));
    }

    #[test]
    fn test_load_missing_config() {
        let dir = tempdir().unwrap();
        write_json(&dir.path().join(RUN_FILE), &run_json());
        assert!(matches!(
            RunDirectory::load(dir.path()),
            Err(Error::ReadFile { .. })
        ));
    }

    #[test]
    fn test_load_rejects_ragged_metrics() {
        let dir = tempdir().unwrap();
        write_json(&dir.path().join(RUN_FILE), &run_json());
        write_json(&dir.path().join(CONFIG_FILE), &json!({}));
        write_json(
            &dir.path().join(METRICS_FILE),
            &json!({
                "acc": {
                    "steps": [0, 1],
                    "values": [0.5],
                    "timestamps": ["2024-01-02T03:04:06.000000", "2024-01-02T03:04:07.000000"],
                }
            }),
        );
        assert!(matches!(
            RunDirectory::load(dir.path()),
            Err(Error::MetricLengthMismatch { name, .. }) if name == "acc"
        ));
    }

    #[test]
    fn test_load_malformed_run() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(RUN_FILE), "{ not json").unwrap();
        write_json(&dir.path().join(CONFIG_FILE), &json!({}));
        assert!(matches!(
            RunDirectory::load(dir.path()),
            Err(Error::MalformedRecord { .. })
        ));
    }
}
