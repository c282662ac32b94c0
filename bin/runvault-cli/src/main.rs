//! Runvault CLI - Run ingestion tool
//!
//! Ingests recorded run directories into a Runvault store and prints
//! stored runs back.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use runvault_client::Client;
use runvault_common::{ClientConfig, RunDirectory, RunId};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "runvault-cli")]
#[command(about = "Runvault run ingestion CLI")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "runvault.toml")]
    config: PathBuf,

    /// Store location: redb://<dir> or a directory
    #[arg(long, global = true, env = "RUNVAULT_URL")]
    url: Option<String>,

    /// Database name inside the store directory
    #[arg(long, global = true)]
    db_name: Option<String>,

    /// Prefix for the run and metric collections
    #[arg(long, global = true)]
    collection_prefix: Option<String>,

    /// Keep blob contents as files in this directory
    #[arg(long, global = true)]
    blob_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest a recorded run directory
    Ingest {
        /// Directory holding run.json, config.json, metrics.json, cout.txt and source/
        run_dir: PathBuf,

        /// Replace this existing run instead of allocating a new id
        #[arg(long)]
        overwrite: Option<RunId>,

        /// Store a fresh run under this id (ignored with --overwrite)
        #[arg(long)]
        id: Option<RunId>,

        /// File the stored run id is written to
        #[arg(long, default_value = "_id.txt")]
        id_file: PathBuf,
    },
    /// Print a stored run as JSON
    Show {
        /// Run id
        id: RunId,

        /// Include these metric series in the output
        #[arg(long = "metric")]
        metrics: Vec<String>,
    },
}

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct Config {
    #[serde(default)]
    store: ClientConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingConfig {
    #[serde(default = "default_log_level")]
    level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let config_str = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&config_str)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn init_logging(level: &str, json: bool) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    init_logging(&log_level, config.logging.json);

    // CLI takes precedence over the config file
    let mut store = config.store;
    if let Some(url) = args.url {
        store.url = Some(url);
    }
    if let Some(db_name) = args.db_name {
        store.db_name = db_name;
    }
    if let Some(prefix) = args.collection_prefix {
        store.collection_prefix = prefix;
    }
    if let Some(blob_dir) = args.blob_dir {
        store.blob_dir = Some(blob_dir);
    }

    match args.command {
        Commands::Ingest {
            run_dir,
            overwrite,
            id,
            id_file,
        } => {
            if overwrite.is_some() {
                store.overwrite = overwrite;
            }
            ingest(&store, &run_dir, id, &id_file)
        }
        Commands::Show { id, metrics } => {
            store.overwrite = None;
            show(&store, id, &metrics)
        }
    }
}

fn ingest(store: &ClientConfig, run_dir: &Path, id: Option<RunId>, id_file: &Path) -> Result<()> {
    let dir = RunDirectory::load(run_dir)
        .with_context(|| format!("failed to load run directory {}", run_dir.display()))?;
    let mut client = Client::connect(store).context("failed to open run store")?;
    if let Some(target) = client.overwrite_target() {
        info!("Overwriting run {}", target);
    }

    let stored = client.ingest(&dir, id)?;
    info!("Ingested {} as run {}", run_dir.display(), stored);

    fs::write(id_file, stored.to_string())
        .with_context(|| format!("failed to write run id to {}", id_file.display()))?;
    println!("{stored}");
    Ok(())
}

fn show(store: &ClientConfig, id: RunId, metrics: &[String]) -> Result<()> {
    let client = Client::connect(store).context("failed to open run store")?;
    let Some(doc) = client.run(id)? else {
        bail!("run {id} not found in '{}'", client.collections().runs);
    };

    let mut output = Value::Object(doc);
    if !metrics.is_empty() {
        let mut series = serde_json::Map::new();
        for name in metrics {
            match client.metric(id, name)? {
                Some(metric) => {
                    series.insert(name.clone(), serde_json::to_value(&metric)?);
                }
                None => warn!("Run {} has no metric '{}'", id, name),
            }
        }
        output["metrics"] = Value::Object(series);
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_file() {
        let config: Config = toml::from_str(
            r#"
            [store]
            url = "redb:///var/lib/runvault"
            collection_prefix = "nightly"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.store.url.as_deref(), Some("redb:///var/lib/runvault"));
        assert_eq!(config.store.collection_prefix, "nightly");
        assert_eq!(config.store.db_name, "runvault");
        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_unknown_store_field_rejected() {
        let result: std::result::Result<Config, _> = toml::from_str(
            r#"
            [store]
            url = "/tmp/runs"
            replica_set = "rs0"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_ingest_args() {
        let args = Args::try_parse_from([
            "runvault-cli",
            "ingest",
            "runs/17",
            "--url",
            "/tmp/store",
            "--overwrite",
            "3",
        ])
        .unwrap();
        assert_eq!(args.url.as_deref(), Some("/tmp/store"));
        match args.command {
            Commands::Ingest {
                run_dir,
                overwrite,
                id,
                id_file,
            } => {
                assert_eq!(run_dir, PathBuf::from("runs/17"));
                assert_eq!(overwrite, Some(3));
                assert_eq!(id, None);
                assert_eq!(id_file, PathBuf::from("_id.txt"));
            }
            Commands::Show { .. } => panic!("expected ingest"),
        }
    }
}
