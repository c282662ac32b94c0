//! Persistent document store backed by redb.
//!
//! Every operation is one transaction: reads go through a read txn, and
//! mutations run in a write txn that is committed before returning. The
//! database file is locked while a transaction runs, so each mutation is
//! atomic with respect to every other client of the same file, in this
//! process or another.

use crate::types::PushOutcome;
use crate::{DocumentStore, document, tables};
use parking_lot::Mutex;
use redb::{
    Database, DatabaseError, ReadOnlyTable, ReadTransaction, ReadableTable, TableDefinition,
    TableError,
};
use runvault_common::{Document, MetricBatch, MetricId, MetricSeries, RunId};
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate key {key} in collection '{collection}'")]
    DuplicateKey { collection: String, key: String },
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("transient store failure: {0}")]
    Transient(String),
    #[error("run {id} not found in collection '{collection}'")]
    RunNotFound { collection: String, id: RunId },
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(redb::StorageError),
    #[error("redb table error: {0}")]
    Table(TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(io::Error),
}

impl StoreError {
    /// True for connectivity hiccups that a later call may get past
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    #[must_use]
    pub const fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}

const fn is_transient_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        if is_transient_io(e.kind()) {
            Self::Transient(e.to_string())
        } else {
            Self::Io(e)
        }
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(e: redb::StorageError) -> Self {
        match e {
            redb::StorageError::Io(io_err) if is_transient_io(io_err.kind()) => {
                Self::Transient(io_err.to_string())
            }
            other => Self::Storage(other),
        }
    }
}

impl From<TableError> for StoreError {
    fn from(e: TableError) -> Self {
        match e {
            TableError::Storage(storage) => storage.into(),
            other => Self::Table(other),
        }
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(e: redb::CommitError) -> Self {
        match e {
            redb::CommitError::Storage(storage) => storage.into(),
            other => Self::Commit(other),
        }
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        match e {
            redb::TransactionError::Storage(storage) => storage.into(),
            other => Self::Transaction(Box::new(other)),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// How long an operation waits for another process to release the file
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const INITIAL_BACKOFF: Duration = Duration::from_millis(2);
const MAX_BACKOFF: Duration = Duration::from_millis(100);

/// Document and blob store backed by a single redb file.
///
/// The file is opened for the length of one operation and closed again, so
/// independent processes can share it. redb locks the file while it is
/// open; an operation that finds it locked backs off and retries until the
/// busy timeout, then fails with [`StoreError::Transient`].
pub struct RedbStore {
    path: PathBuf,
    pub(crate) blob_dir: Option<PathBuf>,
    busy_timeout: Duration,
    // Threads of this process take turns on the file lock
    handle: Mutex<()>,
}

impl RedbStore {
    /// Open (or create) the redb database at the given path.
    ///
    /// With `blob_dir` set, blob contents are written there as plain files;
    /// otherwise they are kept inside the database.
    pub fn open(path: impl AsRef<Path>, blob_dir: Option<PathBuf>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        if let Some(dir) = &blob_dir {
            std::fs::create_dir_all(dir)?;
        }
        let store = Self {
            path: path.to_path_buf(),
            blob_dir,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            handle: Mutex::new(()),
        };

        // Create the blob tables eagerly so later read txns don't fail
        store.with_db(|db| {
            let write_txn = db.begin_write()?;
            {
                let _t = write_txn.open_table(tables::FILES)?;
                let _t = write_txn.open_table(tables::FILE_ADDRESSES)?;
                let _t = write_txn.open_table(tables::CHUNKS)?;
            }
            write_txn.commit()?;
            Ok(())
        })?;

        debug!("Opened store at {:?} (blob dir: {:?})", store.path, store.blob_dir);
        Ok(store)
    }

    /// Set how long operations wait for a lock held by another process
    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Path of the database file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding blob contents, if any
    #[must_use]
    pub fn blob_dir(&self) -> Option<&Path> {
        self.blob_dir.as_deref()
    }

    /// Run `f` against the database, holding the file only for the call
    pub(crate) fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let _turn = self.handle.lock();
        let db = self.acquire()?;
        f(&db)
    }

    fn acquire(&self) -> StoreResult<Database> {
        let deadline = Instant::now() + self.busy_timeout;
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match Database::create(&self.path) {
                Ok(db) => return Ok(db),
                Err(DatabaseError::DatabaseAlreadyOpen) => {
                    if Instant::now() >= deadline {
                        return Err(StoreError::Transient(format!(
                            "store {} stayed locked for {:?}",
                            self.path.display(),
                            self.busy_timeout
                        )));
                    }
                    trace!("Store {:?} is locked, retrying in {:?}", self.path, backoff);
                    thread::sleep(backoff);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Open a table for reading; a collection nobody has written to yet is `None`.
pub(crate) fn open_read<K: redb::Key + 'static, V: redb::Value + 'static>(
    txn: &ReadTransaction,
    def: TableDefinition<K, V>,
) -> StoreResult<Option<ReadOnlyTable<K, V>>> {
    match txn.open_table(def) {
        Ok(table) => Ok(Some(table)),
        Err(TableError::TableDoesNotExist(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn new_run_document(id: RunId) -> Document {
    let mut doc = Document::new();
    doc.insert("_id".to_string(), Value::from(id));
    doc
}

impl DocumentStore for RedbStore {
    fn find_run(&self, collection: &str, id: RunId) -> StoreResult<Option<Document>> {
        self.with_db(|db| {
            let read_txn = db.begin_read()?;
            let Some(table) = open_read(&read_txn, tables::runs(collection))? else {
                return Ok(None);
            };
            let doc = table
                .get(id)?
                .map(|v| document::decode(v.value()))
                .transpose()?;
            Ok(doc)
        })
    }

    fn max_run_id(&self, collection: &str) -> StoreResult<Option<RunId>> {
        self.with_db(|db| {
            let read_txn = db.begin_read()?;
            let Some(table) = open_read(&read_txn, tables::runs(collection))? else {
                return Ok(None);
            };
            let max = table.last()?.map(|(key, _)| key.value());
            Ok(max)
        })
    }

    fn insert_run(&self, collection: &str, id: RunId, doc: &Document) -> StoreResult<()> {
        let mut doc = doc.clone();
        doc.insert("_id".to_string(), Value::from(id));
        let bytes = document::encode(&doc)?;

        self.with_db(|db| {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(tables::runs(collection))?;
                if table.get(id)?.is_some() {
                    return Err(StoreError::DuplicateKey {
                        collection: collection.to_string(),
                        key: id.to_string(),
                    });
                }
                table.insert(id, bytes.as_slice())?;
            }
            write_txn.commit()?;
            Ok(())
        })?;
        debug!("Inserted run {} into '{}'", id, collection);
        Ok(())
    }

    fn set_run_fields(&self, collection: &str, id: RunId, fields: &Document) -> StoreResult<()> {
        self.with_db(|db| {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(tables::runs(collection))?;
                // Read and decode, then drop the guard before mutating
                let existing = table
                    .get(id)?
                    .map(|v| document::decode(v.value()))
                    .transpose()?;
                let mut doc = existing.unwrap_or_else(|| new_run_document(id));
                for (key, value) in fields {
                    doc.insert(key.clone(), value.clone());
                }
                doc.insert("_id".to_string(), Value::from(id));
                let bytes = document::encode(&doc)?;
                table.insert(id, bytes.as_slice())?;
            }
            write_txn.commit()?;
            Ok(())
        })?;
        debug!(
            "Set {} field(s) on run {} in '{}'",
            fields.len(),
            id,
            collection
        );
        Ok(())
    }

    fn push_run_array(
        &self,
        collection: &str,
        id: RunId,
        path: &[&str],
        values: &[Value],
    ) -> StoreResult<()> {
        self.with_db(|db| {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(tables::runs(collection))?;
                let existing = table
                    .get(id)?
                    .map(|v| document::decode(v.value()))
                    .transpose()?;
                let Some(mut doc) = existing else {
                    return Err(StoreError::RunNotFound {
                        collection: collection.to_string(),
                        id,
                    });
                };
                document::push_array(&mut doc, path, values)?;
                let bytes = document::encode(&doc)?;
                table.insert(id, bytes.as_slice())?;
            }
            write_txn.commit()?;
            Ok(())
        })?;
        debug!(
            "Pushed {} value(s) to {} of run {} in '{}'",
            values.len(),
            path.join("."),
            id,
            collection
        );
        Ok(())
    }

    fn push_metric(
        &self,
        collection: &str,
        run_id: RunId,
        name: &str,
        batch: &MetricBatch,
    ) -> StoreResult<PushOutcome> {
        let outcome = self.with_db(|db| {
            let write_txn = db.begin_write()?;
            let outcome = {
                let mut table = write_txn.open_table(tables::metrics(collection))?;
                let existing = table
                    .get((run_id, name))?
                    .map(|v| bincode::deserialize::<MetricSeries>(v.value()))
                    .transpose()?;
                let (series, created) = match existing {
                    Some(mut series) => {
                        series.append(batch);
                        (series, false)
                    }
                    None => (
                        MetricSeries::from_batch(MetricId::new(), run_id, name, batch),
                        true,
                    ),
                };
                let bytes = bincode::serialize(&series)?;
                table.insert((run_id, name), bytes.as_slice())?;
                PushOutcome {
                    id: series.id,
                    created,
                }
            };
            write_txn.commit()?;
            Ok(outcome)
        })?;
        debug!(
            "Pushed {} point(s) to metric '{}' of run {} (created: {})",
            batch.len(),
            name,
            run_id,
            outcome.created
        );
        Ok(outcome)
    }

    fn find_metric(
        &self,
        collection: &str,
        run_id: RunId,
        name: &str,
    ) -> StoreResult<Option<MetricSeries>> {
        self.with_db(|db| {
            let read_txn = db.begin_read()?;
            let Some(table) = open_read(&read_txn, tables::metrics(collection))? else {
                return Ok(None);
            };
            let series = table
                .get((run_id, name))?
                .map(|v| bincode::deserialize::<MetricSeries>(v.value()))
                .transpose()?;
            Ok(series)
        })
    }
}
