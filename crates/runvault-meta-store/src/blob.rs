//! Content-addressed blob storage on top of [`RedbStore`].
//!
//! Blobs are indexed by (filename, md5) in `fs.files.address`. Contents go
//! to `fs.chunks`, or to `<blob_dir>/<blob id>` when a blob directory is
//! configured.

use crate::store::{RedbStore, StoreResult, open_read};
use crate::types::FileRecord;
use crate::{BlobStore, tables};
use chrono::Utc;
use redb::{ReadableTable, ReadableTableMetadata};
use runvault_common::BlobId;
use runvault_common::checksum::content_md5;
use tracing::debug;

impl RedbStore {
    /// Fetch the index entry of a blob
    pub fn file_record(&self, id: BlobId) -> StoreResult<Option<FileRecord>> {
        self.with_db(|db| {
            let read_txn = db.begin_read()?;
            let Some(files) = open_read(&read_txn, tables::FILES)? else {
                return Ok(None);
            };
            let key = id.to_string();
            let record = files
                .get(key.as_str())?
                .map(|v| bincode::deserialize::<FileRecord>(v.value()))
                .transpose()?;
            Ok(record)
        })
    }
}

impl BlobStore for RedbStore {
    fn find_blob(&self, filename: &str, md5: &str) -> StoreResult<Option<BlobId>> {
        self.with_db(|db| {
            let read_txn = db.begin_read()?;
            let Some(addresses) = open_read(&read_txn, tables::FILE_ADDRESSES)? else {
                return Ok(None);
            };
            let id = addresses
                .get((filename, md5))?
                .and_then(|v| BlobId::parse(v.value()));
            Ok(id)
        })
    }

    fn put_blob(&self, filename: &str, data: &[u8]) -> StoreResult<BlobId> {
        let md5 = content_md5(data);
        self.with_db(|db| {
            let write_txn = db.begin_write()?;
            let id = {
                let mut addresses = write_txn.open_table(tables::FILE_ADDRESSES)?;
                let existing = addresses
                    .get((filename, md5.as_str()))?
                    .and_then(|v| BlobId::parse(v.value()));
                if let Some(id) = existing {
                    // Another writer stored the same content first
                    debug!("Blob {} ({}) already stored as {}", filename, md5, id);
                    return Ok(id);
                }

                let id = BlobId::new();
                let key = id.to_string();
                match &self.blob_dir {
                    Some(dir) => std::fs::write(dir.join(&key), data)?,
                    None => {
                        let mut chunks = write_txn.open_table(tables::CHUNKS)?;
                        chunks.insert(key.as_str(), data)?;
                    }
                }

                let record = FileRecord {
                    id,
                    filename: filename.to_string(),
                    md5: md5.clone(),
                    length: data.len() as u64,
                    upload_time: Utc::now(),
                };
                let record_bytes = bincode::serialize(&record)?;
                let mut files = write_txn.open_table(tables::FILES)?;
                files.insert(key.as_str(), record_bytes.as_slice())?;
                addresses.insert((filename, md5.as_str()), key.as_str())?;
                id
            };
            write_txn.commit()?;
            debug!("Stored blob {} ({} bytes) as {}", filename, data.len(), id);
            Ok(id)
        })
    }

    fn add_blob_address(&self, filename: &str, md5: &str, id: BlobId) -> StoreResult<BlobId> {
        self.with_db(|db| {
            let write_txn = db.begin_write()?;
            let target = {
                let mut addresses = write_txn.open_table(tables::FILE_ADDRESSES)?;
                let existing = addresses
                    .get((filename, md5))?
                    .and_then(|v| BlobId::parse(v.value()));
                match existing {
                    Some(existing) => existing,
                    None => {
                        let key = id.to_string();
                        addresses.insert((filename, md5), key.as_str())?;
                        id
                    }
                }
            };
            write_txn.commit()?;
            debug!("Address {} ({}) points at blob {}", filename, md5, target);
            Ok(target)
        })
    }

    fn get_blob(&self, id: BlobId) -> StoreResult<Option<Vec<u8>>> {
        self.with_db(|db| {
            let read_txn = db.begin_read()?;
            let key = id.to_string();
            let known = match open_read(&read_txn, tables::FILES)? {
                Some(files) => files.get(key.as_str())?.is_some(),
                None => false,
            };
            if !known {
                return Ok(None);
            }

            match &self.blob_dir {
                Some(dir) => Ok(Some(std::fs::read(dir.join(&key))?)),
                None => {
                    let Some(chunks) = open_read(&read_txn, tables::CHUNKS)? else {
                        return Ok(None);
                    };
                    let data = chunks.get(key.as_str())?.map(|v| v.value().to_vec());
                    Ok(data)
                }
            }
        })
    }

    fn count_blobs(&self) -> StoreResult<u64> {
        self.with_db(|db| {
            let read_txn = db.begin_read()?;
            let count = match open_read(&read_txn, tables::FILES)? {
                Some(files) => files.len()?,
                None => 0,
            };
            Ok(count)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_put_and_find_blob() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("blobs.redb"), None).unwrap();

        let md5 = content_md5(b"print('hi')\n");
        assert!(store.find_blob("/exp/a.py", &md5).unwrap().is_none());

        let id = store.put_blob("/exp/a.py", b"print('hi')\n").unwrap();
        assert_eq!(store.find_blob("/exp/a.py", &md5).unwrap(), Some(id));
        assert_eq!(store.get_blob(id).unwrap().unwrap(), b"print('hi')\n");

        let record = store.file_record(id).unwrap().unwrap();
        assert_eq!(record.filename, "/exp/a.py");
        assert_eq!(record.md5, md5);
        assert_eq!(record.length, 12);
    }

    #[test]
    fn test_put_same_content_once() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("blobs.redb"), None).unwrap();

        let first = store.put_blob("/exp/a.py", b"x = 1").unwrap();
        let second = store.put_blob("/exp/a.py", b"x = 1").unwrap();
        assert_eq!(first, second);
        assert_eq!(store.count_blobs().unwrap(), 1);

        // Same path, new content is a new blob
        let third = store.put_blob("/exp/a.py", b"x = 2").unwrap();
        assert_ne!(first, third);
        // Same content, other path is a new blob too
        let fourth = store.put_blob("/exp/b.py", b"x = 1").unwrap();
        assert_ne!(first, fourth);
        assert_eq!(store.count_blobs().unwrap(), 3);
    }

    #[test]
    fn test_blob_dir_storage() {
        let dir = tempdir().unwrap();
        let blob_dir = dir.path().join("blobs");
        let store =
            RedbStore::open(dir.path().join("meta.redb"), Some(blob_dir.clone())).unwrap();

        let id = store.put_blob("/exp/model.py", b"class Net: pass").unwrap();
        let on_disk = std::fs::read(blob_dir.join(id.to_string())).unwrap();
        assert_eq!(on_disk, b"class Net: pass");
        assert_eq!(store.get_blob(id).unwrap().unwrap(), b"class Net: pass");
    }

    #[test]
    fn test_add_blob_address() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("blobs.redb"), None).unwrap();

        let id = store.put_blob("/exp/a.py", b"x = 1").unwrap();
        let stale = content_md5(b"x = 0");
        assert_eq!(store.add_blob_address("/exp/a.py", &stale, id).unwrap(), id);
        assert_eq!(store.find_blob("/exp/a.py", &stale).unwrap(), Some(id));
        assert_eq!(store.count_blobs().unwrap(), 1);

        // An address already in use keeps its blob
        let other = store.put_blob("/exp/a.py", b"x = 2").unwrap();
        assert_eq!(store.add_blob_address("/exp/a.py", &stale, other).unwrap(), id);
    }

    #[test]
    fn test_get_unknown_blob() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("blobs.redb"), None).unwrap();
        assert!(store.get_blob(BlobId::new()).unwrap().is_none());
        assert_eq!(store.count_blobs().unwrap(), 0);
    }
}
