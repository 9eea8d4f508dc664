//! # LedgerDb: Persistent Storage Engine
//!
//! The persistent backend for the loyalty ledger, built on sled's embedded
//! key-value store.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                         | Value                          |
//! |------------|-----------------------------|--------------------------------|
//! | `ledger`   | composite key or `__settings` | LE u64 / JSON record / blob  |
//! | `metadata` | key (UTF-8)                 | value (bytes)                  |
//!
//! All ledger state lives in one tree so that a commit is a single sled
//! `Batch`: either every write of an invocation lands or none does.
//!
//! ## Commit Protocol
//!
//! sled transactions cannot scan ranges, so validation is done by hand:
//! a commit mutex serializes committers, the read set is checked against the
//! tree while the mutex is held, and the batch is applied before it is
//! released. Readers never take the mutex.

use std::path::Path;

use parking_lot::Mutex;
use sled::{Batch, Db, Tree};

use crate::config::STORAGE_FORMAT_VERSION;
use crate::error::{StoreError, StoreResult};

use super::store::{Backend, KeyValue, ReadView, WriteSet};
use super::txn::ReadSet;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Well-known key in the `metadata` tree for the storage format version.
const META_FORMAT_VERSION: &[u8] = b"storage_format_version";

/// Well-known key in the `metadata` tree counting applied commits.
const META_COMMIT_COUNT: &[u8] = b"commit_count";

// ---------------------------------------------------------------------------
// LedgerDb
// ---------------------------------------------------------------------------

/// Persistent ledger storage.
///
/// Cheap to share behind an `Arc`; sled trees support concurrent readers,
/// and the commit mutex serializes writers.
#[derive(Debug)]
pub struct LedgerDb {
    db: Db,
    ledger: Tree,
    metadata: Tree,
    commit_lock: Mutex<()>,
    flush_on_commit: bool,
}

impl LedgerDb {
    /// Open or create a database at the given filesystem path.
    ///
    /// # Errors
    ///
    /// Fails if sled cannot open the path, or if the database was written
    /// with a different storage format version.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    pub fn open_temporary() -> StoreResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let ledger = db.open_tree("ledger")?;
        let metadata = db.open_tree("metadata")?;

        match metadata.get(META_FORMAT_VERSION)? {
            Some(bytes) => {
                let found = <[u8; 2]>::try_from(bytes.as_ref())
                    .map(u16::from_le_bytes)
                    .map_err(|_| StoreError::Incompatible("corrupt format version".into()))?;
                if found != STORAGE_FORMAT_VERSION {
                    return Err(StoreError::Incompatible(format!(
                        "storage format {found} is not supported (expected {STORAGE_FORMAT_VERSION})"
                    )));
                }
            }
            None => {
                metadata.insert(META_FORMAT_VERSION, &STORAGE_FORMAT_VERSION.to_le_bytes())?;
            }
        }

        Ok(Self {
            db,
            ledger,
            metadata,
            commit_lock: Mutex::new(()),
            flush_on_commit: false,
        })
    }

    /// Flush to disk after every commit. Off by default: sled flushes on its
    /// own schedule and on drop.
    pub fn with_flush_on_commit(mut self, flush: bool) -> Self {
        self.flush_on_commit = flush;
        self
    }

    /// Number of commits applied over the lifetime of this database.
    pub fn commit_count(&self) -> StoreResult<u64> {
        Ok(self
            .metadata
            .get(META_COMMIT_COUNT)?
            .and_then(|bytes| <[u8; 8]>::try_from(bytes.as_ref()).ok())
            .map(u64::from_le_bytes)
            .unwrap_or(0))
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl ReadView for Tree {
    fn read(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.get(key)?.map(|v| v.to_vec()))
    }

    fn read_prefix(&self, prefix: &[u8]) -> StoreResult<Vec<KeyValue>> {
        self.scan_prefix(prefix)
            .map(|entry| {
                let (k, v) = entry?;
                Ok((k.to_vec(), v.to_vec()))
            })
            .collect()
    }
}

impl ReadView for LedgerDb {
    fn read(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        ReadView::read(&self.ledger, key)
    }

    fn read_prefix(&self, prefix: &[u8]) -> StoreResult<Vec<KeyValue>> {
        ReadView::read_prefix(&self.ledger, prefix)
    }
}

impl Backend for LedgerDb {
    fn commit(&self, reads: &ReadSet, writes: &WriteSet) -> StoreResult<()> {
        let _guard = self.commit_lock.lock();
        reads.validate(&self.ledger)?;

        let mut batch = Batch::default();
        for (key, value) in writes {
            match value {
                Some(v) => batch.insert(key.as_slice(), v.as_slice()),
                None => batch.remove(key.as_slice()),
            }
        }
        self.ledger.apply_batch(batch)?;

        let commits = self.commit_count()? + 1;
        self.metadata.insert(META_COMMIT_COUNT, &commits.to_le_bytes())?;

        if self.flush_on_commit {
            self.db.flush()?;
        }
        Ok(())
    }

    fn validate(&self, reads: &ReadSet) -> StoreResult<()> {
        let _guard = self.commit_lock.lock();
        reads.validate(&self.ledger)
    }

    fn kind(&self) -> &'static str {
        "sled"
    }

    fn entry_count(&self) -> usize {
        self.ledger.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
