//! # Optimistic Transactions
//!
//! A [`Transaction`] is the unit of atomicity for one ledger invocation.
//! While the invocation runs:
//!
//! - writes are buffered in an overlay and are visible to later reads of
//!   the same transaction (read-your-own-writes);
//! - every committed value read, and every committed prefix range scanned,
//!   is fingerprinted into a [`ReadSet`].
//!
//! On [`commit`](Transaction::commit) the backend re-reads each fingerprinted
//! key and range under its commit lock. If anything changed since it was
//! read, the commit fails with [`StoreError::Conflict`] and no write is
//! applied. Otherwise all writes land atomically.
//!
//! ```text
//! begin ──► get / scan (recorded) ──► put / delete (buffered) ──► commit
//!                                                              │
//!                                  validate reads ◄────────────┤
//!                                  apply writes   ◄────────────┘
//! ```
//!
//! Reads go to the latest committed state rather than a snapshot, so a
//! failure computed mid-invocation may rest on reads another commit has
//! since overwritten. [`reconcile`](Transaction::reconcile) sorts those
//! races out from genuine rejections.
//!
//! Dropping a transaction without committing discards it.

use std::collections::BTreeMap;

use crate::error::{LedgerError, StoreError, StoreResult};

use super::store::{Backend, KeyValue, KeyValueStore, ReadView, ScanIter, WriteSet};

// ---------------------------------------------------------------------------
// ReadSet
// ---------------------------------------------------------------------------

/// Fingerprints of committed state observed by a transaction.
#[derive(Debug, Default, Clone)]
pub struct ReadSet {
    points: BTreeMap<Vec<u8>, Option<blake3::Hash>>,
    ranges: BTreeMap<Vec<u8>, blake3::Hash>,
}

impl ReadSet {
    /// Records a point read. Only the first observation of a key is kept;
    /// a later differing observation would fail validation anyway.
    fn record_point(&mut self, key: &[u8], value: Option<&[u8]>) {
        self.points
            .entry(key.to_vec())
            .or_insert_with(|| value.map(blake3::hash));
    }

    fn record_range(&mut self, prefix: &[u8], entries: &[KeyValue]) {
        self.ranges
            .entry(prefix.to_vec())
            .or_insert_with(|| range_digest(entries));
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.ranges.is_empty()
    }

    /// Number of recorded point reads and range scans.
    pub fn len(&self) -> usize {
        self.points.len() + self.ranges.len()
    }

    /// Checks every recorded observation against `view`.
    ///
    /// Called by backends while they hold their commit lock.
    pub fn validate(&self, view: &dyn ReadView) -> StoreResult<()> {
        for (key, observed) in &self.points {
            let current = view.read(key)?;
            if current.as_deref().map(blake3::hash) != *observed {
                return Err(StoreError::Conflict {
                    key: hex::encode(key),
                });
            }
        }

        for (prefix, observed) in &self.ranges {
            let current = view.read_prefix(prefix)?;
            if range_digest(&current) != *observed {
                return Err(StoreError::Conflict {
                    key: hex::encode(prefix),
                });
            }
        }

        Ok(())
    }
}

/// Length-prefixed digest over an ordered run of entries, so that
/// `("ab", "c")` and `("a", "bc")` never collide.
fn range_digest(entries: &[KeyValue]) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(entries.len() as u64).to_le_bytes());
    for (key, value) in entries {
        hasher.update(&(key.len() as u64).to_le_bytes());
        hasher.update(key);
        hasher.update(&(value.len() as u64).to_le_bytes());
        hasher.update(value);
    }
    hasher.finalize()
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A buffered, validated-at-commit view over a [`Backend`].
pub struct Transaction<'a> {
    backend: &'a dyn Backend,
    reads: ReadSet,
    writes: WriteSet,
}

impl<'a> Transaction<'a> {
    pub fn begin(backend: &'a dyn Backend) -> Self {
        Self {
            backend,
            reads: ReadSet::default(),
            writes: WriteSet::new(),
        }
    }

    /// `true` if nothing has been written.
    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }

    /// Checks everything read so far against committed state, writing
    /// nothing.
    ///
    /// Reads are not taken from a snapshot: two reads in one transaction may
    /// straddle another commit. A result computed from such reads is only
    /// trustworthy once this passes.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] if a concurrent commit changed anything this
    /// transaction read.
    pub fn validate(&self) -> StoreResult<()> {
        if self.reads.is_empty() {
            return Ok(());
        }
        self.backend.validate(&self.reads)
    }

    /// Re-examines an engine failure against the read set.
    ///
    /// A failure derived from reads that have since been overwritten is
    /// reported as the conflict it really is, so callers retry instead of
    /// treating a race as a broken ledger. Any other failure passes through.
    pub fn reconcile(&self, err: LedgerError) -> LedgerError {
        match self.validate() {
            Err(conflict @ StoreError::Conflict { .. }) => {
                tracing::debug!(original = %err, "failure rests on stale reads");
                LedgerError::Store(conflict)
            }
            _ => err,
        }
    }

    /// Validates and applies the transaction. Returns the number of keys
    /// written.
    ///
    /// A read-only transaction writes nothing but is still validated, so a
    /// report assembled from reads that straddle another commit is refused.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] if a concurrent commit changed anything this
    /// transaction read. The caller may retry the whole invocation.
    pub fn commit(self) -> StoreResult<usize> {
        if self.is_read_only() {
            self.validate()?;
            return Ok(0);
        }
        let written = self.writes.len();
        self.backend.commit(&self.reads, &self.writes)?;
        tracing::debug!(
            backend = self.backend.kind(),
            writes = written,
            reads = self.reads.len(),
            "transaction committed"
        );
        Ok(written)
    }
}

impl KeyValueStore for Transaction<'_> {
    fn get(&mut self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        if let Some(pending) = self.writes.get(key) {
            return Ok(pending.clone());
        }
        let value = self.backend.read(key)?;
        self.reads.record_point(key, value.as_deref());
        Ok(value)
    }

    fn put(&mut self, key: &[u8], value: Vec<u8>) -> StoreResult<()> {
        self.writes.insert(key.to_vec(), Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    fn scan_prefix(&mut self, prefix: &[u8]) -> StoreResult<ScanIter> {
        let committed = self.backend.read_prefix(prefix)?;
        self.reads.record_range(prefix, &committed);

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = committed.into_iter().collect();
        for (key, pending) in self
            .writes
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
        {
            match pending {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(ScanIter::new(merged.into_iter().collect()))
    }
}
