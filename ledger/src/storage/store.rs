//! The narrow store seams the ledger is written against.
//!
//! - [`KeyValueStore`] is what engine code sees: get, put, delete, prefix
//!   scan, and composite-key splitting. Nothing else.
//! - [`Backend`] is what a transaction commits into: committed reads plus an
//!   atomic validate-and-apply step.
//! - [`ReadView`] is the committed-state reader a backend hands to
//!   [`ReadSet::validate`](super::txn::ReadSet::validate) while it holds its
//!   commit lock.

use std::collections::BTreeMap;

use crate::error::StoreResult;

use super::key::CompositeKey;
use super::txn::ReadSet;

/// One stored entry: raw key bytes and value bytes.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Buffered writes of a transaction. `None` marks a delete.
pub type WriteSet = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

// ---------------------------------------------------------------------------
// ScanIter
// ---------------------------------------------------------------------------

/// The result of a prefix scan: a finite, owned sequence in key order.
///
/// Owning the entries means the caller may keep writing to the store while
/// walking the scan. The sequence reflects the store as of the scan call;
/// scanning again restarts from the then-current state.
#[derive(Debug, Default)]
pub struct ScanIter {
    inner: std::vec::IntoIter<KeyValue>,
}

impl ScanIter {
    pub fn new(entries: Vec<KeyValue>) -> Self {
        Self {
            inner: entries.into_iter(),
        }
    }
}

impl Iterator for ScanIter {
    type Item = KeyValue;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for ScanIter {}

// ---------------------------------------------------------------------------
// KeyValueStore
// ---------------------------------------------------------------------------

/// The only storage capability the ledger engine depends on.
///
/// Reads take `&mut self` so that implementations can record what was read
/// for commit-time validation.
pub trait KeyValueStore {
    fn get(&mut self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    fn put(&mut self, key: &[u8], value: Vec<u8>) -> StoreResult<()>;

    fn delete(&mut self, key: &[u8]) -> StoreResult<()>;

    /// Every entry whose key starts with `prefix`, in ascending key order.
    fn scan_prefix(&mut self, prefix: &[u8]) -> StoreResult<ScanIter>;

    /// Decodes a composite key returned by [`scan_prefix`](Self::scan_prefix).
    fn split_key(&self, key: &[u8]) -> StoreResult<(String, Vec<String>)> {
        CompositeKey::split(key)
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Read access to committed state.
pub trait ReadView {
    fn read(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    fn read_prefix(&self, prefix: &[u8]) -> StoreResult<Vec<KeyValue>>;
}

/// Committed storage that transactions begin from and commit into.
///
/// Implementations must make `commit` atomic with respect to other commits:
/// validation of `reads` and application of `writes` happen under one lock,
/// and either every write lands or none does.
pub trait Backend: ReadView + Send + Sync {
    /// Validates `reads` against current committed state, then applies
    /// `writes`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`](crate::error::StoreError::Conflict)
    /// when any recorded read no longer matches; nothing is applied.
    fn commit(&self, reads: &ReadSet, writes: &WriteSet) -> StoreResult<()>;

    /// Validates `reads` against current committed state without writing.
    /// Must observe the same state a concurrent `commit` would.
    fn validate(&self, reads: &ReadSet) -> StoreResult<()>;

    /// Short human-readable backend name for logs and status output.
    fn kind(&self) -> &'static str;

    /// Number of committed entries.
    fn entry_count(&self) -> usize;
}
