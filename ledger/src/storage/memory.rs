//! In-memory backend. Used by tests, benchmarks, and `--in-memory` nodes.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::StoreResult;

use super::store::{Backend, KeyValue, ReadView, WriteSet};
use super::txn::ReadSet;

/// An ordered map behind a read/write lock.
///
/// Reads share the lock; a commit takes it exclusively for both validation
/// and application, which is what makes the commit atomic.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every committed entry, in key order.
    pub fn dump(&self) -> Vec<KeyValue> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl ReadView for BTreeMap<Vec<u8>, Vec<u8>> {
    fn read(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.get(key).cloned())
    }

    fn read_prefix(&self, prefix: &[u8]) -> StoreResult<Vec<KeyValue>> {
        Ok(self
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

impl ReadView for MemoryBackend {
    fn read(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        ReadView::read(&*self.entries.read(), key)
    }

    fn read_prefix(&self, prefix: &[u8]) -> StoreResult<Vec<KeyValue>> {
        ReadView::read_prefix(&*self.entries.read(), prefix)
    }
}

impl Backend for MemoryBackend {
    fn commit(&self, reads: &ReadSet, writes: &WriteSet) -> StoreResult<()> {
        let mut entries = self.entries.write();
        reads.validate(&*entries)?;
        for (key, value) in writes {
            match value {
                Some(v) => {
                    entries.insert(key.clone(), v.clone());
                }
                None => {
                    entries.remove(key);
                }
            }
        }
        Ok(())
    }

    fn validate(&self, reads: &ReadSet) -> StoreResult<()> {
        reads.validate(&*self.entries.read())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }

    fn entry_count(&self) -> usize {
        self.entries.read().len()
    }
}
