//! # Asset Store
//!
//! The chunk representation of value. A chunk is stored at
//! `(index, owner, source, id)` with a JSON body of `{history, value}`.
//! Splitting rewrites a chunk in place with a smaller value; re-homing
//! deletes (or shrinks) a chunk and creates a new one under another owner
//! with one more provenance entry.
//!
//! Sequence ids come from a counter per `(index, owner, source)` that lives
//! in its own index and only ever goes up, so a deleted id is never reused.

use serde::{Deserialize, Serialize};

use crate::balance;
use crate::error::{LedgerError, LedgerResult};
use crate::storage::{CompositeKey, Index, KeyValueStore};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The persisted body of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Provenance, oldest first. `history[0]` is the issuing bank.
    pub history: Vec<String>,
    pub value: u64,
}

/// A chunk together with the key it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetChunk {
    pub owner: String,
    pub source: String,
    pub id: String,
    pub history: Vec<String>,
    pub value: u64,
}

impl AssetChunk {
    /// The bank that originally issued this value.
    pub fn issuer(&self) -> Option<&str> {
        self.history.first().map(String::as_str)
    }

    /// `history` with `hops` appended, for the chunk this one is re-homed to.
    pub fn extended_history(&self, hops: &[&str]) -> Vec<String> {
        let mut history = Vec::with_capacity(self.history.len() + hops.len());
        history.extend(self.history.iter().cloned());
        history.extend(hops.iter().map(|h| h.to_string()));
        history
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

fn chunk_key(index: Index, owner: &str, source: &str, id: &str) -> LedgerResult<CompositeKey> {
    Ok(CompositeKey::new(index, &[owner, source, id])?)
}

fn sequence_key(index: Index, owner: &str, source: &str) -> LedgerResult<CompositeKey> {
    Ok(CompositeKey::new(Index::AssetSequence, &[index.name(), owner, source])?)
}

fn next_sequence<S>(store: &mut S, index: Index, owner: &str, source: &str) -> LedgerResult<u64>
where
    S: KeyValueStore + ?Sized,
{
    let key = sequence_key(index, owner, source)?;
    let next = match store.get(key.as_bytes())? {
        Some(bytes) => balance::decode(&bytes)?,
        None => 0,
    };
    let bumped = next
        .checked_add(1)
        .ok_or_else(|| LedgerError::Inconsistent(format!("sequence exhausted for {owner}/{source}")))?;
    store.put(key.as_bytes(), balance::encode(bumped))?;
    Ok(next)
}

fn require_positive(value: u64) -> LedgerResult<()> {
    if value == 0 {
        return Err(LedgerError::NonPositiveValue);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Creates a chunk under a freshly allocated id and returns it.
pub fn create<S>(
    store: &mut S,
    index: Index,
    owner: &str,
    source: &str,
    history: Vec<String>,
    value: u64,
) -> LedgerResult<AssetChunk>
where
    S: KeyValueStore + ?Sized,
{
    require_positive(value)?;
    let id = next_sequence(store, index, owner, source)?.to_string();
    store_chunk(store, index, owner, source, &id, &history, value)?;
    tracing::debug!(%index, owner, source, id = %id, value, "chunk created");
    Ok(AssetChunk {
        owner: owner.to_string(),
        source: source.to_string(),
        id,
        history,
        value,
    })
}

/// Writes a chunk at a known id, replacing whatever was there.
pub fn store<S>(
    store: &mut S,
    index: Index,
    owner: &str,
    source: &str,
    id: &str,
    history: &[String],
    value: u64,
) -> LedgerResult<()>
where
    S: KeyValueStore + ?Sized,
{
    require_positive(value)?;
    store_chunk(store, index, owner, source, id, history, value)
}

fn store_chunk<S>(
    store: &mut S,
    index: Index,
    owner: &str,
    source: &str,
    id: &str,
    history: &[String],
    value: u64,
) -> LedgerResult<()>
where
    S: KeyValueStore + ?Sized,
{
    let key = chunk_key(index, owner, source, id)?;
    let record = AssetRecord {
        history: history.to_vec(),
        value,
    };
    store.put(key.as_bytes(), serde_json::to_vec(&record)?)?;
    Ok(())
}

pub fn remove<S>(store: &mut S, index: Index, owner: &str, source: &str, id: &str) -> LedgerResult<()>
where
    S: KeyValueStore + ?Sized,
{
    let key = chunk_key(index, owner, source, id)?;
    store.delete(key.as_bytes())?;
    Ok(())
}

/// Every chunk owned by `owner` under `index`, optionally narrowed to one
/// source, in store key order.
pub fn list_by_owner<S>(
    store: &mut S,
    index: Index,
    owner: &str,
    source: Option<&str>,
) -> LedgerResult<Vec<AssetChunk>>
where
    S: KeyValueStore + ?Sized,
{
    let prefix = match source {
        Some(source) => CompositeKey::new(index, &[owner, source])?,
        None => CompositeKey::new(index, &[owner])?,
    };

    let mut chunks = Vec::new();
    for (key, value) in store.scan_prefix(prefix.as_bytes())? {
        let (_, parts) = store.split_key(&key)?;
        let [owner, source, id]: [String; 3] = parts.try_into().map_err(|parts: Vec<String>| {
            LedgerError::Inconsistent(format!(
                "{index} key has {} parts, expected 3",
                parts.len()
            ))
        })?;
        let record: AssetRecord = serde_json::from_slice(&value)?;
        chunks.push(AssetChunk {
            owner,
            source,
            id,
            history: record.history,
            value: record.value,
        });
    }
    Ok(chunks)
}

/// Sum of the values of every chunk `owner` holds under `index`.
pub fn total_owned<S>(store: &mut S, index: Index, owner: &str) -> LedgerResult<u64>
where
    S: KeyValueStore + ?Sized,
{
    list_by_owner(store, index, owner, None)?
        .iter()
        .try_fold(0u64, |acc, chunk| acc.checked_add(chunk.value))
        .ok_or_else(|| LedgerError::Inconsistent(format!("chunk total of {owner} overflows")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryBackend, Transaction};

    fn bank() -> Vec<String> {
        vec!["bank1".to_string()]
    }

    #[test]
    fn first_id_is_zero_and_ids_increase() {
        let backend = MemoryBackend::new();
        let mut txn = Transaction::begin(&backend);
        let a = create(&mut txn, Index::CustomerAsset, "u1", "bank1", bank(), 10).unwrap();
        let b = create(&mut txn, Index::CustomerAsset, "u1", "bank1", bank(), 20).unwrap();
        let c = create(&mut txn, Index::CustomerAsset, "u1", "bank2", bank(), 5).unwrap();
        assert_eq!(a.id, "0");
        assert_eq!(b.id, "1");
        assert_eq!(c.id, "0");
    }

    #[test]
    fn ids_are_not_reused_after_remove() {
        let backend = MemoryBackend::new();
        let mut txn = Transaction::begin(&backend);
        create(&mut txn, Index::CustomerAsset, "u1", "bank1", bank(), 10).unwrap();
        let second = create(&mut txn, Index::CustomerAsset, "u1", "bank1", bank(), 20).unwrap();
        remove(&mut txn, Index::CustomerAsset, "u1", "bank1", "0").unwrap();

        let third = create(&mut txn, Index::CustomerAsset, "u1", "bank1", bank(), 30).unwrap();
        assert_eq!(third.id, "2");

        let chunks = list_by_owner(&mut txn, Index::CustomerAsset, "u1", None).unwrap();
        let values: Vec<_> = chunks.iter().map(|c| c.value).collect();
        assert_eq!(values, vec![second.value, 30]);
    }

    #[test]
    fn store_overwrites_in_place() {
        let backend = MemoryBackend::new();
        let mut txn = Transaction::begin(&backend);
        let chunk = create(&mut txn, Index::ShopAsset, "s1", "u1", bank(), 50).unwrap();
        store(&mut txn, Index::ShopAsset, "s1", "u1", &chunk.id, &chunk.history, 15).unwrap();

        let chunks = list_by_owner(&mut txn, Index::ShopAsset, "s1", Some("u1")).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].value, 15);
        assert_eq!(chunks[0].issuer(), Some("bank1"));
    }

    #[test]
    fn zero_value_is_rejected() {
        let backend = MemoryBackend::new();
        let mut txn = Transaction::begin(&backend);
        let err = create(&mut txn, Index::CustomerAsset, "u1", "bank1", bank(), 0).unwrap_err();
        assert!(matches!(err, LedgerError::NonPositiveValue));
        assert!(list_by_owner(&mut txn, Index::CustomerAsset, "u1", None).unwrap().is_empty());
    }

    #[test]
    fn listing_is_scoped_to_owner_and_source() {
        let backend = MemoryBackend::new();
        let mut txn = Transaction::begin(&backend);
        create(&mut txn, Index::CustomerAsset, "u1", "bank1", bank(), 1).unwrap();
        create(&mut txn, Index::CustomerAsset, "u1", "u2", bank(), 2).unwrap();
        create(&mut txn, Index::CustomerAsset, "u10", "bank1", bank(), 4).unwrap();
        create(&mut txn, Index::ShopAsset, "u1", "bank1", bank(), 8).unwrap();

        assert_eq!(total_owned(&mut txn, Index::CustomerAsset, "u1").unwrap(), 3);
        let from_u2 = list_by_owner(&mut txn, Index::CustomerAsset, "u1", Some("u2")).unwrap();
        assert_eq!(from_u2.len(), 1);
        assert_eq!(from_u2[0].source, "u2");
    }

    #[test]
    fn extended_history_appends_in_order() {
        let chunk = AssetChunk {
            owner: "u2".into(),
            source: "u1".into(),
            id: "0".into(),
            history: vec!["bank1".into(), "u1".into()],
            value: 5,
        };
        assert_eq!(chunk.extended_history(&["u2", "s1"]), vec!["bank1", "u1", "u2", "s1"]);
    }
}
