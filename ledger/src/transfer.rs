//! # Transfer Engine
//!
//! Moves value between subjects by consuming chunks greedily in store order
//! and re-homing each consumed slice under the receiver with one more
//! provenance entry. The balance counters move by exactly the same amount.
//!
//! ## Selection
//!
//! ```text
//! remaining = amount
//! for chunk in owner's chunks (store order):
//!     v <= remaining  → delete chunk,           take v
//!     v >  remaining  → rewrite chunk as v - r, take r
//!     remaining == 0  → stop
//! remaining > 0       → LedgerInconsistent
//! ```
//!
//! No sorting and no attempt at minimal fragmentation; any selection is
//! valid as long as the taken slices sum to `amount`.

use crate::asset::{self, AssetChunk};
use crate::balance::{self, Adjustment};
use crate::error::{LedgerError, LedgerResult};
use crate::events::{GiftEvent, TransferEvent};
use crate::registry::{self, Role};
use crate::storage::{CompositeKey, Index, KeyValueStore};

/// A slice taken from one chunk by [`consume`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumed {
    /// The chunk as it was before it was consumed.
    pub chunk: AssetChunk,
    /// How much of `chunk.value` was taken.
    pub taken: u64,
}

/// Takes `amount` out of the chunks `owner` holds under `index`.
///
/// Fully consumed chunks are deleted and a partially consumed chunk is
/// rewritten with its remainder. The caller decides where the returned
/// slices go.
///
/// # Errors
///
/// [`LedgerError::Inconsistent`] if the chunks do not cover `amount`. The
/// caller has already checked the balance counter, so this means the two
/// representations disagree.
pub fn consume<S>(
    store: &mut S,
    index: Index,
    owner: &str,
    source: Option<&str>,
    amount: u64,
) -> LedgerResult<Vec<Consumed>>
where
    S: KeyValueStore + ?Sized,
{
    let mut remaining = amount;
    let mut slices = Vec::new();

    for chunk in asset::list_by_owner(store, index, owner, source)? {
        if remaining == 0 {
            break;
        }
        let taken = if chunk.value <= remaining {
            asset::remove(store, index, &chunk.owner, &chunk.source, &chunk.id)?;
            chunk.value
        } else {
            asset::store(
                store,
                index,
                &chunk.owner,
                &chunk.source,
                &chunk.id,
                &chunk.history,
                chunk.value - remaining,
            )?;
            remaining
        };
        tracing::debug!(
            %index,
            owner,
            source = %chunk.source,
            id = %chunk.id,
            chunk_value = chunk.value,
            taken,
            "chunk consumed"
        );
        remaining -= taken;
        slices.push(Consumed { chunk, taken });
    }

    if remaining > 0 {
        return Err(LedgerError::Inconsistent(format!(
            "chunks of '{owner}' under {index} are short by {remaining} of {amount}"
        )));
    }
    Ok(slices)
}

/// Moves `amount` from customer `from` to customer `to`.
///
/// # Errors
///
/// - [`LedgerError::NonPositiveValue`] for a zero amount.
/// - [`LedgerError::SelfTransfer`] when `from == to`.
/// - [`LedgerError::Unauthorized`] if `from` is not a customer.
/// - [`LedgerError::SubjectNotFound`] if `to` is not a customer.
/// - [`LedgerError::InsufficientBalance`] if `from` holds less than `amount`.
pub fn transfer<S>(store: &mut S, from: &str, to: &str, amount: u64) -> LedgerResult<TransferEvent>
where
    S: KeyValueStore + ?Sized,
{
    if amount == 0 {
        return Err(LedgerError::NonPositiveValue);
    }
    if from == to {
        return Err(LedgerError::SelfTransfer);
    }
    if !registry::exists(store, from, Role::Customer)? {
        return Err(LedgerError::Unauthorized(from.to_string()));
    }
    registry::require(store, to, Role::Customer)?;

    let available = balance::read(store, Role::Customer, from)?;
    if amount > available {
        return Err(LedgerError::InsufficientBalance {
            subject: from.to_string(),
            available,
            requested: amount,
        });
    }

    for slice in consume(store, Index::CustomerAsset, from, None, amount)? {
        asset::create(
            store,
            Index::CustomerAsset,
            to,
            from,
            slice.chunk.extended_history(&[from]),
            slice.taken,
        )?;
    }

    balance::adjust(store, Role::Customer, from, amount, Adjustment::Decrease)?;
    balance::adjust(store, Role::Customer, to, amount, Adjustment::Increase)?;

    tracing::debug!(from, to, amount, "transfer applied");
    Ok(TransferEvent {
        sender: from.to_string(),
        receiver: to.to_string(),
        value: amount,
    })
}

// ---------------------------------------------------------------------------
// Gift
// ---------------------------------------------------------------------------

/// Key of the running total `bank` has gifted to `customer`.
pub fn bank_customer_key(bank: &str, customer: &str) -> LedgerResult<CompositeKey> {
    Ok(CompositeKey::new(Index::BankCustomers, &[bank, customer])?)
}

/// Issues `value` new points from `bank` to `receiver`.
///
/// The new chunk's history starts with the bank, which is how withdrawals
/// later find the bank that owes the shop. The bank's own balance does not
/// move; it only grows when shops settle claims.
pub fn gift<S>(store: &mut S, bank: &str, receiver: &str, value: u64) -> LedgerResult<GiftEvent>
where
    S: KeyValueStore + ?Sized,
{
    if value == 0 {
        return Err(LedgerError::NonPositiveValue);
    }
    if !registry::exists(store, bank, Role::Bank)? {
        return Err(LedgerError::Unauthorized(bank.to_string()));
    }
    registry::require(store, receiver, Role::Customer)?;

    asset::create(
        store,
        Index::CustomerAsset,
        receiver,
        bank,
        vec![bank.to_string()],
        value,
    )?;

    let key = bank_customer_key(bank, receiver)?;
    let gifted = match store.get(key.as_bytes())? {
        Some(bytes) => balance::decode(&bytes)?,
        None => 0,
    };
    let gifted = gifted.checked_add(value).ok_or_else(|| LedgerError::Overflow {
        subject: receiver.to_string(),
        current: gifted,
        credit: value,
    })?;
    store.put(key.as_bytes(), balance::encode(gifted))?;

    balance::adjust(store, Role::Customer, receiver, value, Adjustment::Increase)?;

    tracing::debug!(bank, receiver, value, "gift applied");
    Ok(GiftEvent {
        bank: bank.to_string(),
        receiver: receiver.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::{MemoryBackend, Transaction};

    fn setup(txn: &mut Transaction<'_>) {
        registry::create(txn, "bank1", Role::Bank).unwrap();
        registry::create(txn, "u1", Role::Customer).unwrap();
        registry::create(txn, "u2", Role::Customer).unwrap();
    }

    #[test]
    fn gift_creates_single_chunk_from_bank() {
        let backend = MemoryBackend::new();
        let mut txn = Transaction::begin(&backend);
        setup(&mut txn);

        let event = gift(&mut txn, "bank1", "u1", 1000).unwrap();
        assert_eq!(event.value, 1000);
        assert_eq!(balance::read(&mut txn, Role::Customer, "u1").unwrap(), 1000);
        assert_eq!(balance::read(&mut txn, Role::Bank, "bank1").unwrap(), 0);

        let chunks = asset::list_by_owner(&mut txn, Index::CustomerAsset, "u1", None).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].history, vec!["bank1"]);
        assert_eq!(chunks[0].source, "bank1");
        assert_eq!(chunks[0].id, "0");
    }

    #[test]
    fn gift_requires_a_bank_caller() {
        let backend = MemoryBackend::new();
        let mut txn = Transaction::begin(&backend);
        setup(&mut txn);
        let err = gift(&mut txn, "u1", "u2", 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        let err = gift(&mut txn, "bank1", "ghost", 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn partial_transfer_splits_a_chunk() {
        let backend = MemoryBackend::new();
        let mut txn = Transaction::begin(&backend);
        setup(&mut txn);
        gift(&mut txn, "bank1", "u1", 1000).unwrap();

        transfer(&mut txn, "u1", "u2", 500).unwrap();

        let left = asset::list_by_owner(&mut txn, Index::CustomerAsset, "u1", None).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].value, 500);
        assert_eq!(left[0].history, vec!["bank1"]);

        let moved = asset::list_by_owner(&mut txn, Index::CustomerAsset, "u2", None).unwrap();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].value, 500);
        assert_eq!(moved[0].source, "u1");
        assert_eq!(moved[0].history, vec!["bank1", "u1"]);
    }

    #[test]
    fn transfer_spanning_chunks_consumes_in_order() {
        let backend = MemoryBackend::new();
        let mut txn = Transaction::begin(&backend);
        setup(&mut txn);
        gift(&mut txn, "bank1", "u1", 30).unwrap();
        gift(&mut txn, "bank1", "u1", 50).unwrap();

        transfer(&mut txn, "u1", "u2", 60).unwrap();

        let left = asset::list_by_owner(&mut txn, Index::CustomerAsset, "u1", None).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!((left[0].id.as_str(), left[0].value), ("1", 20));

        let moved: Vec<_> = asset::list_by_owner(&mut txn, Index::CustomerAsset, "u2", None)
            .unwrap()
            .into_iter()
            .map(|c| c.value)
            .collect();
        assert_eq!(moved, vec![30, 30]);
        assert_eq!(balance::read(&mut txn, Role::Customer, "u2").unwrap(), 60);
    }

    #[test]
    fn transfer_preconditions() {
        let backend = MemoryBackend::new();
        let mut txn = Transaction::begin(&backend);
        setup(&mut txn);
        gift(&mut txn, "bank1", "u1", 10).unwrap();

        assert!(matches!(transfer(&mut txn, "u1", "u2", 0), Err(LedgerError::NonPositiveValue)));
        assert!(matches!(transfer(&mut txn, "u1", "u1", 5), Err(LedgerError::SelfTransfer)));
        assert_eq!(transfer(&mut txn, "bank1", "u2", 5).unwrap_err().kind(), ErrorKind::Unauthorized);
        assert_eq!(transfer(&mut txn, "u1", "ghost", 5).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            transfer(&mut txn, "u1", "u2", 11).unwrap_err().kind(),
            ErrorKind::InsufficientBalance
        );
        assert_eq!(balance::read(&mut txn, Role::Customer, "u1").unwrap(), 10);
    }

    #[test]
    fn missing_chunks_are_inconsistent() {
        let backend = MemoryBackend::new();
        let mut txn = Transaction::begin(&backend);
        setup(&mut txn);
        balance::adjust(&mut txn, Role::Customer, "u1", 10, Adjustment::Increase).unwrap();

        let err = transfer(&mut txn, "u1", "u2", 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LedgerInconsistent);
    }

    #[test]
    fn bank_customer_total_accumulates() {
        let backend = MemoryBackend::new();
        let mut txn = Transaction::begin(&backend);
        setup(&mut txn);
        gift(&mut txn, "bank1", "u1", 10).unwrap();
        gift(&mut txn, "bank1", "u1", 15).unwrap();

        let key = bank_customer_key("bank1", "u1").unwrap();
        let total = balance::decode(&txn.get(key.as_bytes()).unwrap().unwrap()).unwrap();
        assert_eq!(total, 25);
    }
}
