//! # Balance Counters
//!
//! One little-endian `u64` per `(role, subject)`. The counter is the fast
//! path for "how much does X hold"; the chunk set under the matching asset
//! index is the provenance-carrying representation of the same value, and
//! every operation moves both together.

use crate::error::{LedgerError, LedgerResult};
use crate::registry::Role;
use crate::storage::{CompositeKey, KeyValueStore};

/// Direction of a balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Increase,
    Decrease,
}

/// Key of the balance record for `subject` under `role`.
pub fn balance_key(role: Role, subject: &str) -> LedgerResult<CompositeKey> {
    Ok(CompositeKey::new(role.balance_index(), &[subject])?)
}

pub fn encode(value: u64) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn decode(bytes: &[u8]) -> LedgerResult<u64> {
    <[u8; 8]>::try_from(bytes)
        .map(u64::from_le_bytes)
        .map_err(|_| {
            LedgerError::Inconsistent(format!(
                "balance record has {} bytes, expected 8",
                bytes.len()
            ))
        })
}

/// Writes a zero balance. Callers check for an existing record first.
pub fn initialize<S>(store: &mut S, role: Role, subject: &str) -> LedgerResult<()>
where
    S: KeyValueStore + ?Sized,
{
    let key = balance_key(role, subject)?;
    store.put(key.as_bytes(), encode(0))?;
    Ok(())
}

/// Current balance of `subject` under `role`.
///
/// # Errors
///
/// [`LedgerError::SubjectNotFound`] when no record exists.
pub fn read<S>(store: &mut S, role: Role, subject: &str) -> LedgerResult<u64>
where
    S: KeyValueStore + ?Sized,
{
    let key = balance_key(role, subject)?;
    match store.get(key.as_bytes())? {
        Some(bytes) => decode(&bytes),
        None => Err(LedgerError::SubjectNotFound {
            role,
            subject: subject.to_string(),
        }),
    }
}

/// Applies `delta` to the balance of `subject` and returns the new value.
///
/// # Errors
///
/// - [`LedgerError::SubjectNotFound`] if the subject has no record.
/// - [`LedgerError::InsufficientBalance`] if a decrease exceeds the balance.
/// - [`LedgerError::Overflow`] if an increase would wrap.
pub fn adjust<S>(
    store: &mut S,
    role: Role,
    subject: &str,
    delta: u64,
    direction: Adjustment,
) -> LedgerResult<u64>
where
    S: KeyValueStore + ?Sized,
{
    let current = read(store, role, subject)?;
    let updated = match direction {
        Adjustment::Increase => current.checked_add(delta).ok_or_else(|| LedgerError::Overflow {
            subject: subject.to_string(),
            current,
            credit: delta,
        })?,
        Adjustment::Decrease => {
            if delta > current {
                return Err(LedgerError::InsufficientBalance {
                    subject: subject.to_string(),
                    available: current,
                    requested: delta,
                });
            }
            current - delta
        }
    };

    let key = balance_key(role, subject)?;
    store.put(key.as_bytes(), encode(updated))?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;
    use crate::storage::{MemoryBackend, Transaction};

    #[test]
    fn increase_and_decrease() {
        let backend = MemoryBackend::new();
        let mut txn = Transaction::begin(&backend);
        registry::create(&mut txn, "u1", Role::Customer).unwrap();

        assert_eq!(adjust(&mut txn, Role::Customer, "u1", 100, Adjustment::Increase).unwrap(), 100);
        assert_eq!(adjust(&mut txn, Role::Customer, "u1", 30, Adjustment::Decrease).unwrap(), 70);
        assert_eq!(read(&mut txn, Role::Customer, "u1").unwrap(), 70);
    }

    #[test]
    fn decrease_to_exactly_zero() {
        let backend = MemoryBackend::new();
        let mut txn = Transaction::begin(&backend);
        registry::create(&mut txn, "s1", Role::Shop).unwrap();
        adjust(&mut txn, Role::Shop, "s1", 5, Adjustment::Increase).unwrap();
        assert_eq!(adjust(&mut txn, Role::Shop, "s1", 5, Adjustment::Decrease).unwrap(), 0);
    }

    #[test]
    fn overdraw_is_rejected_and_balance_unchanged() {
        let backend = MemoryBackend::new();
        let mut txn = Transaction::begin(&backend);
        registry::create(&mut txn, "u1", Role::Customer).unwrap();
        adjust(&mut txn, Role::Customer, "u1", 10, Adjustment::Increase).unwrap();

        let err = adjust(&mut txn, Role::Customer, "u1", 11, Adjustment::Decrease).unwrap_err();
        match err {
            LedgerError::InsufficientBalance { available, requested, .. } => {
                assert_eq!(available, 10);
                assert_eq!(requested, 11);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(read(&mut txn, Role::Customer, "u1").unwrap(), 10);
    }

    #[test]
    fn overflow_is_rejected() {
        let backend = MemoryBackend::new();
        let mut txn = Transaction::begin(&backend);
        registry::create(&mut txn, "u1", Role::Customer).unwrap();
        adjust(&mut txn, Role::Customer, "u1", u64::MAX, Adjustment::Increase).unwrap();
        let err = adjust(&mut txn, Role::Customer, "u1", 1, Adjustment::Increase).unwrap_err();
        assert!(matches!(err, LedgerError::Overflow { .. }));
    }

    #[test]
    fn unknown_subject_is_not_found() {
        let backend = MemoryBackend::new();
        let mut txn = Transaction::begin(&backend);
        let err = read(&mut txn, Role::Bank, "nobody").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn short_record_is_inconsistent() {
        assert!(matches!(decode(&[1, 2, 3]), Err(LedgerError::Inconsistent(_))));
        assert_eq!(decode(&encode(42)).unwrap(), 42);
    }
}
