//! # Role Registry
//!
//! Tracks which subjects are customers, banks, and shops. A subject is
//! registered under a role by writing a zero balance into that role's
//! index; existence is simply "a balance record is present".
//!
//! The same subject id may be registered under several roles. Each
//! `(role, subject)` pair is an independent account.

use serde::{Deserialize, Serialize};

use crate::balance;
use crate::config::MAX_SUBJECT_LEN;
use crate::error::{LedgerError, LedgerResult};
use crate::storage::{CompositeKey, Index, KeyValueStore};

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// The part a subject plays in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Holds points, transfers them, spends them at shops.
    Customer,
    /// Issues points to customers and settles shop claims.
    Bank,
    /// Accepts points from customers and claims them.
    Shop,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Customer, Role::Bank, Role::Shop];

    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Bank => "bank",
            Role::Shop => "shop",
        }
    }

    /// Index holding this role's balance counters.
    pub const fn balance_index(self) -> Index {
        match self {
            Role::Customer => Index::Customer,
            Role::Bank => Index::Bank,
            Role::Shop => Index::Shop,
        }
    }

    /// Index holding chunks owned by subjects of this role.
    pub const fn asset_index(self) -> Index {
        match self {
            Role::Customer => Index::CustomerAsset,
            Role::Bank => Index::BankAsset,
            Role::Shop => Index::ShopAsset,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "bank" => Ok(Role::Bank),
            "shop" => Ok(Role::Shop),
            other => Err(LedgerError::InvalidArgument(format!(
                "unknown role '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Checks that `subject` can be used as a key component.
pub fn validate_subject(subject: &str) -> LedgerResult<()> {
    if subject.is_empty() {
        return Err(LedgerError::InvalidArgument("subject id is empty".into()));
    }
    if subject.len() > MAX_SUBJECT_LEN {
        return Err(LedgerError::InvalidArgument(format!(
            "subject id longer than {MAX_SUBJECT_LEN} bytes"
        )));
    }
    if subject.contains('\0') {
        return Err(LedgerError::InvalidArgument(
            "subject id contains a NUL byte".into(),
        ));
    }
    Ok(())
}

/// `true` iff `subject` has a balance record under `role`.
pub fn exists<S>(store: &mut S, subject: &str, role: Role) -> LedgerResult<bool>
where
    S: KeyValueStore + ?Sized,
{
    let key = balance::balance_key(role, subject)?;
    Ok(store.get(key.as_bytes())?.is_some())
}

/// Fails with [`LedgerError::SubjectNotFound`] unless `subject` is
/// registered under `role`.
pub fn require<S>(store: &mut S, subject: &str, role: Role) -> LedgerResult<()>
where
    S: KeyValueStore + ?Sized,
{
    if exists(store, subject, role)? {
        Ok(())
    } else {
        Err(LedgerError::SubjectNotFound {
            role,
            subject: subject.to_string(),
        })
    }
}

/// Registers `subject` under `role` with a zero balance.
///
/// # Errors
///
/// Returns [`LedgerError::SubjectExists`] if the pair is already
/// registered; an existing balance is never reset.
pub fn create<S>(store: &mut S, subject: &str, role: Role) -> LedgerResult<()>
where
    S: KeyValueStore + ?Sized,
{
    validate_subject(subject)?;
    if exists(store, subject, role)? {
        return Err(LedgerError::SubjectExists {
            role,
            subject: subject.to_string(),
        });
    }
    balance::initialize(store, role, subject)?;
    tracing::debug!(%role, subject, "subject registered");
    Ok(())
}

/// Every subject registered under `role`, in store key order.
pub fn list<S>(store: &mut S, role: Role) -> LedgerResult<Vec<String>>
where
    S: KeyValueStore + ?Sized,
{
    let prefix = CompositeKey::new(role.balance_index(), &[])?;
    let mut names = Vec::new();
    for (key, _) in store.scan_prefix(prefix.as_bytes())? {
        let (_, parts) = store.split_key(&key)?;
        let name = parts.into_iter().next().ok_or_else(|| {
            LedgerError::Inconsistent(format!("{role} key without a subject"))
        })?;
        names.push(name);
    }
    Ok(names)
}
