//! # Allowance / Escrow Engine
//!
//! A customer pre-authorizes spend at a shop ("buy"); the shop later claims
//! it ("withdraw"). Per `(shop, buyer)` pair the state machine is:
//!
//! ```text
//!            buy                 withdraw (claim == value)
//!   None ──────────► Locked ─────────────────────────────► None
//!                      │
//!                      └── withdraw (claim != value) ──► Locked (unchanged)
//! ```
//!
//! Buying debits the customer at once and parks the consumed slices under
//! the escrow index. Withdrawing re-homes every parked slice twice: once to
//! the shop (its claim) and once to the issuing bank (its obligation).

use serde::{Deserialize, Serialize};

use crate::asset;
use crate::balance::{self, Adjustment};
use crate::error::{LedgerError, LedgerResult};
use crate::events::{AllowanceEvent, WithdrawEvent};
use crate::registry::{self, Role};
use crate::storage::{CompositeKey, Index, KeyValueStore};
use crate::transfer::consume;

// ---------------------------------------------------------------------------
// Allowance
// ---------------------------------------------------------------------------

/// An outstanding escrow of `value` points from `buyer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowance {
    pub buyer: String,
    pub value: u64,
}

fn allowance_key(shop: &str, buyer: &str) -> LedgerResult<CompositeKey> {
    Ok(CompositeKey::new(Index::ShopAllowances, &[shop, buyer])?)
}

/// The allowance `buyer` holds at `shop`, if any.
pub fn allowance<S>(store: &mut S, shop: &str, buyer: &str) -> LedgerResult<Option<Allowance>>
where
    S: KeyValueStore + ?Sized,
{
    let key = allowance_key(shop, buyer)?;
    match store.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Every outstanding allowance at `shop`, in store key order.
pub fn allowances<S>(store: &mut S, shop: &str) -> LedgerResult<Vec<Allowance>>
where
    S: KeyValueStore + ?Sized,
{
    let prefix = CompositeKey::new(Index::ShopAllowances, &[shop])?;
    let mut found = Vec::new();
    for (_, bytes) in store.scan_prefix(prefix.as_bytes())? {
        found.push(serde_json::from_slice::<Allowance>(&bytes)?);
    }
    Ok(found)
}

// ---------------------------------------------------------------------------
// Buy
// ---------------------------------------------------------------------------

/// Locks `value` of `buyer`'s points at `shop`.
///
/// # Errors
///
/// - [`LedgerError::NonPositiveValue`] for a zero value.
/// - [`LedgerError::Unauthorized`] if `buyer` is not a customer.
/// - [`LedgerError::SubjectNotFound`] if `shop` is not a shop.
/// - [`LedgerError::AllowanceExists`] if the pair already has an allowance.
/// - [`LedgerError::InsufficientBalance`] if `buyer` holds less than `value`.
pub fn buy<S>(store: &mut S, buyer: &str, shop: &str, value: u64) -> LedgerResult<AllowanceEvent>
where
    S: KeyValueStore + ?Sized,
{
    if value == 0 {
        return Err(LedgerError::NonPositiveValue);
    }
    if !registry::exists(store, buyer, Role::Customer)? {
        return Err(LedgerError::Unauthorized(buyer.to_string()));
    }
    registry::require(store, shop, Role::Shop)?;

    if allowance(store, shop, buyer)?.is_some() {
        return Err(LedgerError::AllowanceExists {
            shop: shop.to_string(),
            buyer: buyer.to_string(),
        });
    }

    let available = balance::read(store, Role::Customer, buyer)?;
    if value > available {
        return Err(LedgerError::InsufficientBalance {
            subject: buyer.to_string(),
            available,
            requested: value,
        });
    }

    for slice in consume(store, Index::CustomerAsset, buyer, None, value)? {
        asset::create(
            store,
            Index::EscrowAsset,
            shop,
            buyer,
            slice.chunk.history,
            slice.taken,
        )?;
    }
    balance::adjust(store, Role::Customer, buyer, value, Adjustment::Decrease)?;

    let record = Allowance {
        buyer: buyer.to_string(),
        value,
    };
    let key = allowance_key(shop, buyer)?;
    store.put(key.as_bytes(), serde_json::to_vec(&record)?)?;

    tracing::debug!(buyer, shop, value, "allowance locked");
    Ok(AllowanceEvent {
        buyer: buyer.to_string(),
        value,
        shop: shop.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Withdraw
// ---------------------------------------------------------------------------

/// Settles the allowance `buyer` holds at `shop`.
///
/// `claim` must equal the allowance exactly. For each parked slice the shop
/// receives a chunk (history + buyer) and the issuing bank receives a
/// matching obligation chunk (history + buyer + shop) along with a balance
/// credit.
///
/// # Errors
///
/// - [`LedgerError::Unauthorized`] if `shop` is not a shop.
/// - [`LedgerError::SubjectNotFound`] if `buyer` is not a customer.
/// - [`LedgerError::AllowanceNotFound`] if there is nothing to claim.
/// - [`LedgerError::ClaimMismatch`] if `claim` differs from the allowance;
///   the allowance is left as it was.
/// - [`LedgerError::Inconsistent`] if the parked chunks do not match the
///   allowance or a chunk has no issuing bank.
pub fn withdraw<S>(store: &mut S, shop: &str, buyer: &str, claim: u64) -> LedgerResult<WithdrawEvent>
where
    S: KeyValueStore + ?Sized,
{
    if !registry::exists(store, shop, Role::Shop)? {
        return Err(LedgerError::Unauthorized(shop.to_string()));
    }
    registry::require(store, buyer, Role::Customer)?;

    let outstanding = allowance(store, shop, buyer)?.ok_or_else(|| LedgerError::AllowanceNotFound {
        shop: shop.to_string(),
        buyer: buyer.to_string(),
    })?;
    if claim != outstanding.value {
        return Err(LedgerError::ClaimMismatch {
            claimed: claim,
            outstanding: outstanding.value,
        });
    }

    for slice in consume(store, Index::EscrowAsset, shop, Some(buyer), outstanding.value)? {
        let bank = slice
            .chunk
            .issuer()
            .ok_or_else(|| {
                LedgerError::Inconsistent(format!(
                    "escrow chunk {} at '{shop}' has no history",
                    slice.chunk.id
                ))
            })?
            .to_string();

        asset::create(
            store,
            Index::ShopAsset,
            shop,
            buyer,
            slice.chunk.extended_history(&[buyer]),
            slice.taken,
        )?;
        asset::create(
            store,
            Index::BankAsset,
            &bank,
            shop,
            slice.chunk.extended_history(&[buyer, shop]),
            slice.taken,
        )?;
        balance::adjust(store, Role::Bank, &bank, slice.taken, Adjustment::Increase)?;
    }

    let leftover = asset::list_by_owner(store, Index::EscrowAsset, shop, Some(buyer))?;
    if !leftover.is_empty() {
        return Err(LedgerError::Inconsistent(format!(
            "{} escrow chunks left at '{shop}' for '{buyer}' after settlement",
            leftover.len()
        )));
    }

    balance::adjust(store, Role::Shop, shop, outstanding.value, Adjustment::Increase)?;
    let key = allowance_key(shop, buyer)?;
    store.delete(key.as_bytes())?;

    tracing::debug!(shop, buyer, value = outstanding.value, "allowance settled");
    Ok(WithdrawEvent {
        shop: shop.to_string(),
        buyer: buyer.to_string(),
        value: outstanding.value,
    })
}
