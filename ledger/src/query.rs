//! Read-only projections over ledger state.
//!
//! Every function here only reads. Run inside a transaction that is never
//! written to, commits skip validation entirely.

use serde::{Deserialize, Serialize};

use crate::asset::{self, AssetRecord};
use crate::balance;
use crate::error::{LedgerError, LedgerResult};
use crate::escrow::{self, Allowance};
use crate::events::TransferEvent;
use crate::registry::{self, Role};
use crate::storage::{CompositeKey, Index, KeyValueStore};

/// A subject name with an amount attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBalance {
    pub name: String,
    #[serde(rename = "userBalance")]
    pub user_balance: u64,
}

/// What a shop is owed, and by which bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankObligation {
    pub bank: String,
    pub value: u64,
}

fn require_caller<S>(store: &mut S, caller: &str, role: Role) -> LedgerResult<()>
where
    S: KeyValueStore + ?Sized,
{
    if registry::exists(store, caller, role)? {
        Ok(())
    } else {
        Err(LedgerError::Unauthorized(caller.to_string()))
    }
}

/// The balance of `subject` under `role`, named.
pub fn user_balance<S>(store: &mut S, role: Role, subject: &str) -> LedgerResult<UserBalance>
where
    S: KeyValueStore + ?Sized,
{
    Ok(UserBalance {
        name: subject.to_string(),
        user_balance: balance::read(store, role, subject)?,
    })
}

/// One entry per chunk `customer` holds: who it came from and how much.
pub fn customer_balance_info<S>(store: &mut S, customer: &str) -> LedgerResult<Vec<TransferEvent>>
where
    S: KeyValueStore + ?Sized,
{
    require_caller(store, customer, Role::Customer)?;
    Ok(asset::list_by_owner(store, Index::CustomerAsset, customer, None)?
        .into_iter()
        .map(|chunk| TransferEvent {
            sender: chunk.source,
            receiver: customer.to_string(),
            value: chunk.value,
        })
        .collect())
}

pub fn customer_names<S>(store: &mut S) -> LedgerResult<Vec<String>>
where
    S: KeyValueStore + ?Sized,
{
    registry::list(store, Role::Customer)
}

/// Customers `bank` has gifted to, with the cumulative amount gifted.
pub fn bank_customers<S>(store: &mut S, bank: &str) -> LedgerResult<Vec<UserBalance>>
where
    S: KeyValueStore + ?Sized,
{
    require_caller(store, bank, Role::Bank)?;
    let prefix = CompositeKey::new(Index::BankCustomers, &[bank])?;
    let mut customers = Vec::new();
    for (key, value) in store.scan_prefix(prefix.as_bytes())? {
        let (_, parts) = store.split_key(&key)?;
        let name = parts.get(1).cloned().ok_or_else(|| {
            LedgerError::Inconsistent(format!("{} key without a customer", Index::BankCustomers))
        })?;
        customers.push(UserBalance {
            name,
            user_balance: balance::decode(&value)?,
        });
    }
    Ok(customers)
}

/// Settled claims `bank` owes to shops.
pub fn shop_claims<S>(store: &mut S, bank: &str) -> LedgerResult<Vec<AssetRecord>>
where
    S: KeyValueStore + ?Sized,
{
    require_caller(store, bank, Role::Bank)?;
    Ok(asset::list_by_owner(store, Index::BankAsset, bank, None)?
        .into_iter()
        .map(|chunk| AssetRecord {
            history: chunk.history,
            value: chunk.value,
        })
        .collect())
}

/// The issuing bank of every chunk `shop` holds.
pub fn bank_obligations<S>(store: &mut S, shop: &str) -> LedgerResult<Vec<BankObligation>>
where
    S: KeyValueStore + ?Sized,
{
    require_caller(store, shop, Role::Shop)?;
    let mut obligations = Vec::new();
    for chunk in asset::list_by_owner(store, Index::ShopAsset, shop, None)? {
        let bank = chunk.issuer().ok_or_else(|| {
            LedgerError::Inconsistent(format!("shop chunk {} has no history", chunk.id))
        })?;
        obligations.push(BankObligation {
            bank: bank.to_string(),
            value: chunk.value,
        });
    }
    Ok(obligations)
}

pub fn shop_allowances<S>(store: &mut S, shop: &str) -> LedgerResult<Vec<Allowance>>
where
    S: KeyValueStore + ?Sized,
{
    require_caller(store, shop, Role::Shop)?;
    escrow::allowances(store, shop)
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// One account whose counter disagrees with its chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    /// `customer`, `bank`, `shop`, or `allowance`.
    pub scope: String,
    pub subject: String,
    pub recorded: u64,
    pub chunks: u64,
}

/// Whole-ledger totals and every per-account disagreement found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub total_gifted: u64,
    pub customer_balances: u64,
    pub outstanding_allowances: u64,
    pub shop_balances: u64,
    pub bank_balances: u64,
    pub mismatches: Vec<Mismatch>,
}

impl AuditReport {
    /// Value issued equals value held by customers, in escrow, and at shops.
    pub fn is_conserved(&self) -> bool {
        let held = self
            .customer_balances
            .checked_add(self.outstanding_allowances)
            .and_then(|v| v.checked_add(self.shop_balances));
        held == Some(self.total_gifted) && self.bank_balances == self.shop_balances
    }

    /// Conserved and no account disagrees with its chunks.
    pub fn is_consistent(&self) -> bool {
        self.is_conserved() && self.mismatches.is_empty()
    }
}

fn sum(total: u64, value: u64) -> LedgerResult<u64> {
    total
        .checked_add(value)
        .ok_or_else(|| LedgerError::Inconsistent("audit total overflows".into()))
}

/// Compares every balance counter against its chunks and totals value
/// across the ledger.
pub fn audit<S>(store: &mut S) -> LedgerResult<AuditReport>
where
    S: KeyValueStore + ?Sized,
{
    let mut report = AuditReport::default();

    for role in Role::ALL {
        for subject in registry::list(store, role)? {
            let recorded = balance::read(store, role, &subject)?;
            let chunks = asset::total_owned(store, role.asset_index(), &subject)?;
            match role {
                Role::Customer => report.customer_balances = sum(report.customer_balances, recorded)?,
                Role::Bank => report.bank_balances = sum(report.bank_balances, recorded)?,
                Role::Shop => report.shop_balances = sum(report.shop_balances, recorded)?,
            }
            if recorded != chunks {
                report.mismatches.push(Mismatch {
                    scope: role.to_string(),
                    subject: subject.clone(),
                    recorded,
                    chunks,
                });
            }

            if role == Role::Shop {
                for allowance in escrow::allowances(store, &subject)? {
                    report.outstanding_allowances =
                        sum(report.outstanding_allowances, allowance.value)?;
                    let parked = asset::list_by_owner(
                        store,
                        Index::EscrowAsset,
                        &subject,
                        Some(&allowance.buyer),
                    )?
                    .iter()
                    .try_fold(0u64, |acc, chunk| acc.checked_add(chunk.value))
                    .ok_or_else(|| LedgerError::Inconsistent("escrow total overflows".into()))?;
                    if parked != allowance.value {
                        report.mismatches.push(Mismatch {
                            scope: "allowance".into(),
                            subject: format!("{subject}/{}", allowance.buyer),
                            recorded: allowance.value,
                            chunks: parked,
                        });
                    }
                }
            }
        }
    }

    let prefix = CompositeKey::new(Index::BankCustomers, &[])?;
    for (_, value) in store.scan_prefix(prefix.as_bytes())? {
        report.total_gifted = sum(report.total_gifted, balance::decode(&value)?)?;
    }

    Ok(report)
}
