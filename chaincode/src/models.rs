//! Wire models for invocation arguments and payloads.

use serde::{Deserialize, Serialize};

use loyalty_ledger::Role;

pub use loyalty_ledger::asset::AssetRecord;
pub use loyalty_ledger::escrow::Allowance;
pub use loyalty_ledger::events::TransferEvent;
pub use loyalty_ledger::query::{AuditReport, BankObligation, UserBalance};

/// One entry of a `createActors` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    pub role: Role,
}

/// Argument of `transfer`, `buy`, and `provideAsset`. For `buy` the
/// receiver is the shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub receiver: String,
    pub value: u64,
}

/// Argument of `withdraw`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub buyer: String,
    pub value: u64,
}
