//! Events produced by successful ledger operations.
//!
//! The engine returns events to its caller rather than publishing them; the
//! dispatcher attaches them to the invocation response and the node fans
//! them out to WebSocket subscribers after the commit lands.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub sender: String,
    pub receiver: String,
    pub value: u64,
}

/// Emitted by a buy: `buyer` locked `value` at `shop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceEvent {
    pub buyer: String,
    pub value: u64,
    pub shop: String,
}

/// Emitted when a shop settles an allowance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawEvent {
    pub shop: String,
    pub buyer: String,
    pub value: u64,
}

/// Emitted when a bank issues points to a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftEvent {
    pub bank: String,
    pub receiver: String,
    pub value: u64,
}

/// Any event the ledger can emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum LedgerEvent {
    Transfer(TransferEvent),
    Buy(AllowanceEvent),
    Withdraw(WithdrawEvent),
    Gift(GiftEvent),
}

impl LedgerEvent {
    /// The event name as seen by subscribers.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::Transfer(_) => "Transfer",
            LedgerEvent::Buy(_) => "Buy",
            LedgerEvent::Withdraw(_) => "Withdraw",
            LedgerEvent::Gift(_) => "Gift",
        }
    }
}

impl From<TransferEvent> for LedgerEvent {
    fn from(event: TransferEvent) -> Self {
        LedgerEvent::Transfer(event)
    }
}

impl From<AllowanceEvent> for LedgerEvent {
    fn from(event: AllowanceEvent) -> Self {
        LedgerEvent::Buy(event)
    }
}

impl From<WithdrawEvent> for LedgerEvent {
    fn from(event: WithdrawEvent) -> Self {
        LedgerEvent::Withdraw(event)
    }
}

impl From<GiftEvent> for LedgerEvent {
    fn from(event: GiftEvent) -> Self {
        LedgerEvent::Gift(event)
    }
}
