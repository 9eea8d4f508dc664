//! # Invocation Dispatcher
//!
//! One invocation is one ledger transaction:
//!
//! ```text
//! credential ──► IdentityResolver ──► caller
//! function   ──► Function::from_str
//! args       ──► JSON request model
//!                      │
//!                      ▼
//!          Transaction::begin ──► engine ──► commit ──► Response
//!                                   │
//!                                   └── error ──► reconcile ──► dropped, nothing applied
//! ```
//!
//! No retries happen here. A [`ErrorKind::Conflict`] is returned to the
//! caller, which may submit the whole invocation again. That includes engine
//! rejections computed from reads a concurrent commit has overwritten.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use loyalty_ledger::config::MAX_ACTORS_PER_INVOCATION;
use loyalty_ledger::storage::{Backend, Transaction};
use loyalty_ledger::{
    escrow, query, registry, transfer, ErrorKind, LedgerError, LedgerEvent, LedgerResult, Role,
};

use crate::identity::IdentityResolver;
use crate::models::{Actor, TransferRequest, WithdrawRequest};
use crate::settings::Settings;

// ---------------------------------------------------------------------------
// Function
// ---------------------------------------------------------------------------

/// Every function the dispatcher routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Info,
    CreateActors,
    Transfer,
    Buy,
    Withdraw,
    ProvideAsset,
    CustomerBalance,
    BankBalance,
    ShopBalance,
    CustomerBalanceInfo,
    GetCustomersNames,
    GetMyCustomerList,
    GetShopClaims,
    GetBankObligations,
    GetShopAllowances,
    AuditLedger,
}

impl Function {
    pub const ALL: [Function; 16] = [
        Function::Info,
        Function::CreateActors,
        Function::Transfer,
        Function::Buy,
        Function::Withdraw,
        Function::ProvideAsset,
        Function::CustomerBalance,
        Function::BankBalance,
        Function::ShopBalance,
        Function::CustomerBalanceInfo,
        Function::GetCustomersNames,
        Function::GetMyCustomerList,
        Function::GetShopClaims,
        Function::GetBankObligations,
        Function::GetShopAllowances,
        Function::AuditLedger,
    ];

    /// The name callers invoke this function by.
    pub const fn name(self) -> &'static str {
        match self {
            Function::Info => "info",
            Function::CreateActors => "createActors",
            Function::Transfer => "transfer",
            Function::Buy => "buy",
            Function::Withdraw => "withdraw",
            Function::ProvideAsset => "provideAsset",
            Function::CustomerBalance => "customerBalance",
            Function::BankBalance => "bankBalance",
            Function::ShopBalance => "shopBalance",
            Function::CustomerBalanceInfo => "customerBalanceInfo",
            Function::GetCustomersNames => "getCustomersNames",
            Function::GetMyCustomerList => "getMyCustomerList",
            Function::GetShopClaims => "getShopClaims",
            Function::GetBankObligations => "getBankObligations",
            Function::GetShopAllowances => "getShopAllowances",
            Function::AuditLedger => "auditLedger",
        }
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Function {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Function::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| LedgerError::InvalidArgument(format!("incorrect function name: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// The result of a committed invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub tx_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub function: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<LedgerEvent>,
}

/// What a handler hands back before commit.
#[derive(Debug, Default)]
struct Outcome {
    payload: Option<Value>,
    events: Vec<LedgerEvent>,
}

impl Outcome {
    fn payload<T: Serialize>(value: &T) -> LedgerResult<Self> {
        Ok(Self {
            payload: Some(serde_json::to_value(value)?),
            events: Vec::new(),
        })
    }

    fn event(event: impl Into<LedgerEvent>) -> Self {
        Self {
            payload: None,
            events: vec![event.into()],
        }
    }
}

// ---------------------------------------------------------------------------
// Chaincode
// ---------------------------------------------------------------------------

/// The invocation surface of the ledger.
///
/// Cheap to clone; clones share the backend and the resolver.
#[derive(Clone)]
pub struct Chaincode {
    backend: Arc<dyn Backend>,
    identity: Arc<dyn IdentityResolver>,
}

impl Chaincode {
    pub fn new(backend: Arc<dyn Backend>, identity: Arc<dyn IdentityResolver>) -> Self {
        Self { backend, identity }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Stores the deployment settings. Re-running init replaces them.
    pub fn init(&self, settings: &Settings) -> LedgerResult<()> {
        let mut txn = Transaction::begin(self.backend.as_ref());
        settings.save(&mut txn)?;
        txn.commit()?;
        tracing::info!(admin = %settings.admin, "ledger initialized");
        Ok(())
    }

    /// The current settings, if the ledger has been initialized.
    pub fn settings(&self) -> LedgerResult<Option<Settings>> {
        let mut txn = Transaction::begin(self.backend.as_ref());
        Settings::load(&mut txn)
    }

    /// Runs `function` for the subject behind `credential`.
    ///
    /// # Errors
    ///
    /// Any [`LedgerError`]; use [`LedgerError::kind`] to classify it. On
    /// error nothing is written.
    pub fn invoke(&self, credential: &str, function: &str, args: &[String]) -> LedgerResult<Response> {
        let started = Instant::now();
        let function: Function = function.parse()?;
        let caller = self.identity.resolve(credential)?;
        let tx_id = Uuid::new_v4();

        let mut txn = Transaction::begin(self.backend.as_ref());
        let outcome = match dispatch(&mut txn, &caller, function, args) {
            Ok(outcome) => outcome,
            Err(err) => {
                let err = txn.reconcile(err);
                tracing::warn!(
                    %tx_id,
                    %function,
                    caller = %caller,
                    kind = %err.kind(),
                    error = %err,
                    "invocation rejected"
                );
                return Err(err);
            }
        };

        let writes = txn.commit().map_err(|err| {
            let err = LedgerError::from(err);
            if err.kind() == ErrorKind::Conflict {
                tracing::warn!(%tx_id, %function, caller = %caller, error = %err, "commit conflict");
            }
            err
        })?;

        tracing::info!(
            %tx_id,
            %function,
            caller = %caller,
            writes,
            events = outcome.events.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "invocation committed"
        );

        Ok(Response {
            tx_id,
            timestamp: Utc::now(),
            function: function.name().to_string(),
            payload: outcome.payload,
            events: outcome.events,
        })
    }
}

impl std::fmt::Debug for Chaincode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chaincode")
            .field("backend", &self.backend.kind())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn single_arg<T: DeserializeOwned>(function: Function, args: &[String]) -> LedgerResult<T> {
    match args {
        [arg] => serde_json::from_str(arg).map_err(|e| {
            LedgerError::InvalidArgument(format!("error parsing {function} argument: {e}"))
        }),
        _ => Err(LedgerError::InvalidArgument(format!(
            "{function} expected 1 argument, got {}",
            args.len()
        ))),
    }
}

fn require_admin(txn: &mut Transaction<'_>, caller: &str) -> LedgerResult<()> {
    match Settings::load(txn)? {
        Some(settings) if settings.admin == caller => Ok(()),
        _ => Err(LedgerError::Unauthorized(caller.to_string())),
    }
}

fn balance_of(txn: &mut Transaction<'_>, role: Role, caller: &str) -> LedgerResult<Outcome> {
    Outcome::payload(&query::user_balance(txn, role, caller)?)
}

fn dispatch(
    txn: &mut Transaction<'_>,
    caller: &str,
    function: Function,
    args: &[String],
) -> LedgerResult<Outcome> {
    match function {
        Function::Info => Ok(Outcome {
            payload: Settings::load(txn)?
                .map(|s| serde_json::to_value(s))
                .transpose()?,
            events: Vec::new(),
        }),

        Function::CreateActors => {
            let actors: Vec<Actor> = single_arg(function, args)?;
            require_admin(txn, caller)?;
            if actors.len() > MAX_ACTORS_PER_INVOCATION {
                return Err(LedgerError::InvalidArgument(format!(
                    "at most {MAX_ACTORS_PER_INVOCATION} actors per call"
                )));
            }
            for actor in &actors {
                registry::create(txn, &actor.name, actor.role)?;
            }
            Outcome::payload(&actors)
        }

        Function::Transfer => {
            let request: TransferRequest = single_arg(function, args)?;
            let event = transfer::transfer(txn, caller, &request.receiver, request.value)?;
            Ok(Outcome {
                payload: Some(serde_json::to_value(&event)?),
                events: vec![event.into()],
            })
        }

        Function::Buy => {
            let request: TransferRequest = single_arg(function, args)?;
            Ok(Outcome::event(escrow::buy(txn, caller, &request.receiver, request.value)?))
        }

        Function::Withdraw => {
            let request: WithdrawRequest = single_arg(function, args)?;
            Ok(Outcome::event(escrow::withdraw(txn, caller, &request.buyer, request.value)?))
        }

        Function::ProvideAsset => {
            let request: TransferRequest = single_arg(function, args)?;
            let event = transfer::gift(txn, caller, &request.receiver, request.value)?;
            Ok(Outcome {
                payload: Some(Value::String("Gift is committed".into())),
                events: vec![event.into()],
            })
        }

        Function::CustomerBalance => balance_of(txn, Role::Customer, caller),
        Function::BankBalance => balance_of(txn, Role::Bank, caller),
        Function::ShopBalance => balance_of(txn, Role::Shop, caller),

        Function::CustomerBalanceInfo => Outcome::payload(&query::customer_balance_info(txn, caller)?),
        Function::GetCustomersNames => Outcome::payload(&query::customer_names(txn)?),
        Function::GetMyCustomerList => Outcome::payload(&query::bank_customers(txn, caller)?),
        Function::GetShopClaims => Outcome::payload(&query::shop_claims(txn, caller)?),
        Function::GetBankObligations => Outcome::payload(&query::bank_obligations(txn, caller)?),
        Function::GetShopAllowances => Outcome::payload(&query::shop_allowances(txn, caller)?),

        Function::AuditLedger => {
            require_admin(txn, caller)?;
            Outcome::payload(&query::audit(txn)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_names_round_trip() {
        for function in Function::ALL {
            assert_eq!(function.name().parse::<Function>().unwrap(), function);
        }
    }

    #[test]
    fn unknown_function_is_invalid() {
        let err = "mint".parse::<Function>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn single_arg_checks_count_and_shape() {
        let ok: TransferRequest =
            single_arg(Function::Transfer, &[r#"{"receiver":"u2","value":5}"#.to_string()]).unwrap();
        assert_eq!(ok.value, 5);

        let none = single_arg::<TransferRequest>(Function::Transfer, &[]);
        assert!(matches!(none, Err(LedgerError::InvalidArgument(_))));

        let garbage = single_arg::<TransferRequest>(Function::Transfer, &["{".to_string()]);
        assert!(matches!(garbage, Err(LedgerError::InvalidArgument(_))));
    }
}
