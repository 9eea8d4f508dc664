//! # Ledger Errors
//!
//! Two layers of error: [`StoreError`] for the key/value seam and
//! [`LedgerError`] for everything the engine can reject. Every
//! `LedgerError` collapses into one [`ErrorKind`], which is what callers
//! outside the crate (the dispatcher, the HTTP node) branch on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::Role;

// ---------------------------------------------------------------------------
// Error Kind
// ---------------------------------------------------------------------------

/// The coarse failure categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Unknown subject or allowance.
    NotFound,
    /// A debit exceeds the available balance.
    InsufficientBalance,
    /// Malformed request, non-positive value, self-transfer, duplicate record.
    InvalidArgument,
    /// Caller lacks the role or privilege the operation requires.
    Unauthorized,
    /// A concurrent commit touched data this invocation read. Safe to retry.
    Conflict,
    /// Balance and chunk representations disagree. Never expected.
    LedgerInconsistent,
    /// The backing store failed.
    Storage,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "NotFound"),
            ErrorKind::InsufficientBalance => write!(f, "InsufficientBalance"),
            ErrorKind::InvalidArgument => write!(f, "InvalidArgument"),
            ErrorKind::Unauthorized => write!(f, "Unauthorized"),
            ErrorKind::Conflict => write!(f, "Conflict"),
            ErrorKind::LedgerInconsistent => write!(f, "LedgerInconsistent"),
            ErrorKind::Storage => write!(f, "Storage"),
        }
    }
}

// ---------------------------------------------------------------------------
// Store Errors
// ---------------------------------------------------------------------------

/// Errors raised by the key/value layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Commit-time validation found a key or range that changed after it
    /// was read.
    #[error("write conflict on key {key}")]
    Conflict {
        /// Hex-encoded key (or scan prefix) that failed validation.
        key: String,
    },

    /// A key component contains the separator byte, or a stored key does
    /// not decode as a composite key.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The database was written by an incompatible version, or its
    /// bookkeeping entries are unreadable.
    #[error("incompatible storage: {0}")]
    Incompatible(String),

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Ledger Errors
// ---------------------------------------------------------------------------

/// Everything the ledger engine can reject.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{role} '{subject}' doesn't exist")]
    SubjectNotFound { role: Role, subject: String },

    #[error("no allowance from '{buyer}' at shop '{shop}'")]
    AllowanceNotFound { shop: String, buyer: String },

    #[error("{subject} does not have enough balance: available {available}, requested {requested}")]
    InsufficientBalance {
        subject: String,
        available: u64,
        requested: u64,
    },

    #[error("transfer to yourself is not allowed")]
    SelfTransfer,

    #[error("value must be positive")]
    NonPositiveValue,

    #[error("{role} '{subject}' already exists")]
    SubjectExists { role: Role, subject: String },

    #[error("'{buyer}' already has an outstanding allowance at shop '{shop}'")]
    AllowanceExists { shop: String, buyer: String },

    /// Withdrawals must claim the allowance exactly; partial claims are not
    /// supported.
    #[error("claim of {claimed} does not match outstanding allowance of {outstanding}")]
    ClaimMismatch { claimed: u64, outstanding: u64 },

    #[error("balance overflow for '{subject}': current {current}, credit {credit}")]
    Overflow {
        subject: String,
        current: u64,
        credit: u64,
    },

    #[error("bad request: {0}")]
    InvalidArgument(String),

    #[error("I don't know you, {0}!")]
    Unauthorized(String),

    /// The two representations of value disagree. Reaching this means
    /// stored state was corrupted; the invocation is aborted untouched.
    #[error("ledger inconsistent: {0}")]
    Inconsistent(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl LedgerError {
    /// Maps this error onto the caller-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::SubjectNotFound { .. } | LedgerError::AllowanceNotFound { .. } => {
                ErrorKind::NotFound
            }
            LedgerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            LedgerError::SelfTransfer
            | LedgerError::NonPositiveValue
            | LedgerError::SubjectExists { .. }
            | LedgerError::AllowanceExists { .. }
            | LedgerError::ClaimMismatch { .. }
            | LedgerError::Overflow { .. }
            | LedgerError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            LedgerError::Unauthorized(_) => ErrorKind::Unauthorized,
            LedgerError::Inconsistent(_) | LedgerError::Encoding(_) => {
                ErrorKind::LedgerInconsistent
            }
            LedgerError::Store(StoreError::Conflict { .. }) => ErrorKind::Conflict,
            LedgerError::Store(StoreError::InvalidKey(_)) => ErrorKind::InvalidArgument,
            LedgerError::Store(StoreError::Incompatible(_) | StoreError::Sled(_)) => {
                ErrorKind::Storage
            }
        }
    }

    /// Returns `true` when retrying the whole invocation may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
