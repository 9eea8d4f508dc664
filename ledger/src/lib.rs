// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Loyalty Ledger: Core Library
//!
//! A points ledger for customers, banks, and shops. Banks issue points to
//! customers, customers move them between each other and lock them at
//! shops, and shops claim what was locked. The bank that issued a point is
//! the one that ends up owing the shop for it.
//!
//! Value is held twice: a balance counter per account, and a set of
//! provenance-carrying chunks that must always add up to that counter.
//! Every operation moves both, inside one optimistic transaction, so either
//! the whole invocation lands or nothing does.
//!
//! ## Architecture
//!
//! - **storage**: Composite keys, the `KeyValueStore` seam, optimistic
//!   transactions, and the memory and sled backends.
//! - **registry**: Which subjects are customers, banks, and shops.
//! - **balance**: Per-account counters with underflow and overflow checks.
//! - **asset**: The chunk store: create, split, re-home, enumerate.
//! - **transfer**: Chunk selection, customer transfers, bank gifts.
//! - **escrow**: Allowances: buy and withdraw.
//! - **query**: Read-only projections and the whole-ledger audit.
//! - **events**: What successful operations report.
//! - **error**: `StoreError`, `LedgerError`, and the caller-facing `ErrorKind`.
//! - **config**: Index names and limits.
//!
//! ## Ground Rules
//!
//! 1. No balance ever goes below zero.
//! 2. A customer's counter always equals the sum of the chunks they own.
//! 3. Every hop appends exactly one entry to a chunk's history.
//! 4. Nothing partial is ever committed.

pub mod asset;
pub mod balance;
pub mod config;
pub mod error;
pub mod escrow;
pub mod events;
pub mod query;
pub mod registry;
pub mod storage;
pub mod transfer;

pub use error::{ErrorKind, LedgerError, LedgerResult, StoreError, StoreResult};
pub use events::LedgerEvent;
pub use registry::Role;
