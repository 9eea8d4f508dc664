//! # Storage Module
//!
//! The key/value seam under the ledger engine.
//!
//! ## Architecture
//!
//! ```text
//! key.rs   : Index descriptors and NUL-separated composite keys
//! store.rs : KeyValueStore (engine-facing), Backend + ReadView (commit-facing)
//! txn.rs   : Optimistic transaction: write overlay + read-set validation
//! memory.rs: BTreeMap backend for tests and ephemeral nodes
//! db.rs    : sled backend for persistent nodes
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! engine ──► Transaction (KeyValueStore) ──commit──► Backend
//!                  │                                  ├── MemoryBackend
//!                  └── reads ◄────── ReadView ◄───────┴── LedgerDb (sled)
//! ```
//!
//! The engine never sees a backend directly. Everything it does goes through
//! the five operations of [`KeyValueStore`], which is what lets one
//! invocation be validated and committed as a whole.

pub mod db;
pub mod key;
pub mod memory;
pub mod store;
pub mod txn;

pub use db::LedgerDb;
pub use key::{CompositeKey, Index};
pub use memory::MemoryBackend;
pub use store::{Backend, KeyValue, KeyValueStore, ReadView, ScanIter, WriteSet};
pub use txn::{ReadSet, Transaction};
