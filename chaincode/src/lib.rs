//! # Loyalty Chaincode
//!
//! The invocation surface of the loyalty ledger. Callers name a function,
//! pass its arguments as JSON strings, and present a credential; the
//! dispatcher resolves the caller, runs the engine inside one transaction,
//! and commits only if every step succeeded.
//!
//! - **invoke**: function routing, the per-invocation transaction, and
//!   the [`Response`](invoke::Response) envelope.
//! - **identity**: credential to subject id.
//! - **settings**: the admin record written at init.
//! - **models**: request and payload shapes.
//!
//! ## Design Principles
//!
//! 1. The dispatcher owns the transaction; the engine never commits.
//! 2. Errors carry an [`ErrorKind`](loyalty_ledger::ErrorKind) so hosts can
//!    map them to their own status codes.
//! 3. Events leave the dispatcher only with a committed response.

pub mod identity;
pub mod invoke;
pub mod models;
pub mod settings;

pub use identity::{CommonNameResolver, IdentityResolver};
pub use invoke::{Chaincode, Function, Response};
pub use settings::Settings;
