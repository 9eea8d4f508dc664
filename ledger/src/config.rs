//! # Ledger Configuration & Constants
//!
//! Every magic string and limit the ledger relies on lives here. Index names
//! are part of the persisted key layout: renaming one after data has been
//! written orphans every record stored under the old name, so treat them as
//! frozen.

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Version of the ledger engine and its persisted layout.
pub const LEDGER_VERSION: &str = "0.1.0";

/// Version of the on-disk record encoding. Bump when the JSON shape of
/// assets or allowances, or the balance byte layout, changes.
pub const STORAGE_FORMAT_VERSION: u16 = 1;

// ---------------------------------------------------------------------------
// Well-known Keys
// ---------------------------------------------------------------------------

/// Raw (non-composite) key holding the settings blob written at init.
///
/// Composite keys always start with a NUL byte, so this key can never
/// collide with one of them.
pub const SETTINGS_KEY: &[u8] = b"__settings";

// ---------------------------------------------------------------------------
// Index Names
// ---------------------------------------------------------------------------

/// Customer balances, keyed by `(customer)`.
pub const INDEX_CUSTOMER: &str = "cn~customer";

/// Chunks owned by customers, keyed by `(owner, source, id)`.
pub const INDEX_CUSTOMER_ASSET: &str = "cn~customer~asset";

/// Bank balances, keyed by `(bank)`.
pub const INDEX_BANK: &str = "cn~bank";

/// Chunks a bank must settle, keyed by `(bank, shop, id)`.
pub const INDEX_BANK_ASSET: &str = "cn~bank~asset";

/// Cumulative amount a bank gifted to each customer, keyed by `(bank, customer)`.
pub const INDEX_BANK_CUSTOMERS: &str = "cn~bank~customer";

/// Shop balances, keyed by `(shop)`.
pub const INDEX_SHOP: &str = "cn~shop";

/// Chunks claimed by shops, keyed by `(shop, buyer, id)`.
pub const INDEX_SHOP_ASSET: &str = "cn~shop~asset";

/// Outstanding allowances, keyed by `(shop, buyer)`.
pub const INDEX_SHOP_ALLOWANCES: &str = "cn~shop~allowances";

/// Chunks parked in escrow, keyed by `(shop, buyer, id)`.
pub const INDEX_ESCROW_ASSET: &str = "cn~shop~allowance~asset";

/// Next chunk id per `(index, owner, source)`.
pub const INDEX_ASSET_SEQUENCE: &str = "cn~asset~sequence";

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Longest accepted subject identifier, in bytes. Subject ids become key
/// components, so an unbounded id is an unbounded key.
pub const MAX_SUBJECT_LEN: usize = 256;

/// Most actors a single `createActors` invocation may register.
pub const MAX_ACTORS_PER_INVOCATION: usize = 1_000;

/// Broadcast channel capacity for committed-event fan-out.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
