//! Composite keys and the named indexes they live under.
//!
//! Layout: `\0 <index> \0 <part> \0 <part> \0 ...`. Every component is
//! terminated by NUL, so a key built from a *prefix* of the parts is a
//! byte-prefix of every full key that extends it, and `owner = "u1"` never
//! matches `owner = "u10"`.

use crate::config;
use crate::error::{StoreError, StoreResult};

const SEPARATOR: u8 = 0x00;

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// A named keyspace. Passed explicitly to every store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Index {
    Customer,
    CustomerAsset,
    Bank,
    BankAsset,
    BankCustomers,
    Shop,
    ShopAsset,
    ShopAllowances,
    EscrowAsset,
    AssetSequence,
}

impl Index {
    /// The persisted name of this index.
    pub const fn name(self) -> &'static str {
        match self {
            Index::Customer => config::INDEX_CUSTOMER,
            Index::CustomerAsset => config::INDEX_CUSTOMER_ASSET,
            Index::Bank => config::INDEX_BANK,
            Index::BankAsset => config::INDEX_BANK_ASSET,
            Index::BankCustomers => config::INDEX_BANK_CUSTOMERS,
            Index::Shop => config::INDEX_SHOP,
            Index::ShopAsset => config::INDEX_SHOP_ASSET,
            Index::ShopAllowances => config::INDEX_SHOP_ALLOWANCES,
            Index::EscrowAsset => config::INDEX_ESCROW_ASSET,
            Index::AssetSequence => config::INDEX_ASSET_SEQUENCE,
        }
    }
}

impl std::fmt::Display for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// CompositeKey
// ---------------------------------------------------------------------------

/// An encoded composite key, or a partial one used as a scan prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompositeKey(Vec<u8>);

impl CompositeKey {
    /// Encodes `parts` under `index`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] if a part contains the NUL byte.
    pub fn new(index: Index, parts: &[&str]) -> StoreResult<Self> {
        let capacity = 2 + index.name().len() + parts.iter().map(|p| p.len() + 1).sum::<usize>();
        let mut bytes = Vec::with_capacity(capacity);
        bytes.push(SEPARATOR);
        bytes.extend_from_slice(index.name().as_bytes());
        bytes.push(SEPARATOR);
        for part in parts {
            if part.as_bytes().contains(&SEPARATOR) {
                return Err(StoreError::InvalidKey(format!(
                    "component {part:?} of {index} contains a NUL byte"
                )));
            }
            bytes.extend_from_slice(part.as_bytes());
            bytes.push(SEPARATOR);
        }
        Ok(Self(bytes))
    }

    /// Raw encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decodes a full key into its index name and parts.
    pub fn split(bytes: &[u8]) -> StoreResult<(String, Vec<String>)> {
        let body = bytes
            .strip_prefix(&[SEPARATOR])
            .and_then(|rest| rest.strip_suffix(&[SEPARATOR]))
            .ok_or_else(|| {
                StoreError::InvalidKey(format!("not a composite key: {}", hex::encode(bytes)))
            })?;

        let mut components = body.split(|b| *b == SEPARATOR).map(|c| {
            String::from_utf8(c.to_vec())
                .map_err(|_| StoreError::InvalidKey(format!("non-utf8 key: {}", hex::encode(bytes))))
        });

        let index = components
            .next()
            .ok_or_else(|| StoreError::InvalidKey("empty composite key".into()))??;
        let parts = components.collect::<StoreResult<Vec<_>>>()?;
        Ok((index, parts))
    }
}

impl AsRef<[u8]> for CompositeKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_recovers_index_and_parts() {
        let key = CompositeKey::new(Index::CustomerAsset, &["u1", "bank1", "0"]).unwrap();
        let (index, parts) = CompositeKey::split(key.as_bytes()).unwrap();
        assert_eq!(index, "cn~customer~asset");
        assert_eq!(parts, vec!["u1", "bank1", "0"]);
    }

    #[test]
    fn partial_key_is_prefix_of_full_key() {
        let prefix = CompositeKey::new(Index::CustomerAsset, &["u1"]).unwrap();
        let full = CompositeKey::new(Index::CustomerAsset, &["u1", "bank1", "7"]).unwrap();
        assert!(full.as_bytes().starts_with(prefix.as_bytes()));
    }

    #[test]
    fn owner_prefix_does_not_match_longer_owner() {
        let prefix = CompositeKey::new(Index::CustomerAsset, &["u1"]).unwrap();
        let other = CompositeKey::new(Index::CustomerAsset, &["u10", "bank1", "0"]).unwrap();
        assert!(!other.as_bytes().starts_with(prefix.as_bytes()));
    }

    #[test]
    fn index_prefix_does_not_match_nested_index() {
        // "cn~customer" must not scan into "cn~customer~asset".
        let prefix = CompositeKey::new(Index::Customer, &[]).unwrap();
        let asset = CompositeKey::new(Index::CustomerAsset, &["u1", "b", "0"]).unwrap();
        assert!(!asset.as_bytes().starts_with(prefix.as_bytes()));
    }

    #[test]
    fn nul_in_component_is_rejected() {
        let err = CompositeKey::new(Index::Customer, &["bad\0name"]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }

    #[test]
    fn split_rejects_raw_keys() {
        assert!(CompositeKey::split(b"__settings").is_err());
    }

    #[test]
    fn empty_parts_round_trip() {
        let key = CompositeKey::new(Index::Shop, &[""]).unwrap();
        let (_, parts) = CompositeKey::split(key.as_bytes()).unwrap();
        assert_eq!(parts, vec![String::new()]);
    }
}
