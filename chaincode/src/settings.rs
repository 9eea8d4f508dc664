//! Deployment settings, written once at init.

use serde::{Deserialize, Serialize};

use loyalty_ledger::config::SETTINGS_KEY;
use loyalty_ledger::registry::validate_subject;
use loyalty_ledger::storage::KeyValueStore;
use loyalty_ledger::LedgerResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// The only subject allowed to register actors and audit the ledger.
    pub admin: String,
}

impl Settings {
    pub fn new(admin: impl Into<String>) -> Self {
        Self {
            admin: admin.into(),
        }
    }

    /// Reads the settings blob, if the ledger has been initialized.
    pub fn load<S>(store: &mut S) -> LedgerResult<Option<Self>>
    where
        S: KeyValueStore + ?Sized,
    {
        match store.get(SETTINGS_KEY)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Writes the settings blob, replacing any previous one.
    pub fn save<S>(&self, store: &mut S) -> LedgerResult<()>
    where
        S: KeyValueStore + ?Sized,
    {
        validate_subject(&self.admin)?;
        store.put(SETTINGS_KEY, serde_json::to_vec(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_ledger::storage::{MemoryBackend, Transaction};

    #[test]
    fn save_then_load() {
        let backend = MemoryBackend::new();
        let mut txn = Transaction::begin(&backend);
        assert_eq!(Settings::load(&mut txn).unwrap(), None);

        Settings::new("admin").save(&mut txn).unwrap();
        assert_eq!(Settings::load(&mut txn).unwrap(), Some(Settings::new("admin")));
    }

    #[test]
    fn empty_admin_is_rejected() {
        let backend = MemoryBackend::new();
        let mut txn = Transaction::begin(&backend);
        assert!(Settings::new("").save(&mut txn).is_err());
    }
}
