//! # Caller Identity
//!
//! Turns the credential attached to an invocation into a subject id. The
//! dispatcher never looks at credentials itself; it asks an
//! [`IdentityResolver`], so deployments can swap in certificate parsing or
//! token introspection without touching the engine.

use loyalty_ledger::registry::validate_subject;
use loyalty_ledger::{LedgerError, LedgerResult};

/// Maps an invocation credential to the calling subject.
pub trait IdentityResolver: Send + Sync {
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] when no subject can be extracted.
    fn resolve(&self, credential: &str) -> LedgerResult<String>;
}

/// Reads the common name out of a distinguished name.
///
/// Accepts `CN=alice,OU=members,O=shop`, the slash form
/// `/O=shop/CN=alice`, or a bare subject id with no `=` in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonNameResolver;

impl IdentityResolver for CommonNameResolver {
    fn resolve(&self, credential: &str) -> LedgerResult<String> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(LedgerError::Unauthorized("anonymous".into()));
        }

        let subject = if credential.contains('=') {
            credential
                .split([',', '/'])
                .map(str::trim)
                .find_map(|rdn| {
                    let (attr, value) = rdn.split_once('=')?;
                    attr.trim().eq_ignore_ascii_case("CN").then(|| value.trim())
                })
                .ok_or_else(|| LedgerError::Unauthorized(credential.to_string()))?
        } else {
            credential
        };

        validate_subject(subject).map_err(|_| LedgerError::Unauthorized(credential.to_string()))?;
        Ok(subject.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_ledger::ErrorKind;

    #[test]
    fn comma_separated_dn() {
        let cn = CommonNameResolver.resolve("CN=testUser, OU=client, O=Org1").unwrap();
        assert_eq!(cn, "testUser");
    }

    #[test]
    fn slash_separated_dn() {
        let cn = CommonNameResolver.resolve("/C=US/O=Org1/CN=shop1").unwrap();
        assert_eq!(cn, "shop1");
    }

    #[test]
    fn bare_name() {
        assert_eq!(CommonNameResolver.resolve("bank1").unwrap(), "bank1");
    }

    #[test]
    fn missing_common_name_is_unauthorized() {
        for credential in ["", "   ", "O=Org1,OU=client", "CN="] {
            let err = CommonNameResolver.resolve(credential).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Unauthorized, "{credential:?}");
        }
    }
}
