//! Storage account key resolution.
//!
//! Keys come from, in order: the secrets passed with the request, the
//! process-wide key cache, the cluster secret store, and finally the
//! management API using the cluster identity.
//!
//! The key cache is never invalidated here. A key rotated outside this
//! process keeps being served until the process restarts.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, info};

use crate::client::{ManagementClient, SecretStore};
use crate::context::lookup;
use crate::error::{Result, ShareError};

pub const ACCOUNT_NAME_FIELD: &str = "accountname";
pub const ACCOUNT_KEY_FIELD: &str = "accountkey";
/// Field names of the legacy in-tree plugin.
pub const DEFAULT_SECRET_ACCOUNT_NAME: &str = "azurestorageaccountname";
pub const DEFAULT_SECRET_ACCOUNT_KEY: &str = "azurestorageaccountkey";
pub const DEFAULT_SECRET_NAMESPACE: &str = "default";

pub fn secret_name_for(account: &str) -> String {
    format!("azure-storage-account-{account}-secret")
}

/// An account name and its key.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountCredentials {
    pub account_name: String,
    pub account_key: String,
}

impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .finish()
    }
}

/// Secrets supplied with a request.
#[derive(Clone, Default)]
pub struct AccountSecrets {
    account_name: Option<String>,
    account_key: Option<String>,
    supplied: bool,
}

impl AccountSecrets {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(account_name: impl Into<String>, account_key: impl Into<String>) -> Self {
        Self {
            account_name: Some(account_name.into()),
            account_key: Some(account_key.into()),
            supplied: true,
        }
    }

    /// Reads `accountname`/`accountkey` or their legacy names, ignoring key case.
    pub fn from_map(secrets: &HashMap<String, String>) -> Self {
        let field = |generic, legacy| {
            lookup(secrets, generic)
                .or_else(|| lookup(secrets, legacy))
                .map(str::to_string)
        };
        Self {
            account_name: field(ACCOUNT_NAME_FIELD, DEFAULT_SECRET_ACCOUNT_NAME),
            account_key: field(ACCOUNT_KEY_FIELD, DEFAULT_SECRET_ACCOUNT_KEY),
            supplied: !secrets.is_empty(),
        }
    }

    /// True when the request carried no secrets at all.
    pub fn is_empty(&self) -> bool {
        !self.supplied
    }

    pub fn credentials(&self) -> Result<AccountCredentials> {
        let account_name = non_blank(self.account_name.as_deref()).ok_or(
            ShareError::MissingCredentialField {
                field: "accountname or azurestorageaccountname",
            },
        )?;
        let account_key = non_blank(self.account_key.as_deref()).ok_or(
            ShareError::MissingCredentialField {
                field: "accountkey or azurestorageaccountkey",
            },
        )?;
        debug!("got storage account({account_name}) from secret");
        Ok(AccountCredentials {
            account_name: account_name.to_string(),
            account_key: account_key.to_string(),
        })
    }
}

impl fmt::Debug for AccountSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSecrets")
            .field("account_name", &self.account_name)
            .field("account_key", &self.account_key.as_ref().map(|_| "<redacted>"))
            .field("supplied", &self.supplied)
            .finish()
    }
}

fn non_blank(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

/// Where to look for the account key in the secret store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretRef {
    pub name: Option<String>,
    pub namespace: Option<String>,
}

/// Account name to key, filled on every successful lookup.
#[derive(Default)]
pub struct AccountKeyCache {
    keys: RwLock<HashMap<String, String>>,
}

impl AccountKeyCache {
    pub fn get(&self, account: &str) -> Option<String> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(account)
            .cloned()
    }

    /// Keeps an existing entry; returns the key now cached.
    pub fn insert(&self, account: &str, key: &str) -> String {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(account.to_string())
            .or_insert_with(|| key.to_string())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct CredentialResolver {
    cache: AccountKeyCache,
    secret_store: Option<Arc<dyn SecretStore>>,
    management: Arc<dyn ManagementClient>,
    default_namespace: String,
}

impl CredentialResolver {
    pub fn new(
        management: Arc<dyn ManagementClient>,
        secret_store: Option<Arc<dyn SecretStore>>,
        default_namespace: impl Into<String>,
    ) -> Self {
        Self {
            cache: AccountKeyCache::default(),
            secret_store,
            management,
            default_namespace: default_namespace.into(),
        }
    }

    pub fn cache(&self) -> &AccountKeyCache {
        &self.cache
    }

    /// Resolves the key of `account`.
    pub async fn resolve(
        &self,
        account: &str,
        resource_group: &str,
        secrets: &AccountSecrets,
        secret_ref: &SecretRef,
    ) -> Result<String> {
        Ok(self
            .resolve_credentials(account, resource_group, secrets, secret_ref)
            .await?
            .account_key)
    }

    /// Like [`resolve`](Self::resolve) but also reports the account name,
    /// which explicit secrets may override.
    pub async fn resolve_credentials(
        &self,
        account: &str,
        resource_group: &str,
        secrets: &AccountSecrets,
        secret_ref: &SecretRef,
    ) -> Result<AccountCredentials> {
        if !secrets.is_empty() {
            return secrets.credentials();
        }

        if let Some(key) = self.cache.get(account) {
            return Ok(AccountCredentials {
                account_name: account.to_string(),
                account_key: key,
            });
        }

        // without an account name only an explicitly named secret can help
        let secret_name = match (&secret_ref.name, account.is_empty()) {
            (Some(name), _) => name.clone(),
            (None, false) => secret_name_for(account),
            (None, true) => {
                return Err(ShareError::SecretStore {
                    account: String::new(),
                    reason: "account name and secret name are both empty".to_string(),
                });
            }
        };
        let namespace = secret_ref
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(self.default_namespace.as_str());

        let key = match self.key_from_secret(&secret_name, namespace).await {
            Ok(key) => key,
            Err(secret_err) if account.is_empty() => {
                return Err(ShareError::SecretStore {
                    account: String::new(),
                    reason: secret_err,
                });
            }
            Err(secret_err) => {
                info!(
                    "could not get account({account}) key from secret({secret_name}), error: {secret_err}, use cluster identity to get account key instead"
                );
                self.management
                    .get_account_key(account, resource_group)
                    .await
                    .map_err(|e| ShareError::SecretStore {
                        account: account.to_string(),
                        reason: format!("secret: {secret_err}; cluster identity: {e}"),
                    })?
            }
        };

        if key.is_empty() {
            return Err(ShareError::SecretStore {
                account: account.to_string(),
                reason: "empty account key".to_string(),
            });
        }
        if !account.is_empty() {
            self.cache.insert(account, &key);
        }
        Ok(AccountCredentials {
            account_name: account.to_string(),
            account_key: key,
        })
    }

    async fn key_from_secret(&self, name: &str, namespace: &str) -> Result<String, String> {
        let store = self
            .secret_store
            .as_ref()
            .ok_or_else(|| "secret store is not configured".to_string())?;
        let data = store
            .get_secret(name, namespace)
            .await
            .map_err(|e| format!("could not get secret({name}): {e}"))?;
        let raw = data
            .get(DEFAULT_SECRET_ACCOUNT_KEY)
            .ok_or_else(|| format!("secret({name}) has no {DEFAULT_SECRET_ACCOUNT_KEY} field"))?;
        let key = String::from_utf8(raw.clone())
            .map_err(|e| format!("secret({name}) key is not utf-8: {e}"))?;
        if key.is_empty() {
            return Err(format!("secret({name}) key is empty"));
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_generic_field_names() {
        let creds = AccountSecrets::from_map(&map(&[("AccountName", " acct "), ("accountKey", "key")]))
            .credentials()
            .unwrap();
        assert_eq!(creds.account_name, "acct");
        assert_eq!(creds.account_key, "key");
    }

    #[test]
    fn test_legacy_field_names() {
        let creds = AccountSecrets::from_map(&map(&[
            ("azurestorageaccountname", "acct"),
            ("AzureStorageAccountKey", "key"),
        ]))
        .credentials()
        .unwrap();
        assert_eq!(creds.account_name, "acct");
        assert_eq!(creds.account_key, "key");
    }

    #[test]
    fn test_missing_fields() {
        let err = AccountSecrets::from_map(&map(&[("accountkey", "key")]))
            .credentials()
            .unwrap_err();
        assert!(matches!(err, ShareError::MissingCredentialField { .. }));

        let err = AccountSecrets::from_map(&map(&[("accountname", "acct"), ("accountkey", "  ")]))
            .credentials()
            .unwrap_err();
        assert!(matches!(err, ShareError::MissingCredentialField { .. }));
    }

    #[test]
    fn test_empty_map_is_not_supplied() {
        assert!(AccountSecrets::from_map(&HashMap::new()).is_empty());
        assert!(!AccountSecrets::from_map(&map(&[("other", "x")])).is_empty());
    }

    #[test]
    fn test_debug_hides_key() {
        let secrets = AccountSecrets::new("acct", "very-secret");
        assert!(!format!("{secrets:?}").contains("very-secret"));
        let creds = secrets.credentials().unwrap();
        assert!(!format!("{creds:?}").contains("very-secret"));
    }

    #[test]
    fn test_key_cache_keeps_first_value() {
        let cache = AccountKeyCache::default();
        assert_eq!(cache.insert("acct", "k1"), "k1");
        assert_eq!(cache.insert("acct", "k2"), "k1");
        assert_eq!(cache.get("acct").as_deref(), Some("k1"));
        assert_eq!(cache.len(), 1);
    }
}
