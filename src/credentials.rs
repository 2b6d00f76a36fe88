//! Credential resolution — the boundary behind which key decryption lives.
//!
//! The pipeline never stores or logs plaintext API keys. Accounts carry an
//! opaque `credential_ref`; a `CredentialStore` turns that reference into a
//! `SecretString` at call time. How the secret is kept at rest (env, vault,
//! encrypted file) is the implementation's concern.

use std::collections::HashMap;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::model::Account;

/// Resolves an account's opaque credential reference into the decrypted key.
pub trait CredentialStore: Send + Sync {
    fn reveal(&self, account: &Account) -> Result<SecretString, ConfigError>;
}

/// Resolves credential references as process environment variable names.
pub struct EnvCredentialStore;

impl EnvCredentialStore {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EnvCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for EnvCredentialStore {
    fn reveal(&self, account: &Account) -> Result<SecretString, ConfigError> {
        match std::env::var(&account.credential_ref) {
            Ok(value) if !value.is_empty() => Ok(SecretString::from(value)),
            _ => Err(ConfigError::MissingCredential {
                account_id: account.id,
                reference: account.credential_ref.clone(),
            }),
        }
    }
}

/// In-memory credential map for tests.
pub struct StaticCredentialStore {
    secrets: HashMap<String, String>,
}

impl StaticCredentialStore {
    pub fn new(secrets: HashMap<String, String>) -> Self {
        Self { secrets }
    }

    /// A store that resolves every reference to a fixed placeholder key.
    pub fn wildcard() -> Self {
        Self {
            secrets: HashMap::new(),
        }
    }
}

impl CredentialStore for StaticCredentialStore {
    fn reveal(&self, account: &Account) -> Result<SecretString, ConfigError> {
        if let Some(value) = self.secrets.get(&account.credential_ref) {
            return Ok(SecretString::from(value.clone()));
        }
        if self.secrets.is_empty() {
            return Ok(SecretString::from("test-key"));
        }
        Err(ConfigError::MissingCredential {
            account_id: account.id,
            reference: account.credential_ref.clone(),
        })
    }
}
