//! Keychain storage for the API bearer token.
//!
//! Uses the `keyring` crate so the token used for replays survives restarts
//! without being written next to the queue database.

use keyring::Entry;
use thiserror::Error;

use crate::config::ClientProfile;

/// Keychain service name shared by both front ends.
const SERVICE_NAME: &str = "com.dodo.offline-sync";

#[derive(Debug, Error)]
pub enum KeychainError {
    #[error("Keychain operation failed: {0}")]
    OperationFailed(String),
}

impl From<keyring::Error> for KeychainError {
    fn from(err: keyring::Error) -> Self {
        KeychainError::OperationFailed(err.to_string())
    }
}

fn entry(profile: ClientProfile) -> Result<Entry, KeychainError> {
    Ok(Entry::new(SERVICE_NAME, &format!("{}-token", profile))?)
}

/// Store the access token for the given profile.
pub fn store_token(profile: ClientProfile, token: &str) -> Result<(), KeychainError> {
    entry(profile)?.set_password(token)?;
    Ok(())
}

/// Retrieve the access token for the given profile.
///
/// Returns `None` if no entry exists (never logged in or logged out).
pub fn get_token(profile: ClientProfile) -> Result<Option<String>, KeychainError> {
    match entry(profile)?.get_password() {
        Ok(token) => Ok(Some(token)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(KeychainError::from(e)),
    }
}

/// Delete the stored access token.
///
/// Idempotent: ignores `NoEntry` error (already deleted or never stored).
pub fn delete_token(profile: ClientProfile) -> Result<(), KeychainError> {
    match entry(profile)?.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(KeychainError::from(e)),
    }
}
