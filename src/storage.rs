//! Remote store credentials in the OS credential store.
//!
//! On Windows this uses the native credential manager (via the `keyring`
//! crate), on macOS Keychain, and on Linux the Secret Service API. Values set
//! in the process environment take precedence; see [`crate::config`].

use keyring::Entry;
use tracing::{info, warn};

use crate::error::{AppError, Result};

const SERVICE_NAME: &str = "carwash-pos";

// Credential keys
pub const KEY_SQL_ENDPOINT: &str = "sql_endpoint";
pub const KEY_DATABASE_URL: &str = "database_url";
pub const KEY_SQL_TOKEN: &str = "sql_token";

/// All credential keys managed by this module.
pub const ALL_KEYS: &[&str] = &[KEY_SQL_ENDPOINT, KEY_DATABASE_URL, KEY_SQL_TOKEN];

// ---------------------------------------------------------------------------
// Low-level helpers
// ---------------------------------------------------------------------------

/// Retrieve a single credential from the OS keyring. Returns `None` when the
/// entry does not exist or the platform store is unavailable.
pub fn get_credential(key: &str) -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, key) {
        Ok(e) => e,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to create entry");
            return None;
        }
    };
    match entry.get_password() {
        Ok(pw) if pw.trim().is_empty() => None,
        Ok(pw) => Some(pw),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to read credential");
            None
        }
    }
}

/// Store a credential in the OS keyring.
pub fn set_credential(key: &str, value: &str) -> Result<()> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(keyring_error)?;
    entry.set_password(value).map_err(keyring_error)?;
    Ok(())
}

/// Delete a credential from the OS keyring. Silently succeeds if the entry
/// does not exist.
pub fn delete_credential(key: &str) -> Result<()> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(keyring_error)?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(keyring_error(e)),
    }
}

fn keyring_error(e: keyring::Error) -> AppError {
    AppError::Unexpected(format!("credential store: {e}"))
}

// ---------------------------------------------------------------------------
// High-level API
// ---------------------------------------------------------------------------

/// Persist every non-empty value from `pairs` under its key.
pub fn store_credentials(pairs: &[(&str, Option<String>)]) -> Result<usize> {
    let mut stored = 0;
    for (key, value) in pairs {
        if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            set_credential(key, value)?;
            stored += 1;
        }
    }
    info!(stored, "remote store credentials saved to keyring");
    Ok(stored)
}

/// Delete every stored credential.
pub fn clear_credentials() -> Result<()> {
    info!("deleting all stored remote store credentials");
    for key in ALL_KEYS {
        delete_credential(key)?;
    }
    Ok(())
}
