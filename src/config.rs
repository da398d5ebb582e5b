//! Runtime configuration.
//!
//! Everything comes from `CARWASH_*` environment variables; the remote store
//! credentials fall back to the OS keyring when the variable is unset.
//! Loading runs before logging is set up, so problems found while loading
//! are kept on the config and reported by [`AppConfig::log_summary`].

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::storage;

pub const ENV_DATA_DIR: &str = "CARWASH_DATA_DIR";
pub const ENV_BIND: &str = "CARWASH_BIND";
pub const ENV_SQL_ENDPOINT: &str = "CARWASH_SQL_ENDPOINT";
pub const ENV_DATABASE_URL: &str = "CARWASH_DATABASE_URL";
pub const ENV_SQL_TOKEN: &str = "CARWASH_SQL_TOKEN";
pub const ENV_ADMIN_PIN: &str = "CARWASH_ADMIN_PIN";
pub const ENV_CORS_ORIGIN: &str = "CARWASH_CORS_ORIGIN";

const APP_DIR_NAME: &str = "carwash-pos";

/// Connection settings for the remote SQL-over-HTTP store.
#[derive(Clone, PartialEq)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub connection_string: Option<String>,
    pub token: Option<String>,
}

// Secrets stay out of logs.
impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("endpoint", &self.endpoint)
            .field("connection_string", &self.connection_string.as_ref().map(|_| "<set>"))
            .field("token", &self.token.as_ref().map(|_| "<set>"))
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub bind: SocketAddr,
    /// `None` runs in local-only mode.
    pub remote: Option<RemoteConfig>,
    pub admin_pin: Option<String>,
    pub cors_origin: Option<String>,
    /// Problems found while loading.
    pub warnings: Vec<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("data_dir", &self.data_dir)
            .field("bind", &self.bind)
            .field("remote", &self.remote)
            .field("admin_pin", &self.admin_pin.as_ref().map(|_| "<set>"))
            .field("cors_origin", &self.cors_origin)
            .field("warnings", &self.warnings)
            .finish()
    }
}

fn env_value(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Environment first, keyring second.
fn secret(env_name: &str, keyring_key: &str) -> Option<String> {
    env_value(env_name).or_else(|| storage::get_credential(keyring_key))
}

/// Platform data directory for the app, or `./carwash-data` when the
/// platform has none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("carwash-data"))
}

impl AppConfig {
    pub fn from_env() -> Self {
        let data_dir = env_value(ENV_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let mut warnings = Vec::new();
        let bind = match env_value(ENV_BIND) {
            Some(raw) => match raw.parse::<SocketAddr>() {
                Ok(addr) => addr,
                Err(e) => {
                    warnings.push(format!(
                        "invalid {ENV_BIND} `{raw}` ({e}), using {}",
                        default_bind()
                    ));
                    default_bind()
                }
            },
            None => default_bind(),
        };

        let remote = secret(ENV_SQL_ENDPOINT, storage::KEY_SQL_ENDPOINT).map(|endpoint| {
            RemoteConfig {
                endpoint,
                connection_string: secret(ENV_DATABASE_URL, storage::KEY_DATABASE_URL),
                token: secret(ENV_SQL_TOKEN, storage::KEY_SQL_TOKEN),
            }
        });
        Self {
            data_dir,
            bind,
            remote,
            admin_pin: env_value(ENV_ADMIN_PIN),
            cors_origin: env_value(ENV_CORS_ORIGIN),
            warnings,
        }
    }

    /// Report what was loaded. Call once logging is up.
    pub fn log_summary(&self) {
        for warning in &self.warnings {
            warn!("{warning}");
        }
        info!(data_dir = %self.data_dir.display(), bind = %self.bind, "configuration loaded");
        match &self.remote {
            Some(remote) => info!(endpoint = %remote.endpoint, "remote SQL store configured"),
            None => info!("no remote SQL endpoint configured, running local-only"),
        }
    }

    /// Values to persist with `carwash-pos store-credentials`.
    pub fn credential_pairs_from_env() -> Vec<(&'static str, Option<String>)> {
        vec![
            (storage::KEY_SQL_ENDPOINT, env_value(ENV_SQL_ENDPOINT)),
            (storage::KEY_DATABASE_URL, env_value(ENV_DATABASE_URL)),
            (storage::KEY_SQL_TOKEN, env_value(ENV_SQL_TOKEN)),
        ]
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8787))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for name in [
            ENV_DATA_DIR,
            ENV_BIND,
            ENV_SQL_ENDPOINT,
            ENV_DATABASE_URL,
            ENV_SQL_TOKEN,
            ENV_ADMIN_PIN,
            ENV_CORS_ORIGIN,
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn env_values_are_picked_up() {
        clear_env();
        env::set_var(ENV_DATA_DIR, "/tmp/carwash-test");
        env::set_var(ENV_BIND, "0.0.0.0:9000");
        env::set_var(ENV_SQL_ENDPOINT, "db.example.com");
        env::set_var(ENV_DATABASE_URL, "postgresql://user:pw@host/db");
        env::set_var(ENV_SQL_TOKEN, "  ");
        env::set_var(ENV_ADMIN_PIN, "4321");

        let config = AppConfig::from_env();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/carwash-test"));
        assert_eq!(config.bind.port(), 9000);
        let remote = config.remote.clone().unwrap();
        assert_eq!(remote.endpoint, "db.example.com");
        assert_eq!(
            remote.connection_string.as_deref(),
            Some("postgresql://user:pw@host/db")
        );
        assert_eq!(config.admin_pin.as_deref(), Some("4321"));
        let debug = format!("{config:?}");
        assert!(!debug.contains("user:pw"));
        assert!(!debug.contains("4321"));
        clear_env();
    }

    #[test]
    #[serial]
    fn invalid_bind_falls_back_to_default() {
        clear_env();
        env::set_var(ENV_BIND, "not-an-address");
        let config = AppConfig::from_env();
        assert_eq!(config.bind.to_string(), "127.0.0.1:8787");
        assert_eq!(config.warnings.len(), 1);
        assert!(config.warnings[0].contains("not-an-address"));
        clear_env();
    }

    #[test]
    #[serial]
    fn credential_pairs_come_from_env() {
        clear_env();
        env::set_var(ENV_SQL_ENDPOINT, "https://db.example.com");
        let pairs = AppConfig::credential_pairs_from_env();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0].1.as_deref(), Some("https://db.example.com"));
        assert!(pairs[1].1.is_none());
        clear_env();
    }

    #[test]
    #[serial]
    fn data_dir_defaults_under_platform_data_dir() {
        clear_env();
        let config = AppConfig::from_env();
        assert!(config.warnings.is_empty());
        assert!(config.data_dir.ends_with(APP_DIR_NAME) || config.data_dir.ends_with("carwash-data"));
    }
}
