//! Car wash point-of-sale backend.
//!
//! Serves the JSON action surface the view layer calls, keeps the
//! authoritative records in a remote SQL-over-HTTP store and mirrors them
//! into a local SQLite cache so the shop keeps working through outages.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod app_state;
mod auth;
mod commands;
mod config;
mod data_helpers;
mod db;
mod diagnostics;
mod error;
mod finance;
mod gateway;
mod jobs;
mod loyalty;
mod models;
mod queue;
mod storage;

use api::{HttpSqlClient, SqlTransport};
use app_state::{AppState, Controller};
use auth::AuthState;
use config::{AppConfig, RemoteConfig};
use gateway::Gateway;

/// What the process was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Serve,
    /// Copy the remote store credentials from the environment into the keyring.
    StoreCredentials,
    ClearCredentials,
    /// Probe the remote store once and exit.
    CheckConnection,
}

impl Mode {
    pub fn from_arg(arg: Option<&str>) -> anyhow::Result<Self> {
        match arg {
            None | Some("serve") => Ok(Mode::Serve),
            Some("store-credentials") => Ok(Mode::StoreCredentials),
            Some("clear-credentials") => Ok(Mode::ClearCredentials),
            Some("check-connection") => Ok(Mode::CheckConnection),
            Some(other) => anyhow::bail!(
                "unknown command `{other}` (expected serve, store-credentials, clear-credentials or check-connection)"
            ),
        }
    }
}

fn init_logging(config: &AppConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,carwash_pos_lib=debug"));

    let log_dir = diagnostics::get_log_dir(&config.data_dir);
    let file_layer = match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            diagnostics::prune_old_logs(&log_dir);
            let file_appender =
                tracing_appender::rolling::daily(&log_dir, diagnostics::LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            // The guard flushes on drop; the process runs until exit.
            std::mem::forget(guard);
            Some(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true),
            )
        }
        Err(e) => {
            eprintln!("cannot create log directory {}: {e}", log_dir.display());
            None
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();
}

fn remote_client(remote: &RemoteConfig) -> anyhow::Result<HttpSqlClient> {
    HttpSqlClient::new(
        &remote.endpoint,
        remote.connection_string.clone(),
        remote.token.clone(),
    )
    .context("invalid remote SQL configuration")
}

pub async fn run(mode: Mode) -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    init_logging(&config);
    config.log_summary();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_sha = env!("BUILD_GIT_SHA"),
        ?mode,
        "starting carwash-pos"
    );

    match mode {
        Mode::Serve => serve(config).await,
        Mode::StoreCredentials => {
            let stored = storage::store_credentials(&AppConfig::credential_pairs_from_env())?;
            info!(stored, "credentials saved to keyring");
            Ok(())
        }
        Mode::ClearCredentials => {
            storage::clear_credentials()?;
            info!("credentials removed from keyring");
            Ok(())
        }
        Mode::CheckConnection => {
            let remote = config
                .remote
                .as_ref()
                .context("no remote SQL endpoint configured")?;
            let result = remote_client(remote)?.test_connectivity().await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            anyhow::ensure!(result.success, "remote store is unreachable");
            Ok(())
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
    let cache = Arc::new(db::init(&config.data_dir)?);
    info!(path = %cache.db_path.display(), "local cache ready");
    auth::provision_admin_pin(&cache, config.admin_pin.as_deref())?;

    let remote: Option<Arc<dyn SqlTransport>> = match &config.remote {
        Some(remote) => {
            let client = remote_client(remote)?;
            let probe = client.test_connectivity().await;
            if probe.success {
                info!(endpoint = client.endpoint(), latency_ms = ?probe.latency_ms, "remote store reachable");
            } else {
                warn!(endpoint = client.endpoint(), error = ?probe.error, "remote store unreachable, serving from cache");
            }
            Some(Arc::new(client))
        }
        None => None,
    };

    let gateway = Arc::new(Gateway::new(remote, cache));
    let controller = Controller::bootstrap(gateway).await?;
    let state = AppState::new(controller, AuthState::new());
    let router = commands::create_router(state, config.cors_origin.as_deref());

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!(addr = %config.bind, "HTTP surface listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
