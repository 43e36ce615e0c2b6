use std::{sync::Arc, time::Duration};

use {
    agentgate_auth::{AccountStore, CredentialValidator, SqliteAccountStore, TokenSigner},
    agentgate_config::{DatabaseConfig, GatewayConfig},
    agentgate_threads::{SqliteThreadStore, ThreadStore},
    agentgate_upstream::UpstreamClient,
    agentgate_usage::{SqliteUsageStore, UsageSink, UsageStore},
    anyhow::Context,
    sqlx::sqlite::SqlitePoolOptions,
    tracing::debug,
};

use crate::proxy::ProxyEngine;

// ── Database ─────────────────────────────────────────────────────────────────

/// Open the shared SQLite pool and create every table the gateway reads.
pub async fn open_database(cfg: &DatabaseConfig) -> anyhow::Result<sqlx::SqlitePool> {
    let url = cfg.url();
    // An in-memory database exists per connection.
    let max_connections = if url == "sqlite::memory:" { 1 } else { 8 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&url)
        .await
        .with_context(|| format!("failed to open database {}", cfg.path))?;

    SqliteAccountStore::init(&pool).await?;
    SqliteThreadStore::init(&pool).await?;
    SqliteUsageStore::init(&pool).await?;
    debug!(path = %cfg.path, "database ready");
    Ok(pool)
}

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared gateway runtime state, wrapped in Arc for use across handlers.
pub struct GatewayState {
    /// Server version string.
    pub version: String,
    pub validator: CredentialValidator,
    pub threads: Arc<dyn ThreadStore>,
    pub usage: Arc<dyn UsageStore>,
    pub upstream: Arc<UpstreamClient>,
    pub proxy: ProxyEngine,
    /// Assistant used when thread creation names none.
    pub default_assistant_id: String,
}

impl GatewayState {
    pub fn new(
        validator: CredentialValidator,
        threads: Arc<dyn ThreadStore>,
        usage: Arc<dyn UsageStore>,
        upstream: Arc<UpstreamClient>,
        default_assistant_id: impl Into<String>,
    ) -> Arc<Self> {
        let sink: Arc<dyn UsageSink> = Arc::clone(&usage) as Arc<dyn UsageSink>;
        let proxy = ProxyEngine::new(Arc::clone(&upstream), Arc::clone(&threads), sink);
        Arc::new(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            validator,
            threads,
            usage,
            upstream,
            proxy,
            default_assistant_id: default_assistant_id.into(),
        })
    }

    /// Wire every component from a loaded config.
    pub async fn from_config(cfg: &GatewayConfig) -> anyhow::Result<Arc<Self>> {
        let secret = cfg
            .auth
            .jwt_secret
            .as_ref()
            .context("auth.jwt_secret is not set (config file or AGENTGATE_JWT_SECRET)")?;
        let pool = open_database(&cfg.database).await?;

        let signer = Arc::new(TokenSigner::new(
            secret,
            Duration::from_secs(cfg.auth.token_ttl_secs),
        ));
        let accounts: Arc<dyn AccountStore> = Arc::new(SqliteAccountStore::new(pool.clone()));
        let threads: Arc<dyn ThreadStore> = Arc::new(SqliteThreadStore::new(pool.clone()));
        let usage: Arc<dyn UsageStore> = Arc::new(SqliteUsageStore::new(pool));
        let upstream = Arc::new(UpstreamClient::from_config(&cfg.upstream)?);

        Ok(Self::new(
            CredentialValidator::new(signer, accounts),
            threads,
            usage,
            upstream,
            cfg.upstream.default_assistant_id.clone(),
        ))
    }
}
