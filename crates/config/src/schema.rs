//! Config schema: HTTP server, upstream agent service, credentials, storage.

use {
    secrecy::Secret,
    serde::Deserialize,
};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
}

/// Listener settings for the caller-facing HTTP server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8787,
        }
    }
}

/// The single upstream agent-execution service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL, e.g. `http://127.0.0.1:2024`. No trailing slash required.
    pub base_url: String,

    /// Service-level bearer credential sent on every upstream call.
    /// Never derived from a caller's credential.
    pub service_token: Option<Secret<String>>,

    /// Assistant used when a create-thread request names none.
    pub default_assistant_id: String,

    /// Budget for metadata calls (history, state).
    pub default_timeout_secs: u64,

    /// Budget for thread provisioning.
    pub thread_timeout_secs: u64,

    /// Budget for run-and-wait, and the idle budget between streamed chunks.
    pub run_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:2024".into(),
            service_token: None,
            default_assistant_id: "intelligent_deep_assistant".into(),
            default_timeout_secs: 10,
            thread_timeout_secs: 15,
            run_timeout_secs: 60,
        }
    }
}

/// Bearer credential verification.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret shared with the token issuer.
    pub jwt_secret: Option<Secret<String>>,

    /// Lifetime of tokens minted by `agentgate token issue`.
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite path, or `:memory:`.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "agentgate.db".into(),
        }
    }
}

impl DatabaseConfig {
    /// sqlx connection URL for this database.
    pub fn url(&self) -> String {
        if self.path == ":memory:" {
            "sqlite::memory:".into()
        } else {
            format!("sqlite://{}?mode=rwc", self.path)
        }
    }
}
