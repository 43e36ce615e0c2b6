//! Configuration discovery and loading for the gateway.
//!
//! Config files are `agentgate.{toml,yaml,yml,json}`, searched in the working
//! directory and then in `~/.config/agentgate/`. `${ENV_VAR}` placeholders are
//! substituted before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{clear_config_dir, config_dir, discover_and_load, load_config, set_config_dir},
    schema::{AuthConfig, DatabaseConfig, GatewayConfig, ServerConfig, UpstreamConfig},
};
