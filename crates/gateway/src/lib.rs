//! Gateway: authenticated HTTP surface in front of the upstream agent service.
//!
//! Lifecycle:
//! 1. Load config, open the database, create tables
//! 2. Build the credential validator, thread store, usage ledger and upstream client
//! 3. Serve the `/api` routes
//!
//! Thread-scoped routes go through [`proxy::ProxyEngine`], which checks
//! ownership before any upstream call and meters streamed runs.

pub mod api;
pub mod error;
pub mod extract;
pub mod proxy;
pub mod server;
pub mod state;

pub use {
    error::GatewayError,
    server::{AppState, build_gateway_app, start_gateway},
    state::{GatewayState, open_database},
};
