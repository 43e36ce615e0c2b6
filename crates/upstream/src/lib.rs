//! Client for the upstream agent-execution service.
//!
//! Every call carries the gateway's own service credential, never the
//! caller's, and is attempted exactly once.

pub mod client;
pub mod error;

pub use {
    client::{Timeouts, UpstreamClient},
    error::UpstreamError,
};
