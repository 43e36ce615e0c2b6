//! Token-usage accounting for proxied runs.
//!
//! [`SseUsageExtractor`] watches a relayed event stream chunk by chunk and
//! keeps the most recent `usage_metadata` object it has seen. When the run
//! ends, the result is appended through a [`UsageSink`]; sink failures are
//! logged and dropped.

pub mod extractor;
pub mod record;
pub mod sink;
pub mod store_sqlite;

pub use {
    extractor::{ExtractedUsage, SseUsageExtractor, USAGE_KEY, find_usage},
    record::{NewUsage, UsageRecord},
    sink::{UsageSink, UsageStore, record_best_effort},
    store_sqlite::SqliteUsageStore,
};
