use {
    async_trait::async_trait,
    tracing::{debug, warn},
};

use crate::record::{NewUsage, UsageRecord};

/// Append-only destination for per-run usage.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record(&self, usage: NewUsage) -> anyhow::Result<()>;
}

/// A sink whose rows can be read back, scoped to one principal.
#[async_trait]
pub trait UsageStore: UsageSink {
    /// Rows for `principal_id`, newest first.
    async fn list(&self, principal_id: i64) -> anyhow::Result<Vec<UsageRecord>>;
}

/// Append `usage`, logging and dropping any failure.
pub async fn record_best_effort(sink: &dyn UsageSink, usage: NewUsage) {
    let principal_id = usage.principal_id;
    let thread_id = usage.thread_id.clone();
    let total_tokens = usage.total_tokens;
    match sink.record(usage).await {
        Ok(()) => debug!(principal_id, %thread_id, total_tokens, "usage recorded"),
        Err(e) => warn!(principal_id, %thread_id, error = %e, "failed to record usage"),
    }
}
