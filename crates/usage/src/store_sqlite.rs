use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::{
    record::{NewUsage, UsageRecord},
    sink::{UsageSink, UsageStore},
};

/// SQLite-backed usage ledger.
pub struct SqliteUsageStore {
    pool: sqlx::SqlitePool,
}

#[derive(sqlx::FromRow)]
struct UsageRow {
    id: i64,
    principal_id: i64,
    thread_id: String,
    assistant_id: String,
    input_tokens: i64,
    output_tokens: i64,
    total_tokens: i64,
    model_name: Option<String>,
    created_at: i64,
}

impl From<UsageRow> for UsageRecord {
    fn from(r: UsageRow) -> Self {
        Self {
            id: r.id,
            principal_id: r.principal_id,
            thread_id: r.thread_id,
            assistant_id: r.assistant_id,
            input_tokens: r.input_tokens,
            output_tokens: r.output_tokens,
            total_tokens: r.total_tokens,
            model_name: r.model_name,
            created_at: r.created_at,
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

impl SqliteUsageStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `usage_records` table if it doesn't exist.
    pub async fn init(pool: &sqlx::SqlitePool) -> anyhow::Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS usage_records (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                principal_id  INTEGER NOT NULL,
                thread_id     TEXT NOT NULL,
                assistant_id  TEXT NOT NULL,
                input_tokens  INTEGER NOT NULL DEFAULT 0,
                output_tokens INTEGER NOT NULL DEFAULT 0,
                total_tokens  INTEGER NOT NULL DEFAULT 0,
                model_name    TEXT,
                created_at    INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_usage_principal ON usage_records(principal_id, created_at)",
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UsageSink for SqliteUsageStore {
    async fn record(&self, usage: NewUsage) -> anyhow::Result<()> {
        sqlx::query(
            r#"INSERT INTO usage_records
               (principal_id, thread_id, assistant_id, input_tokens, output_tokens, total_tokens, model_name, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(usage.principal_id)
        .bind(&usage.thread_id)
        .bind(&usage.assistant_id)
        .bind(usage.input_tokens)
        .bind(usage.output_tokens)
        .bind(usage.total_tokens)
        .bind(&usage.model_name)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UsageStore for SqliteUsageStore {
    async fn list(&self, principal_id: i64) -> anyhow::Result<Vec<UsageRecord>> {
        let rows = sqlx::query_as::<_, UsageRow>(
            "SELECT * FROM usage_records WHERE principal_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(principal_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
