use std::time::{SystemTime, UNIX_EPOCH};

use {async_trait::async_trait, tracing::debug};

use crate::{
    record::{NewThread, ThreadRecord},
    store::{ThreadError, ThreadStore},
};

/// SQLite-backed thread store.
pub struct SqliteThreadStore {
    pool: sqlx::SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ThreadRow {
    id: i64,
    thread_id: String,
    owner_id: i64,
    assistant_id: String,
    title: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl From<ThreadRow> for ThreadRecord {
    fn from(r: ThreadRow) -> Self {
        Self {
            id: r.id,
            thread_id: r.thread_id,
            owner_id: r.owner_id,
            assistant_id: r.assistant_id,
            title: r.title,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

impl SqliteThreadStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `threads` table if it doesn't exist.
    pub async fn init(pool: &sqlx::SqlitePool) -> Result<(), ThreadError> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS threads (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id    TEXT NOT NULL UNIQUE,
                owner_id     INTEGER NOT NULL,
                assistant_id TEXT NOT NULL,
                title        TEXT,
                created_at   INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_threads_owner ON threads(owner_id, updated_at)")
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ThreadStore for SqliteThreadStore {
    async fn find(
        &self,
        owner_id: i64,
        thread_id: &str,
    ) -> Result<Option<ThreadRecord>, ThreadError> {
        let row = sqlx::query_as::<_, ThreadRow>(
            "SELECT * FROM threads WHERE owner_id = ? AND thread_id = ?",
        )
        .bind(owner_id)
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn create(&self, thread: NewThread) -> Result<ThreadRecord, ThreadError> {
        let now = now_ms();
        let inserted = sqlx::query(
            r#"INSERT INTO threads (thread_id, owner_id, assistant_id, title, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&thread.thread_id)
        .bind(thread.owner_id)
        .bind(&thread.assistant_id)
        .bind(&thread.title)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {},
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(ThreadError::Duplicate(thread.thread_id));
            },
            Err(e) => return Err(e.into()),
        }

        debug!(owner_id = thread.owner_id, thread_id = %thread.thread_id, "thread registered");
        self.find(thread.owner_id, &thread.thread_id)
            .await?
            .ok_or(ThreadError::NotFound)
    }

    async fn list(&self, owner_id: i64) -> Result<Vec<ThreadRecord>, ThreadError> {
        let rows = sqlx::query_as::<_, ThreadRow>(
            "SELECT * FROM threads WHERE owner_id = ? ORDER BY updated_at DESC, id DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn set_title(
        &self,
        owner_id: i64,
        thread_id: &str,
        title: Option<String>,
    ) -> Result<ThreadRecord, ThreadError> {
        if let Some(title) = title {
            let updated = sqlx::query(
                "UPDATE threads SET title = ?, updated_at = ? WHERE owner_id = ? AND thread_id = ?",
            )
            .bind(&title)
            .bind(now_ms())
            .bind(owner_id)
            .bind(thread_id)
            .execute(&self.pool)
            .await?;
            if updated.rows_affected() == 0 {
                return Err(ThreadError::NotFound);
            }
        }
        self.find(owner_id, thread_id)
            .await?
            .ok_or(ThreadError::NotFound)
    }

    async fn delete(&self, owner_id: i64, thread_id: &str) -> Result<(), ThreadError> {
        let deleted = sqlx::query("DELETE FROM threads WHERE owner_id = ? AND thread_id = ?")
            .bind(owner_id)
            .bind(thread_id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(ThreadError::NotFound);
        }
        Ok(())
    }
}
