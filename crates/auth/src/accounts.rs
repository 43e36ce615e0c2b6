use {async_trait::async_trait, serde::Serialize};

/// An authenticated account identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    /// Elevated-access flag, read from the account row on every request.
    pub is_staff: bool,
}

/// Read-only view of the external account store.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look up a live (existing, active) account by id.
    async fn find(&self, id: i64) -> anyhow::Result<Option<Principal>>;
}

// ── SQLite-backed account store ─────────────────────────────────────────────

/// Accounts live in the `accounts` table, written by the account service.
pub struct SqliteAccountStore {
    pool: sqlx::SqlitePool,
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: i64,
    username: String,
    is_staff: i32,
}

impl From<AccountRow> for Principal {
    fn from(r: AccountRow) -> Self {
        Self {
            id: r.id,
            username: r.username,
            is_staff: r.is_staff != 0,
        }
    }
}

impl SqliteAccountStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `accounts` table if it doesn't exist.
    pub async fn init(pool: &sqlx::SqlitePool) -> anyhow::Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS accounts (
                id        INTEGER PRIMARY KEY,
                username  TEXT NOT NULL UNIQUE,
                is_staff  INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn find(&self, id: i64) -> anyhow::Result<Option<Principal>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, username, is_staff FROM accounts WHERE id = ? AND is_active = 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pool() -> sqlx::SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteAccountStore::init(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn finds_active_account() {
        let pool = pool().await;
        sqlx::query("INSERT INTO accounts (id, username, is_staff) VALUES (7, 'alice', 1)")
            .execute(&pool)
            .await
            .unwrap();

        let store = SqliteAccountStore::new(pool);
        let principal = store.find(7).await.unwrap().unwrap();
        assert_eq!(principal, Principal {
            id: 7,
            username: "alice".into(),
            is_staff: true,
        });
    }

    #[tokio::test]
    async fn inactive_and_missing_accounts_are_absent() {
        let pool = pool().await;
        sqlx::query("INSERT INTO accounts (id, username, is_active) VALUES (1, 'gone', 0)")
            .execute(&pool)
            .await
            .unwrap();

        let store = SqliteAccountStore::new(pool);
        assert!(store.find(1).await.unwrap().is_none());
        assert!(store.find(2).await.unwrap().is_none());
    }
}
