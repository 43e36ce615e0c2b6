use serde::Serialize;

/// Binds an upstream thread to its owning principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadRecord {
    pub id: i64,
    pub thread_id: String,
    #[serde(skip)]
    pub owner_id: i64,
    pub assistant_id: String,
    pub title: Option<String>,
    /// Epoch milliseconds.
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields supplied when registering a freshly provisioned thread.
#[derive(Debug, Clone)]
pub struct NewThread {
    pub owner_id: i64,
    pub thread_id: String,
    pub assistant_id: String,
    pub title: Option<String>,
}
