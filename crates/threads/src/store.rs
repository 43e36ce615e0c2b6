//! Storage abstraction for thread records. Every operation is scoped to one
//! owner.

use async_trait::async_trait;

use crate::record::{NewThread, ThreadRecord};

#[derive(Debug, thiserror::Error)]
pub enum ThreadError {
    /// Not owned by this principal, or not registered at all.
    #[error("thread is not accessible")]
    Forbidden,
    #[error("thread not found")]
    NotFound,
    #[error("thread {0} is already registered")]
    Duplicate(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn find(&self, owner_id: i64, thread_id: &str)
    -> Result<Option<ThreadRecord>, ThreadError>;

    async fn create(&self, thread: NewThread) -> Result<ThreadRecord, ThreadError>;

    /// Owner's threads, most recently updated first.
    async fn list(&self, owner_id: i64) -> Result<Vec<ThreadRecord>, ThreadError>;

    /// Replace the title. `None` leaves the record untouched.
    async fn set_title(
        &self,
        owner_id: i64,
        thread_id: &str,
        title: Option<String>,
    ) -> Result<ThreadRecord, ThreadError>;

    async fn delete(&self, owner_id: i64, thread_id: &str) -> Result<(), ThreadError>;

    /// Whether `owner_id` registered `thread_id`. Callers that go on to use
    /// the record should call [`ThreadStore::owned`] instead.
    async fn is_owner(&self, owner_id: i64, thread_id: &str) -> Result<bool, ThreadError> {
        Ok(self.find(owner_id, thread_id).await?.is_some())
    }

    /// Ownership gate for thread-scoped operations: the `is_owner` check plus
    /// the record, in one lookup. Foreign and unknown ids both fail with
    /// [`ThreadError::Forbidden`].
    async fn owned(&self, owner_id: i64, thread_id: &str) -> Result<ThreadRecord, ThreadError> {
        self.find(owner_id, thread_id)
            .await?
            .ok_or(ThreadError::Forbidden)
    }
}
