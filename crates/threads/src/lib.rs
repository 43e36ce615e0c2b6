//! Per-principal thread records and the ownership check that gates every
//! thread-scoped operation.
//!
//! An upstream thread id belongs to at most one principal. Lookups are always
//! filtered by owner, so a thread owned by someone else is indistinguishable
//! from one that does not exist.

pub mod record;
pub mod store;
pub mod store_sqlite;

pub use {
    record::{NewThread, ThreadRecord},
    store::{ThreadError, ThreadStore},
    store_sqlite::SqliteThreadStore,
};
