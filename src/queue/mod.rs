//! URL queue backends.
//!
//! A [`UrlList`] owns every URL the crawler knows about: pending entries,
//! dispatched entries, and their recorded outcomes. Backends guarantee
//! at-most-once dispatch: any URL is returned by at most one
//! [`UrlList::get_next_url`] call across all concurrent callers.

mod fifo;
mod sqlite;

pub use fifo::FifoUrlList;
pub use sqlite::DbUrlList;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::UrlRecord;

#[derive(Error, Debug)]
pub enum QueueError {
    /// No entry with `crawled = false` remains.
    #[error("url queue is empty")]
    Empty,
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// Capability interface over a URL queue.
///
/// Implementations must be internally safe for concurrent callers; they
/// are the sole owners of queue state.
#[async_trait]
pub trait UrlList: Send + Sync {
    /// Add `record` unless its URL is already present. Idempotent; a
    /// duplicate is a no-op, never an error.
    async fn insert_if_not_exists(&self, record: UrlRecord) -> Result<()>;

    /// Bulk variant of [`UrlList::insert_if_not_exists`]. The provided
    /// implementation inserts per record; backends that can do better
    /// (one round-trip to the store) override it.
    async fn insert_if_not_exists_bulk(&self, records: Vec<UrlRecord>) -> Result<()> {
        for record in records {
            self.insert_if_not_exists(record).await?;
        }
        Ok(())
    }

    /// Return one entry with `crawled = false`, atomically transitioning
    /// it to `crawled = true`. Fails with [`QueueError::Empty`] when no
    /// such entry exists. Concurrent calls return distinct entries.
    async fn get_next_url(&self) -> Result<UrlRecord>;

    /// Store the outcome for the record's URL, creating the entry if
    /// missing. `num_errors` increments on failure and resets to zero on
    /// success, regardless of the value carried by `record`.
    async fn upsert(&self, record: UrlRecord) -> Result<()>;
}
