//! In-memory FIFO queue backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{QueueError, Result, UrlList};
use crate::models::UrlRecord;

struct Entry {
    record: UrlRecord,
    crawled: bool,
}

#[derive(Default)]
struct Inner {
    /// Append-only, insertion order preserved.
    entries: Vec<Entry>,
    /// URL -> position in `entries`.
    index: HashMap<String, usize>,
    /// Scan start for the next dequeue; everything before it is crawled.
    cursor: usize,
}

/// In-memory [`UrlList`]: insertion-ordered, deduplicated by URL.
///
/// Dequeue is serialised through a mutex, so within one process the
/// at-most-once guarantee holds. State is lost on drop; use
/// [`DbUrlList`](super::DbUrlList) for resumable or multi-process crawls.
#[derive(Default)]
pub struct FifoUrlList {
    inner: Mutex<Inner>,
}

impl FifoUrlList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the stored record for `url`, if any.
    pub async fn get(&self, url: &str) -> Option<UrlRecord> {
        let inner = self.inner.lock().await;
        inner
            .index
            .get(url)
            .map(|&pos| inner.entries[pos].record.clone())
    }

    /// Number of entries, crawled or not.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }
}

#[async_trait]
impl UrlList for FifoUrlList {
    async fn insert_if_not_exists(&self, record: UrlRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.index.contains_key(&record.url) {
            return Ok(());
        }
        let pos = inner.entries.len();
        inner.index.insert(record.url.clone(), pos);
        inner.entries.push(Entry {
            record,
            crawled: false,
        });
        Ok(())
    }

    async fn get_next_url(&self) -> Result<UrlRecord> {
        let mut inner = self.inner.lock().await;
        while inner.cursor < inner.entries.len() {
            let pos = inner.cursor;
            inner.cursor += 1;
            let entry = &mut inner.entries[pos];
            if !entry.crawled {
                entry.crawled = true;
                return Ok(entry.record.clone());
            }
        }
        Err(QueueError::Empty)
    }

    async fn upsert(&self, record: UrlRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let existing = inner.index.get(&record.url).copied();
        let num_errors = match (record.error_kind, existing) {
            (None, _) => 0,
            (Some(_), Some(pos)) => inner.entries[pos].record.num_errors + 1,
            (Some(_), None) => 1,
        };
        let record = UrlRecord {
            num_errors,
            ..record
        };
        match existing {
            Some(pos) => inner.entries[pos].record = record,
            None => {
                // An outcome for a URL we never queued: store it as
                // already dispatched so it is not crawled again.
                let pos = inner.entries.len();
                inner.index.insert(record.url.clone(), pos);
                inner.entries.push(Entry {
                    record,
                    crawled: true,
                });
            }
        }
        Ok(())
    }
}
