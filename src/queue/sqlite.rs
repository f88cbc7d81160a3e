//! SQLite-backed durable queue.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{QueueError, Result, UrlList};
use crate::models::{url_hash, ErrorKind, UrlRecord};

const DEFAULT_TABLE: &str = "url";

/// Durable [`UrlList`] over a SQLite table keyed by the URL's SHA-1 hash.
///
/// The database file may be shared by several crawler processes: the
/// dequeue protocol claims a row with a conditional update and retries on
/// collision, so each entry is dispatched at most once across all of them.
/// WAL mode plus a busy timeout keep concurrent readers and the single
/// writer from tripping over each other.
pub struct DbUrlList {
    db_path: PathBuf,
    table: String,
}

impl DbUrlList {
    /// Open (or create) a queue at `db_path` using the default table.
    pub fn open(db_path: &Path) -> Result<Self> {
        Self::with_table(db_path, DEFAULT_TABLE)
    }

    /// Open (or create) a queue using a custom table name.
    pub fn with_table(db_path: &Path, table: &str) -> Result<Self> {
        let list = Self {
            db_path: db_path.to_path_buf(),
            table: table.to_string(),
        };
        list.init_schema()?;
        Ok(list)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;

        // WAL mode allows one writer alongside readers, which is what the
        // multi-process dequeue protocol needs. These settings persist per
        // database, so this is effectively a one-time setup.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 30000;
        "#,
        )?;

        Ok(conn)
    }

    /// Runs once at construction; every later operation skips the
    /// migration check.
    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url_hash TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL,
                status_code INTEGER,
                error_code TEXT,
                error_message TEXT,
                num_errors INTEGER NOT NULL DEFAULT 0,
                crawled INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_crawled
                ON {table}(crawled);
        "#,
            table = self.table
        ))?;
        Ok(())
    }

    fn insert_record(&self, conn: &Connection, record: &UrlRecord) -> Result<()> {
        conn.execute(
            &format!(
                r#"
                INSERT OR IGNORE INTO {table}
                    (url_hash, url, status_code, error_code, error_message, num_errors, crawled)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
                "#,
                table = self.table
            ),
            params![
                url_hash(&record.url),
                record.url,
                record.status_code,
                record.error_kind.map(|k| k.as_str()),
                record.error_message,
                record.num_errors,
            ],
        )?;
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, UrlRecord)> {
    let id: i64 = row.get(0)?;
    let error_code: Option<String> = row.get(3)?;
    Ok((
        id,
        UrlRecord {
            url: row.get(1)?,
            status_code: row.get(2)?,
            error_kind: error_code.as_deref().map(ErrorKind::from_str),
            error_message: row.get(4)?,
            num_errors: row.get(5)?,
        },
    ))
}

#[async_trait]
impl UrlList for DbUrlList {
    async fn insert_if_not_exists(&self, record: UrlRecord) -> Result<()> {
        let conn = self.connect()?;
        self.insert_record(&conn, &record)
    }

    async fn insert_if_not_exists_bulk(&self, records: Vec<UrlRecord>) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        for record in &records {
            self.insert_record(&tx, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn get_next_url(&self) -> Result<UrlRecord> {
        let conn = self.connect()?;
        loop {
            // Oldest unclaimed row first, FIFO by insertion id.
            let next = conn
                .query_row(
                    &format!(
                        r#"
                        SELECT id, url, status_code, error_code, error_message, num_errors
                        FROM {table}
                        WHERE crawled = 0
                        ORDER BY id ASC
                        LIMIT 1
                        "#,
                        table = self.table
                    ),
                    [],
                    row_to_record,
                )
                .optional()?;

            let (id, record) = match next {
                Some(found) => found,
                None => return Err(QueueError::Empty),
            };

            // Optimistic claim: another worker may have taken the row
            // between the select and this update.
            let claimed = conn.execute(
                &format!(
                    "UPDATE {table} SET crawled = 1 WHERE id = ?1 AND crawled = 0",
                    table = self.table
                ),
                params![id],
            )?;

            if claimed == 0 {
                debug!(url = %record.url, "lost dequeue race, retrying");
                continue;
            }
            return Ok(record);
        }
    }

    async fn upsert(&self, record: UrlRecord) -> Result<()> {
        let conn = self.connect()?;
        let hash = url_hash(&record.url);

        let num_errors: u32 = if record.error_kind.is_none() {
            0
        } else {
            let prior: Option<u32> = conn
                .query_row(
                    &format!(
                        "SELECT num_errors FROM {table} WHERE url_hash = ?1",
                        table = self.table
                    ),
                    params![hash],
                    |row| row.get(0),
                )
                .optional()?;
            prior.unwrap_or(0) + 1
        };

        conn.execute(
            &format!(
                r#"
                INSERT INTO {table}
                    (url_hash, url, status_code, error_code, error_message, num_errors, crawled)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
                ON CONFLICT(url_hash) DO UPDATE SET
                    status_code = excluded.status_code,
                    error_code = excluded.error_code,
                    error_message = excluded.error_message,
                    num_errors = excluded.num_errors,
                    crawled = 1
                "#,
                table = self.table
            ),
            params![
                hash,
                record.url,
                record.status_code,
                record.error_kind.map(|k| k.as_str()),
                record.error_message,
                num_errors,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_list() -> (TempDir, DbUrlList) {
        let dir = TempDir::new().unwrap();
        let list = DbUrlList::open(&dir.path().join("queue.db")).unwrap();
        (dir, list)
    }

    #[tokio::test]
    async fn round_trips_a_record() {
        let (_dir, list) = temp_list();
        list.insert_if_not_exists(UrlRecord::new("http://a/"))
            .await
            .unwrap();
        let record = list.get_next_url().await.unwrap();
        assert_eq!(record.url, "http://a/");
        assert!(matches!(
            list.get_next_url().await,
            Err(QueueError::Empty)
        ));
    }

    #[tokio::test]
    async fn insert_is_idempotent_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.db");
        {
            let list = DbUrlList::open(&path).unwrap();
            list.insert_if_not_exists(UrlRecord::new("http://a/"))
                .await
                .unwrap();
        }
        let list = DbUrlList::open(&path).unwrap();
        list.insert_if_not_exists(UrlRecord::new("http://a/"))
            .await
            .unwrap();
        list.get_next_url().await.unwrap();
        assert!(matches!(
            list.get_next_url().await,
            Err(QueueError::Empty)
        ));
    }

    #[tokio::test]
    async fn bulk_insert_preserves_order_and_dedups() {
        let (_dir, list) = temp_list();
        list.insert_if_not_exists(UrlRecord::new("http://a/"))
            .await
            .unwrap();
        list.insert_if_not_exists_bulk(vec![
            UrlRecord::new("http://b/"),
            UrlRecord::new("http://a/"),
            UrlRecord::new("http://c/"),
        ])
        .await
        .unwrap();

        assert_eq!(list.get_next_url().await.unwrap().url, "http://a/");
        assert_eq!(list.get_next_url().await.unwrap().url, "http://b/");
        assert_eq!(list.get_next_url().await.unwrap().url, "http://c/");
        assert!(matches!(
            list.get_next_url().await,
            Err(QueueError::Empty)
        ));
    }

    #[tokio::test]
    async fn upsert_tracks_error_counts() {
        let (_dir, list) = temp_list();
        list.insert_if_not_exists(UrlRecord::new("http://a/"))
            .await
            .unwrap();
        list.get_next_url().await.unwrap();

        let failed = UrlRecord::failure(
            "http://a/",
            ErrorKind::RequestError,
            None,
            "connect timed out",
        );
        list.upsert(failed.clone()).await.unwrap();
        list.upsert(failed).await.unwrap();

        let conn = list.connect().unwrap();
        let (errors, code): (u32, String) = conn
            .query_row(
                "SELECT num_errors, error_code FROM url WHERE url = 'http://a/'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(errors, 2);
        assert_eq!(code, "REQUEST_ERROR");

        list.upsert(UrlRecord::success("http://a/", 200)).await.unwrap();
        let (errors, code): (u32, Option<String>) = conn
            .query_row(
                "SELECT num_errors, error_code FROM url WHERE url = 'http://a/'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(errors, 0);
        assert_eq!(code, None);
    }

    #[tokio::test]
    async fn upsert_creates_missing_rows_as_crawled() {
        let (_dir, list) = temp_list();
        list.upsert(UrlRecord::success("http://a/", 200)).await.unwrap();
        assert!(matches!(
            list.get_next_url().await,
            Err(QueueError::Empty)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn two_handles_never_dequeue_the_same_url() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.db");
        let seeds: Vec<UrlRecord> = (0..50)
            .map(|i| UrlRecord::new(format!("http://shared/{i}")))
            .collect();

        let seeder = DbUrlList::open(&path).unwrap();
        seeder.insert_if_not_exists_bulk(seeds).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..2 {
            let list = DbUrlList::open(&path).unwrap();
            tasks.push(tokio::spawn(async move {
                let mut taken = Vec::new();
                loop {
                    match list.get_next_url().await {
                        Ok(record) => taken.push(record.url),
                        Err(QueueError::Empty) => break,
                        Err(err) => panic!("dequeue failed: {err}"),
                    }
                }
                taken
            }));
        }

        let mut all = Vec::new();
        for task in tasks {
            all.extend(task.await.unwrap());
        }
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(total, 50, "every URL dispatched exactly once");
        assert_eq!(all.len(), 50, "no URL dispatched twice");
    }
}
