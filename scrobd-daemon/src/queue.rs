//! Durable scrobble queue backed by SQLite
//!
//! At-least-once buffer between the play accountant and the remote
//! service. Rows are keyed by an autoincrement id; delivery order is
//! oldest play-start timestamp first. Every mutation commits before
//! the call returns, so a process crash never loses an accepted
//! scrobble and never resurrects a submitted one.

use crate::error::Result;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;

/// Remote hard limit: scrobbles older than this are never accepted.
pub const REMOTE_ACCEPTANCE_WINDOW: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// One play record awaiting (or having completed) submission
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedScrobble {
    pub id: i64,
    pub track_name: String,
    pub artist: String,
    pub album: String,
    pub duration: Duration,
    /// Wall-clock instant the play started (what the remote records)
    pub timestamp: DateTime<Utc>,
    pub submitted: bool,
    pub error: String,
}

/// A new scrobble to enqueue
#[derive(Debug, Clone)]
pub struct Scrobble {
    pub track: String,
    pub artist: String,
    pub album: String,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

/// Persistent scrobble queue
///
/// The pool serializes writers through SQLite's own locking (WAL mode,
/// generous busy timeout), so `add` from the eligibility task and
/// `pending`/`mark_*` from the drain task can interleave freely.
pub struct ScrobbleQueue {
    pool: Pool<Sqlite>,
}

impl ScrobbleQueue {
    /// Open (creating if needed) the queue database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(10))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        let queue = Self { pool };
        queue.init_schema().await?;
        Ok(queue)
    }

    /// In-memory queue for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let queue = Self { pool };
        queue.init_schema().await?;
        Ok(queue)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scrobbles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                track_name TEXT NOT NULL,
                artist TEXT NOT NULL,
                album TEXT,
                duration_seconds INTEGER NOT NULL,
                timestamp_unix INTEGER NOT NULL,
                submitted BOOLEAN DEFAULT 0,
                error TEXT,
                created_at_unix INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_submitted ON scrobbles(submitted, timestamp_unix)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_timestamp ON scrobbles(timestamp_unix)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Append a scrobble; returns its queue id.
    pub async fn add(&self, scrobble: &Scrobble) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO scrobbles (track_name, artist, album, duration_seconds, timestamp_unix)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&scrobble.track)
        .bind(&scrobble.artist)
        .bind(&scrobble.album)
        .bind(scrobble.duration.as_secs() as i64)
        .bind(scrobble.timestamp.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Unsubmitted rows, oldest play first, up to `limit` (0 = all).
    pub async fn pending(&self, limit: u32) -> Result<Vec<QueuedScrobble>> {
        let mut query = String::from(
            r#"
            SELECT id, track_name, artist, COALESCE(album, ''), duration_seconds,
                   timestamp_unix, submitted, COALESCE(error, '')
            FROM scrobbles
            WHERE submitted = 0
            ORDER BY timestamp_unix ASC
            "#,
        );
        if limit > 0 {
            query.push_str(&format!(" LIMIT {}", limit));
        }

        let rows: Vec<(i64, String, String, String, i64, i64, bool, String)> =
            sqlx::query_as(&query).fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(row_to_scrobble).collect())
    }

    /// Every row, newest play first (introspection/tooling).
    pub async fn all(&self) -> Result<Vec<QueuedScrobble>> {
        let rows: Vec<(i64, String, String, String, i64, i64, bool, String)> = sqlx::query_as(
            r#"
            SELECT id, track_name, artist, COALESCE(album, ''), duration_seconds,
                   timestamp_unix, submitted, COALESCE(error, '')
            FROM scrobbles
            ORDER BY timestamp_unix DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_scrobble).collect())
    }

    /// Mark one row submitted and clear its error. Idempotent.
    pub async fn mark_submitted(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE scrobbles SET submitted = 1, error = NULL WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark a batch submitted in a single transaction.
    pub async fn mark_submitted_batch(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("UPDATE scrobbles SET submitted = 1, error = NULL WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Record a submission failure; the row stays pending.
    pub async fn mark_error(&self, id: i64, message: &str) -> Result<()> {
        sqlx::query("UPDATE scrobbles SET error = ? WHERE id = ?")
            .bind(message)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete submitted rows whose play started more than `max_age`
    /// ago. Returns the number of rows removed.
    pub async fn cleanup(&self, max_age: Duration) -> Result<u64> {
        let cutoff = Utc::now().timestamp() - max_age.as_secs() as i64;

        let result = sqlx::query("DELETE FROM scrobbles WHERE submitted = 1 AND timestamp_unix < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Delete failed rows older than the remote's 14-day acceptance
    /// window. The only policy-driven data loss: the remote would
    /// reject these plays anyway.
    pub async fn cleanup_old_failed(&self) -> Result<u64> {
        let cutoff = Utc::now().timestamp() - REMOTE_ACCEPTANCE_WINDOW.as_secs() as i64;

        let result = sqlx::query(
            r#"
            DELETE FROM scrobbles
            WHERE submitted = 0
              AND error IS NOT NULL
              AND timestamp_unix < ?
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Number of rows; pending only unless `include_submitted`.
    pub async fn count(&self, include_submitted: bool) -> Result<i64> {
        let query = if include_submitted {
            "SELECT COUNT(*) FROM scrobbles"
        } else {
            "SELECT COUNT(*) FROM scrobbles WHERE submitted = 0"
        };

        let count: i64 = sqlx::query_scalar(query).fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Close the pool, checkpointing WAL state.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_scrobble(row: (i64, String, String, String, i64, i64, bool, String)) -> QueuedScrobble {
    let (id, track_name, artist, album, duration, timestamp, submitted, error) = row;
    QueuedScrobble {
        id,
        track_name,
        artist,
        album,
        duration: Duration::from_secs(duration.max(0) as u64),
        timestamp: Utc
            .timestamp_opt(timestamp, 0)
            .single()
            .unwrap_or_else(Utc::now),
        submitted,
        error,
    }
}
