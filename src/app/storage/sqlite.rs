//! SQLite-backed download store
//!
//! Counter updates are single SQL statements (`INSERT ... ON CONFLICT DO UPDATE` and
//! a guarded `UPDATE ... WHERE bonus_downloads > 0`), so they stay atomic when a
//! second process such as the admin dashboard writes to the same database file.
//! Writers take the write lock up front (`BEGIN IMMEDIATE`) so a busy database is
//! waited on instead of failing mid-transaction. Blocking driver calls run on the
//! tokio blocking pool.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use crate::app::collaborators::DownloadStore;
use crate::app::models::{DownloadRecord, Period, PremiumStatus, TopTrack, UserId};
use crate::constants::storage::DATE_KEY_FORMAT;
use crate::errors::{StorageError, StorageResult};

/// Format of timestamps written by this store; matches SQLite's `CURRENT_TIMESTAMP`
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format of premium expiries: naive local time, readable by the admin dashboard
const PREMIUM_UNTIL_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// How long a writer waits on a lock held by another connection
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        is_premium INTEGER NOT NULL DEFAULT 0,
        premium_until TEXT,
        bonus_downloads INTEGER NOT NULL DEFAULT 0,
        downloads INTEGER NOT NULL DEFAULT 0,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS downloads (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        track_id TEXT NOT NULL,
        title TEXT NOT NULL,
        artist TEXT,
        duration INTEGER,
        downloaded_at TEXT NOT NULL,
        FOREIGN KEY (user_id) REFERENCES users(id)
    );

    CREATE TABLE IF NOT EXISTS track_stats (
        track_id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        artist TEXT,
        download_count INTEGER NOT NULL DEFAULT 0,
        last_downloaded TEXT
    );

    CREATE TABLE IF NOT EXISTS daily_downloads (
        user_id INTEGER NOT NULL,
        download_date TEXT NOT NULL,
        count INTEGER NOT NULL DEFAULT 1,
        UNIQUE(user_id, download_date)
    );

    CREATE INDEX IF NOT EXISTS idx_downloads_user_id ON downloads(user_id);
    CREATE INDEX IF NOT EXISTS idx_downloads_date ON downloads(downloaded_at);
    CREATE INDEX IF NOT EXISTS idx_track_stats_count ON track_stats(download_count DESC);
";

/// [`DownloadStore`] over a single SQLite connection
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply the schema
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let open_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || -> StorageResult<Connection> {
            let conn = Connection::open(&open_path)?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            let _mode: String =
                conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|e| StorageError::TaskFailed(e.to_string()))??;

        info!("Opened download database at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Database file path, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the connection on the blocking pool
    async fn call<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StorageError::LockPoisoned)?;
            f(&mut *guard)
        })
        .await
        .map_err(|e| StorageError::TaskFailed(e.to_string()))?
    }
}

fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

fn premium_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .naive_local()
        .format(PREMIUM_UNTIL_FORMAT)
        .to_string()
}

fn to_u32(field: &str, value: i64) -> StorageResult<u32> {
    u32::try_from(value).map_err(|_| StorageError::CorruptValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Parse a stored premium expiry
///
/// Accepts RFC 3339 and the naive ISO forms older rows were written with; naive
/// values are local wall-clock time.
fn parse_premium_until(value: &str) -> StorageResult<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| StorageError::CorruptValue {
            field: "users.premium_until".to_string(),
            value: value.to_string(),
        })
}

fn ensure_user(conn: &Connection, user_id: UserId) -> rusqlite::Result<usize> {
    conn.execute("INSERT OR IGNORE INTO users (id) VALUES (?1)", params![user_id])
}

#[async_trait]
impl DownloadStore for SqliteStore {
    async fn record_download(&self, record: &DownloadRecord) -> StorageResult<()> {
        let record = record.clone();
        self.call(move |conn| {
            let now = timestamp(Utc::now());
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            ensure_user(&tx, record.user_id)?;
            tx.execute(
                "INSERT INTO downloads (user_id, track_id, title, artist, duration, downloaded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.user_id,
                    record.track_id,
                    record.title,
                    record.artist,
                    record.duration_seconds,
                    now
                ],
            )?;
            tx.execute(
                "UPDATE users SET downloads = downloads + 1 WHERE id = ?1",
                params![record.user_id],
            )?;
            tx.execute(
                "INSERT INTO track_stats (track_id, title, artist, download_count, last_downloaded)
                 VALUES (?1, ?2, ?3, 1, ?4)
                 ON CONFLICT(track_id) DO UPDATE SET
                     download_count = download_count + 1,
                     title = excluded.title,
                     artist = excluded.artist,
                     last_downloaded = excluded.last_downloaded",
                params![record.track_id, record.title, record.artist, now],
            )?;
            tx.commit()?;
            debug!("Recorded download of {} for user {}", record.track_id, record.user_id);
            Ok(())
        })
        .await
    }

    async fn increment_daily_count(&self, user_id: UserId, date: NaiveDate) -> StorageResult<u32> {
        let key = date_key(date);
        self.call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let count: i64 = tx.query_row(
                "INSERT INTO daily_downloads (user_id, download_date, count) VALUES (?1, ?2, 1)
                 ON CONFLICT(user_id, download_date) DO UPDATE SET count = count + 1
                 RETURNING count",
                params![user_id, key],
                |row| row.get(0),
            )?;
            tx.commit()?;
            to_u32("daily_downloads.count", count)
        })
        .await
    }

    async fn get_daily_count(&self, user_id: UserId, date: NaiveDate) -> StorageResult<u32> {
        let key = date_key(date);
        self.call(move |conn| {
            let count: Option<i64> = conn
                .query_row(
                    "SELECT count FROM daily_downloads WHERE user_id = ?1 AND download_date = ?2",
                    params![user_id, key],
                    |row| row.get(0),
                )
                .optional()?;
            to_u32("daily_downloads.count", count.unwrap_or(0))
        })
        .await
    }

    async fn get_bonus_credits(&self, user_id: UserId) -> StorageResult<u32> {
        self.call(move |conn| {
            let credits: Option<i64> = conn
                .query_row(
                    "SELECT bonus_downloads FROM users WHERE id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()?;
            to_u32("users.bonus_downloads", credits.unwrap_or(0))
        })
        .await
    }

    async fn consume_bonus_credit(&self, user_id: UserId) -> StorageResult<bool> {
        self.call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let changed = tx.execute(
                "UPDATE users SET bonus_downloads = bonus_downloads - 1
                 WHERE id = ?1 AND bonus_downloads > 0",
                params![user_id],
            )?;
            tx.commit()?;
            Ok(changed == 1)
        })
        .await
    }

    async fn get_premium_status(&self, user_id: UserId) -> StorageResult<PremiumStatus> {
        self.call(move |conn| {
            let row: Option<(bool, Option<String>)> = conn
                .query_row(
                    "SELECT is_premium, premium_until FROM users WHERE id = ?1",
                    params![user_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match row {
                None => Ok(PremiumStatus::default()),
                Some((is_premium, until)) => Ok(PremiumStatus {
                    is_premium,
                    until: until
                        .as_deref()
                        .filter(|value| !value.is_empty())
                        .map(parse_premium_until)
                        .transpose()?,
                }),
            }
        })
        .await
    }

    async fn add_bonus_credits(&self, user_id: UserId, amount: u32) -> StorageResult<u32> {
        self.call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            ensure_user(&tx, user_id)?;
            let credits: i64 = tx.query_row(
                "UPDATE users SET bonus_downloads = bonus_downloads + ?2 WHERE id = ?1
                 RETURNING bonus_downloads",
                params![user_id, amount],
                |row| row.get(0),
            )?;
            tx.commit()?;
            to_u32("users.bonus_downloads", credits)
        })
        .await
    }

    async fn set_premium(&self, user_id: UserId, until: Option<DateTime<Utc>>) -> StorageResult<()> {
        let until = until.map(premium_timestamp);
        self.call(move |conn| {
            ensure_user(conn, user_id)?;
            conn.execute(
                "UPDATE users SET is_premium = 1, premium_until = ?2 WHERE id = ?1",
                params![user_id, until],
            )?;
            Ok(())
        })
        .await
    }

    async fn top_tracks(&self, period: Period, limit: usize) -> StorageResult<Vec<TopTrack>> {
        let since = period.since(Utc::now()).map(timestamp);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.call(move |conn| {
            let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<TopTrack> {
                Ok(TopTrack {
                    track_id: row.get(0)?,
                    title: row.get(1)?,
                    artist: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    download_count: row.get::<_, i64>(3)?.max(0) as u64,
                })
            };

            let chart = match since {
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT track_id, title, artist, download_count FROM track_stats
                         ORDER BY download_count DESC, track_id ASC LIMIT ?1",
                    )?;
                    let rows = stmt.query_map(params![limit], map_row)?;
                    let chart = rows.collect::<rusqlite::Result<Vec<_>>>()?;
                    chart
                }
                Some(since) => {
                    let mut stmt = conn.prepare(
                        "SELECT track_id, MAX(title), MAX(artist), COUNT(*) AS hits FROM downloads
                         WHERE downloaded_at >= ?1
                         GROUP BY track_id
                         ORDER BY hits DESC, track_id ASC LIMIT ?2",
                    )?;
                    let rows = stmt.query_map(params![since, limit], map_row)?;
                    let chart = rows.collect::<rusqlite::Result<Vec<_>>>()?;
                    chart
                }
            };
            Ok(chart)
        })
        .await
    }
}
