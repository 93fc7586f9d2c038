use crate::classify::Category;
use crate::config::Config;
use crate::error::StoreError;
use crate::model::{HistoryRow, StoredHistoryRow, SyncState};
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Builder, Connection, Database as LibsqlDatabase};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;

pub const SYNC_STATE_ID: i64 = 1;

/// SQLite caps bound parameters per statement; stay well under it.
const ID_LOOKUP_CHUNK: usize = 500;

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

const MIGRATIONS: &[(&str, &str)] = &[
    ("001_sync_state.sql", include_str!("migrations/001_sync_state.sql")),
    ("002_youtube_history.sql", include_str!("migrations/002_youtube_history.sql")),
];

/// Storage operations used by the sync routine and the HTTP surface.
#[async_trait::async_trait]
pub trait SyncStore: Send + Sync {
    /// Reads the singleton sync-state row.
    async fn sync_state(&self) -> Result<SyncState, StoreError>;

    /// Inserts all rows atomically and returns how many were written.
    async fn insert_history(&self, rows: &[HistoryRow]) -> Result<u64, StoreError>;

    async fn set_last_synced_at(&self, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Subset of `ids` already present in the history table.
    async fn existing_video_ids(&self, ids: &[String]) -> Result<HashSet<String>, StoreError>;

    async fn list_history(&self, limit: u32, offset: u32) -> Result<Vec<StoredHistoryRow>, StoreError>;
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|source| StoreError::InvalidTimestamp {
            value: value.to_string(),
            source,
        })
}

pub struct Database {
    db: LibsqlDatabase,
    conn: Connection,
    tx_lock: Mutex<()>,
    replica: bool,
}

impl Database {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn is_replica(turso_url: &Option<String>, turso_auth_token: &Option<String>) -> bool {
        turso_url.is_some() && turso_auth_token.is_some()
    }

    pub async fn sync(&self) -> Result<(), StoreError> {
        if self.replica {
            self.db
                .sync()
                .await
                .map_err(|e| StoreError::Replica(e.to_string()))?;
        }
        Ok(())
    }

    /// Pushes committed writes to the remote. The write already stands
    /// locally, so a failure here is left to the periodic replica sync.
    async fn push_replica(&self) {
        if let Err(e) = self.sync().await {
            tracing::warn!(error = %e, "replica push failed, deferring to background sync");
        }
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> Result<()> {
        let query = r#"
            INSERT INTO _migrations (name, applied_at)
            VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        "#;
        conn.execute(query, libsql::params![name]).await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    /// Opens the database named in the config, relative to `data_dir`. With
    /// both `turso_url` and `turso_auth_token` set it runs as an embedded
    /// replica of the remote store.
    pub async fn new(cfg: &Config, data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(cfg.app.get_db());
        let turso_url = cfg.app.turso_url.clone();
        let turso_auth_token = cfg.app.turso_auth_token.clone();

        let db = match (&turso_url, &turso_auth_token) {
            (Some(url), Some(token)) => {
                tracing::info!("[db] running in synced database mode");
                let sync_interval = Duration::from_secs(cfg.app.sync_interval_seconds);
                Builder::new_synced_database(&path, url.clone(), token.clone())
                    .sync_interval(sync_interval)
                    .build()
                    .await?
            }
            _ => Builder::new_local(&path).build().await?,
        };

        Self::setup(db, Self::is_replica(&turso_url, &turso_auth_token)).await
    }

    /// Opens a plain local database, `":memory:"` included.
    pub async fn open_local(path: &str) -> Result<Self> {
        let db = Builder::new_local(path).build().await?;
        Self::setup(db, false).await
    }

    async fn setup(db: LibsqlDatabase, replica: bool) -> Result<Self> {
        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;

        for (filename, sql) in SYSTEM_MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        let database = Database {
            db,
            conn,
            tx_lock: Mutex::new(()),
            replica,
        };
        database.sync().await?;
        Ok(database)
    }

    async fn insert_history_internal(&self, rows: &[HistoryRow]) -> Result<u64, StoreError> {
        let query = r#"
            INSERT INTO youtube_history (video_id, title, channel, duration, type, video_url)
            VALUES (?, ?, ?, ?, ?, ?)
        "#;

        let mut inserted = 0;
        for row in rows {
            let duration = i64::try_from(row.duration).unwrap_or(i64::MAX);
            inserted += self
                .conn
                .execute(
                    query,
                    libsql::params![
                        row.video_id.as_str(),
                        row.title.as_str(),
                        row.channel.as_str(),
                        duration,
                        row.category.as_str(),
                        row.video_url.as_str()
                    ],
                )
                .await?;
        }
        Ok(inserted)
    }

    fn row_to_history(row: &libsql::Row) -> Result<StoredHistoryRow, StoreError> {
        let category: String = row.get(5)?;
        let duration: i64 = row.get(4)?;
        Ok(StoredHistoryRow {
            id: row.get(0)?,
            row: HistoryRow {
                video_id: row.get(1)?,
                title: row.get(2)?,
                channel: row.get(3)?,
                duration: u64::try_from(duration).unwrap_or(0),
                category: Category::from_str(&category).unwrap_or(Category::Entertainment),
                video_url: row.get(6)?,
            },
            created_at: row.get(7)?,
        })
    }

    pub async fn count_history(&self) -> Result<i64, StoreError> {
        let mut rows = self.conn.query("SELECT COUNT(*) FROM youtube_history", ()).await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }
}

#[async_trait::async_trait]
impl SyncStore for Database {
    async fn sync_state(&self) -> Result<SyncState, StoreError> {
        let query = "SELECT last_synced_at FROM sync_state WHERE id = ?";
        let mut rows = self.conn.query(query, libsql::params![SYNC_STATE_ID]).await?;

        let Some(row) = rows.next().await? else {
            return Err(StoreError::SyncStateMissing(SYNC_STATE_ID));
        };
        let value: String = row.get(0)?;
        Ok(SyncState {
            last_synced_at: parse_timestamp(&value)?,
        })
    }

    async fn insert_history(&self, rows: &[HistoryRow]) -> Result<u64, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let _guard = self.tx_lock.lock().await;

        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        match self.insert_history_internal(rows).await {
            Ok(inserted) => {
                if let Err(e) = self.conn.execute("COMMIT", ()).await {
                    let _ = self.conn.execute("ROLLBACK", ()).await;
                    return Err(e.into());
                }
                self.push_replica().await;
                Ok(inserted)
            }
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }

    async fn set_last_synced_at(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        let query = "UPDATE sync_state SET last_synced_at = ? WHERE id = ?";
        let updated = self
            .conn
            .execute(query, libsql::params![format_timestamp(at), SYNC_STATE_ID])
            .await?;
        if updated == 0 {
            return Err(StoreError::SyncStateMissing(SYNC_STATE_ID));
        }
        self.push_replica().await;
        Ok(())
    }

    async fn existing_video_ids(&self, ids: &[String]) -> Result<HashSet<String>, StoreError> {
        let mut found = HashSet::new();

        for chunk in ids.chunks(ID_LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let query = format!(
                "SELECT DISTINCT video_id FROM youtube_history WHERE video_id IN ({})",
                placeholders
            );
            let mut rows = self
                .conn
                .query(&query, libsql::params_from_iter(chunk.iter().cloned()))
                .await?;
            while let Some(row) = rows.next().await? {
                found.insert(row.get::<String>(0)?);
            }
        }

        Ok(found)
    }

    async fn list_history(&self, limit: u32, offset: u32) -> Result<Vec<StoredHistoryRow>, StoreError> {
        let query = r#"
            SELECT id, video_id, title, channel, duration, type, video_url, created_at
            FROM youtube_history
            ORDER BY id DESC
            LIMIT ? OFFSET ?
        "#;

        let mut rows = self
            .conn
            .query(query, libsql::params![limit as i64, offset as i64])
            .await?;

        let mut history = Vec::new();
        while let Some(row) = rows.next().await? {
            history.push(Self::row_to_history(&row)?);
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::video_url;

    fn row(id: &str, category: Category) -> HistoryRow {
        HistoryRow {
            video_id: id.to_string(),
            title: format!("title {}", id),
            channel: "chan".to_string(),
            duration: 61,
            category,
            video_url: video_url(id),
        }
    }

    #[tokio::test]
    async fn test_seeded_sync_state() {
        let db = Database::open_local(":memory:").await.unwrap();
        let state = db.sync_state().await.unwrap();
        assert_eq!(state.last_synced_at, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn test_watermark_update() {
        let db = Database::open_local(":memory:").await.unwrap();
        let at = parse_timestamp("2026-10-19T08:30:00.250Z").unwrap();
        db.set_last_synced_at(at).await.unwrap();
        assert_eq!(db.sync_state().await.unwrap().last_synced_at, at);
    }

    #[tokio::test]
    async fn test_missing_sync_state_row() {
        let db = Database::open_local(":memory:").await.unwrap();
        db.connection().execute("DELETE FROM sync_state", ()).await.unwrap();

        assert!(matches!(db.sync_state().await, Err(StoreError::SyncStateMissing(1))));
        assert!(matches!(
            db.set_last_synced_at(Utc::now()).await,
            Err(StoreError::SyncStateMissing(1))
        ));
    }

    #[tokio::test]
    async fn test_insert_and_list_history() {
        let db = Database::open_local(":memory:").await.unwrap();
        let rows = vec![row("a", Category::Education), row("b", Category::Entertainment)];

        assert_eq!(db.insert_history(&rows).await.unwrap(), 2);
        assert_eq!(db.insert_history(&[]).await.unwrap(), 0);

        let listed = db.list_history(10, 0).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].row, rows[1]);
        assert_eq!(listed[1].row, rows[0]);
        assert!(!listed[0].created_at.is_empty());

        let page = db.list_history(1, 1).await.unwrap();
        assert_eq!(page[0].row.video_id, "a");
    }

    #[tokio::test]
    async fn test_insert_is_append_only() {
        let db = Database::open_local(":memory:").await.unwrap();
        let rows = vec![row("a", Category::Education)];
        db.insert_history(&rows).await.unwrap();
        db.insert_history(&rows).await.unwrap();
        assert_eq!(db.count_history().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back() {
        let db = Database::open_local(":memory:").await.unwrap();
        db.connection()
            .execute(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON youtube_history \
                 WHEN NEW.video_id = 'bad' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
                (),
            )
            .await
            .unwrap();

        let rows = vec![row("a", Category::Education), row("bad", Category::Education)];
        assert!(db.insert_history(&rows).await.is_err());
        assert_eq!(db.count_history().await.unwrap(), 0);

        // connection is usable again after the rollback
        assert_eq!(db.insert_history(&rows[..1]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replica_push_failure_keeps_committed_writes() {
        // in-memory databases cannot sync, so every push fails
        let mut db = Database::open_local(":memory:").await.unwrap();
        db.replica = true;

        assert_eq!(db.insert_history(&[row("a", Category::Education)]).await.unwrap(), 1);
        assert_eq!(db.count_history().await.unwrap(), 1);

        let at = parse_timestamp("2026-10-19T09:00:00.000Z").unwrap();
        db.set_last_synced_at(at).await.unwrap();
        assert_eq!(db.sync_state().await.unwrap().last_synced_at, at);
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back() {
        let db = Database::open_local(":memory:").await.unwrap();
        let conn = db.connection();
        conn.execute("PRAGMA foreign_keys = ON", ()).await.unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE parents (id INTEGER PRIMARY KEY);
            CREATE TABLE children (
                parent_id INTEGER REFERENCES parents(id) DEFERRABLE INITIALLY DEFERRED
            );
            CREATE TRIGGER orphan_child AFTER INSERT ON youtube_history
            WHEN NEW.video_id = 'orphan'
            BEGIN
                INSERT INTO children (parent_id) VALUES (999);
            END;
            "#,
        )
        .await
        .unwrap();

        // the deferred foreign key only fails at COMMIT
        assert!(db.insert_history(&[row("orphan", Category::Education)]).await.is_err());
        assert_eq!(db.count_history().await.unwrap(), 0);

        assert_eq!(db.insert_history(&[row("a", Category::Education)]).await.unwrap(), 1);
        assert_eq!(db.count_history().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_existing_video_ids() {
        let db = Database::open_local(":memory:").await.unwrap();
        db.insert_history(&[row("a", Category::Education), row("c", Category::Education)])
            .await
            .unwrap();

        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let found = db.existing_video_ids(&ids).await.unwrap();
        assert_eq!(found, HashSet::from(["a".to_string(), "c".to_string()]));
        assert!(db.existing_video_ids(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn test_timestamp_format_round_trips() {
        let at = parse_timestamp("2026-01-02T03:04:05.678Z").unwrap();
        assert_eq!(format_timestamp(at), "2026-01-02T03:04:05.678Z");
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(StoreError::InvalidTimestamp { .. })
        ));
    }
}
