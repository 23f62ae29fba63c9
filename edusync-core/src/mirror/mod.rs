//! Local mirror of the remote tables, used in offline mode.
//!
//! The mirror is a SQLite database with one table per entity kind. Each row
//! holds the record's camelCase JSON keyed by id:
//! ```text
//! mirror_students(id, data, mirrored_at)
//! mirror_fees(id, data, mirrored_at)
//! ...
//! settings(key, value, updated_at)
//! ```
//! The mirror is a cache: it can be cleared at any time and is rebuilt by the
//! next successful sync. The `settings` table lives in the same file but is
//! not part of the cache.

mod settings;

pub use settings::{
    Settings, ACTIVE_SCHOOL_KEY, AUTO_BACKUP_ENABLED_KEY, AUTO_BACKUP_FREQUENCY_KEY,
    LAST_BACKUP_KEY, SESSION_USER_KEY,
};

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::SqliteConnection;
use std::path::Path;
use std::str::FromStr;

use crate::models::{Entity, EntityKind};
use crate::snapshot::DataSnapshot;

/// Errors from the local mirror database.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("Mirror database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Mirror migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("Failed to create mirror directory {0}: {1}")]
    Io(String, std::io::Error),
    #[error("Failed to encode {0} record: {1}")]
    Encode(EntityKind, String),
    #[error("Failed to encode setting {0}: {1}")]
    Setting(String, String),
}

#[derive(sqlx::FromRow)]
struct MirrorRow {
    id: String,
    data: String,
}

/// Handle to the local mirror database.
#[derive(Debug, Clone)]
pub struct MirrorStore {
    pool: SqlitePool,
}

impl MirrorStore {
    /// Opens (creating if needed) the mirror database and runs migrations.
    pub async fn open(path: &Path) -> Result<Self, MirrorError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MirrorError::Io(parent.display().to_string(), e))?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) async fn close(&self) {
        self.pool.close().await;
    }

    /// Key-value settings stored alongside the mirror.
    pub fn settings(&self) -> Settings {
        Settings::new(self.pool.clone())
    }

    /// Inserts or replaces records by id.
    pub async fn bulk_upsert<T: Entity>(&self, records: &[T]) -> Result<usize, MirrorError> {
        let mut tx = self.pool.begin().await?;
        put_rows(&mut tx, records).await?;
        tx.commit().await?;
        Ok(records.len())
    }

    /// Reads every record of one kind. Rows that no longer decode are skipped.
    pub async fn read_all<T: Entity>(&self) -> Result<Vec<T>, MirrorError> {
        let sql = format!("SELECT id, data FROM {} ORDER BY id", T::KIND.mirror_table());
        let rows: Vec<MirrorRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_str::<T>(&row.data) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    "Skipping unreadable {} mirror row {}: {}",
                    T::KIND,
                    row.id,
                    e
                ),
            }
        }
        Ok(records)
    }

    /// Replaces every mirror table with the snapshot's contents in one
    /// transaction.
    pub async fn write_snapshot(&self, snapshot: &DataSnapshot) -> Result<(), MirrorError> {
        let mut tx = self.pool.begin().await?;
        for kind in EntityKind::ALL {
            sqlx::query(&format!("DELETE FROM {}", kind.mirror_table()))
                .execute(&mut *tx)
                .await?;
        }
        put_rows(&mut tx, &snapshot.schools).await?;
        put_rows(&mut tx, &snapshot.users).await?;
        put_rows(&mut tx, &snapshot.classes).await?;
        put_rows(&mut tx, &snapshot.subjects).await?;
        put_rows(&mut tx, &snapshot.exams).await?;
        put_rows(&mut tx, &snapshot.fee_heads).await?;
        put_rows(&mut tx, &snapshot.events).await?;
        put_rows(&mut tx, &snapshot.logs).await?;
        put_rows(&mut tx, &snapshot.notifications).await?;
        put_rows(&mut tx, &snapshot.students).await?;
        put_rows(&mut tx, &snapshot.fees).await?;
        put_rows(&mut tx, &snapshot.attendance).await?;
        put_rows(&mut tx, &snapshot.results).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Loads every mirror table into a snapshot.
    pub async fn load_snapshot(&self) -> Result<DataSnapshot, MirrorError> {
        Ok(DataSnapshot {
            schools: self.read_all().await?,
            users: self.read_all().await?,
            classes: self.read_all().await?,
            subjects: self.read_all().await?,
            exams: self.read_all().await?,
            students: self.read_all().await?,
            fees: self.read_all().await?,
            attendance: self.read_all().await?,
            results: self.read_all().await?,
            logs: self.read_all().await?,
            fee_heads: self.read_all().await?,
            events: self.read_all().await?,
            notifications: self.read_all().await?,
        })
    }

    /// Empties every mirror table. Settings are kept.
    pub async fn clear(&self) -> Result<(), MirrorError> {
        let mut tx = self.pool.begin().await?;
        for kind in EntityKind::ALL {
            sqlx::query(&format!("DELETE FROM {}", kind.mirror_table()))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        tracing::info!("Local mirror cleared");
        Ok(())
    }

    /// Number of mirrored rows for one kind.
    pub async fn count(&self, kind: EntityKind) -> Result<i64, MirrorError> {
        let sql = format!("SELECT COUNT(*) FROM {}", kind.mirror_table());
        let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }
}

async fn put_rows<T: Entity>(
    conn: &mut SqliteConnection,
    records: &[T],
) -> Result<(), MirrorError> {
    if records.is_empty() {
        return Ok(());
    }
    let sql = format!(
        "INSERT INTO {} (id, data, mirrored_at) VALUES (?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET data = excluded.data, mirrored_at = excluded.mirrored_at",
        T::KIND.mirror_table()
    );
    let now = Utc::now().to_rfc3339();
    for record in records {
        let data = serde_json::to_string(record)
            .map_err(|e| MirrorError::Encode(T::KIND, e.to_string()))?;
        sqlx::query(&sql)
            .bind(record.id())
            .bind(&data)
            .bind(&now)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
