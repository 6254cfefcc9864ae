use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    migrate::MigrateError, sqlite::SqlitePoolOptions, Row, Sqlite, SqlitePool, Transaction,
};
use thiserror::Error;

use hirehub_core::document::Document;
use hirehub_core::types::{
    AttendanceRecord, Candidate, Complaint, Job, Requirement, TeamMember,
};

mod change_log;
mod documents;
mod settings;

pub use change_log::{ChangeLogError, ChangeLogRepository};
pub use documents::{DocumentRepository, DocumentStoreError};
pub use settings::SettingsRepository;

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Begins a SQLite transaction shared by document writes and the change log.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Returns a typed repository for the collection backing `T`.
    pub fn collection<T: Document>(&self) -> DocumentRepository<T> {
        DocumentRepository::new(self.pool.clone())
    }

    pub fn jobs(&self) -> DocumentRepository<Job> {
        self.collection()
    }

    pub fn candidates(&self) -> DocumentRepository<Candidate> {
        self.collection()
    }

    pub fn users(&self) -> DocumentRepository<TeamMember> {
        self.collection()
    }

    pub fn complaints(&self) -> DocumentRepository<Complaint> {
        self.collection()
    }

    pub fn requirements(&self) -> DocumentRepository<Requirement> {
        self.collection()
    }

    pub fn attendance(&self) -> DocumentRepository<AttendanceRecord> {
        self.collection()
    }

    /// Returns a handle on the singleton settings document.
    pub fn settings(&self) -> SettingsRepository {
        SettingsRepository::new(self.collection())
    }

    /// Returns a handle for reading and pruning the change log.
    pub fn change_log(&self) -> ChangeLogRepository {
        ChangeLogRepository::new(self.pool.clone())
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Runs `PRAGMA wal_checkpoint(TRUNCATE)` and reports the frame counters.
    pub async fn wal_checkpoint_truncate(&self) -> Result<CheckpointStats, sqlx::Error> {
        let row = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE);")
            .fetch_one(&self.pool)
            .await?;

        Ok(CheckpointStats {
            busy_frames: row.try_get::<i64, _>(0)?,
            log_frames: row.try_get::<i64, _>(1)?,
            checkpointed_frames: row.try_get::<i64, _>(2)?,
        })
    }
}

/// Counters returned by a WAL checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointStats {
    pub busy_frames: i64,
    pub log_frames: i64,
    pub checkpointed_frames: i64,
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub(crate) fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
pub(crate) mod test_support {
    use tempfile::TempDir;

    use super::Database;

    /// Migrated database in a fresh temporary directory; keep the dir alive for the test.
    pub async fn setup_db() -> (Database, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let db = Database::connect(&url).await.expect("connect");
        db.run_migrations().await.expect("migrations");
        (db, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::setup_db;

    #[tokio::test]
    async fn migrations_apply() {
        let (db, _dir) = setup_db().await;

        let tables: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('documents', 'change_log')",
        )
        .fetch_one(db.pool())
        .await
        .expect("fetch tables");
        assert_eq!(tables.0, 2);
    }

    #[tokio::test]
    async fn checkpoint_reports_frames() {
        let (db, _dir) = setup_db().await;
        let stats = db.wal_checkpoint_truncate().await.expect("checkpoint");
        assert_eq!(stats.busy_frames, 0);
    }
}
