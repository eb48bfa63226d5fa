//! SQLite-based run history store

use crate::core::{RunStatus, RunType};
use crate::persistence::{PersistenceBackend, RunRecord};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

/// SQLite run store
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// Open (or create) a store at `db_path`; `:memory:` gives a private database
    pub async fn new(db_path: &str) -> Result<Self> {
        let in_memory = db_path == ":memory:";
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))
            .context("Invalid database path")?
            .create_if_missing(true);

        // Every in-memory connection is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Open the store at `path`, creating parent directories
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let path = path
            .to_str()
            .ok_or_else(|| anyhow!("Database path is not valid UTF-8: {}", path.display()))?;
        Self::new(path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                pipeline_id TEXT NOT NULL,
                consortium_id TEXT NOT NULL,
                run_type TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                ended_at TEXT,
                error_message TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_runs_pipeline ON runs(pipeline_id);
            CREATE INDEX IF NOT EXISTS idx_runs_created_at ON runs(created_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn record_from_row(row: &SqliteRow) -> Result<RunRecord> {
        let status: String = row.get("status");
        let run_type = match row.get::<String, _>("run_type").as_str() {
            "remote" => RunType::Remote,
            _ => RunType::Local,
        };

        Ok(RunRecord {
            run_id: row.get("id"),
            pipeline_id: row.get("pipeline_id"),
            consortium_id: row.get("consortium_id"),
            run_type,
            status: RunStatus::from_str(&status).map_err(|e| anyhow!(e))?,
            created_at: Self::from_naive(row.get("created_at")),
            ended_at: row
                .get::<Option<NaiveDateTime>, _>("ended_at")
                .map(Self::from_naive),
            error_message: row.get("error_message"),
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteRunStore {
    async fn save_run(&self, record: &RunRecord) -> Result<()> {
        let run_type = match record.run_type {
            RunType::Local => "local",
            RunType::Remote => "remote",
        };

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, pipeline_id, consortium_id, run_type, status, created_at, ended_at, error_message)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&record.run_id)
        .bind(&record.pipeline_id)
        .bind(&record.consortium_id)
        .bind(run_type)
        .bind(record.status.as_str())
        .bind(Self::to_naive(record.created_at))
        .bind(record.ended_at.map(Self::to_naive))
        .bind(&record.error_message)
        .execute(&self.pool)
        .await
        .context("Failed to save run")?;

        Ok(())
    }

    async fn load_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, pipeline_id, consortium_id, run_type, status, created_at, ended_at, error_message
            FROM runs
            WHERE id = ?1
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load run")?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, pipeline_id, consortium_id, run_type, status, created_at, ended_at, error_message
            FROM runs
            ORDER BY created_at DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;

        rows.iter().map(Self::record_from_row).collect()
    }
}
