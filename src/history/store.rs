//! SQLite-based run history store

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::core::run::{BuildRun, CommitRef, RunStatus, StepResult};
use crate::history::RunHistory;

/// SQLite run history
pub struct SqliteRunHistory {
    pool: SqlitePool,
}

impl SqliteRunHistory {
    /// Create a new SQLite history store, creating the database file if it
    /// does not exist yet
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))
            .context("Invalid database path")?
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("conveyor");
        std::fs::create_dir_all(&db_dir)?;

        let db_path = db_dir.join("runs.db");
        Self::new(db_path.to_str().unwrap_or("runs.db")).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                configuration_id TEXT NOT NULL,
                build_number INTEGER NOT NULL,
                status TEXT NOT NULL,
                commit_revision TEXT,
                commit_branch TEXT,
                commit_committer TEXT,
                started_at TEXT,
                finished_at TEXT,
                step_results TEXT NOT NULL DEFAULT '[]',
                deployment_id TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_configuration_id ON runs(configuration_id);
            CREATE INDEX IF NOT EXISTS idx_status ON runs(status);
            CREATE INDEX IF NOT EXISTS idx_build_number ON runs(configuration_id, build_number);
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

    fn status_from_str(s: &str) -> RunStatus {
        match s {
            "pending" => RunStatus::Pending,
            "running" => RunStatus::Running,
            "success" => RunStatus::Success,
            "failed" => RunStatus::Failed,
            "timed-out" => RunStatus::TimedOut,
            "skipped" => RunStatus::Skipped,
            _ => RunStatus::Pending,
        }
    }

    fn run_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<BuildRun> {
        let commit = match (
            row.get::<Option<String>, _>("commit_revision"),
            row.get::<Option<String>, _>("commit_branch"),
            row.get::<Option<String>, _>("commit_committer"),
        ) {
            (Some(revision), Some(branch), Some(committer)) => Some(CommitRef {
                revision,
                branch,
                committer,
            }),
            _ => None,
        };

        let step_results: Vec<StepResult> =
            serde_json::from_str(&row.get::<String, _>("step_results"))
                .context("Failed to decode step results")?;

        Ok(BuildRun {
            id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            configuration_id: row.get("configuration_id"),
            build_number: row.get::<i64, _>("build_number") as u64,
            status: Self::status_from_str(&row.get::<String, _>("status")),
            commit,
            started_at: row
                .get::<Option<NaiveDateTime>, _>("started_at")
                .map(Self::from_naive),
            finished_at: row
                .get::<Option<NaiveDateTime>, _>("finished_at")
                .map(Self::from_naive),
            step_results,
            deployment_id: row.get("deployment_id"),
        })
    }
}

#[async_trait::async_trait]
impl RunHistory for SqliteRunHistory {
    async fn record(&self, run: &BuildRun) -> Result<()> {
        let step_results =
            serde_json::to_string(&run.step_results).context("Failed to encode step results")?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, configuration_id, build_number, status, commit_revision, commit_branch,
             commit_committer, started_at, finished_at, step_results, deployment_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(run.id.to_string())
        .bind(&run.configuration_id)
        .bind(run.build_number as i64)
        .bind(run.status.to_string())
        .bind(run.commit.as_ref().map(|c| c.revision.clone()))
        .bind(run.commit.as_ref().map(|c| c.branch.clone()))
        .bind(run.commit.as_ref().map(|c| c.committer.clone()))
        .bind(run.started_at.map(Self::to_naive))
        .bind(run.finished_at.map(Self::to_naive))
        .bind(step_results)
        .bind(run.deployment_id.clone())
        .execute(&self.pool)
        .await
        .context("Failed to record run")?;

        Ok(())
    }

    async fn get(&self, run_id: Uuid) -> Result<Option<BuildRun>> {
        let row = sqlx::query("SELECT * FROM runs WHERE id = ?1")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load run")?;

        row.as_ref().map(Self::run_from_row).transpose()
    }

    async fn list(&self, configuration_id: &str) -> Result<Vec<BuildRun>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM runs
            WHERE configuration_id = ?1
            ORDER BY build_number DESC
            "#,
        )
        .bind(configuration_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;

        rows.iter().map(Self::run_from_row).collect()
    }

    async fn list_configurations(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT configuration_id
            FROM runs
            ORDER BY configuration_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list configurations")?;

        Ok(rows.iter().map(|row| row.get("configuration_id")).collect())
    }
}
