//! SQLite checkpoint storage
//!
//! Durable backend built on a `sqlx` SQLite pool. One row per checkpoint,
//! keyed by `(thread_id, step_index)`; state is stored as JSON text.
//!
//! Appends are a single conditional `INSERT ... SELECT ... WHERE` statement, so
//! the contiguity check and the write commit together. A writer that lost a
//! race sees zero affected rows (or a primary-key violation) and gets
//! [`CheckpointError::Conflict`].

use crate::{
    checkpoint::{Checkpoint, CheckpointMetadata, NextStep},
    error::{CheckpointError, Result},
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS checkpoints (
    thread_id   TEXT    NOT NULL,
    step_index  INTEGER NOT NULL,
    id          TEXT    NOT NULL,
    v           INTEGER NOT NULL,
    source      TEXT    NOT NULL,
    node        TEXT,
    status      TEXT    NOT NULL,
    error       TEXT,
    next_node   TEXT,
    state       TEXT    NOT NULL,
    created_at  TEXT    NOT NULL,
    PRIMARY KEY (thread_id, step_index)
)
"#;

const INSERT_NEXT: &str = r#"
INSERT INTO checkpoints
    (thread_id, step_index, id, v, source, node, status, error, next_node, state, created_at)
SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
WHERE COALESCE((SELECT MAX(step_index) FROM checkpoints WHERE thread_id = ?), -1) + 1 = ?
"#;

const SELECT_COLUMNS: &str = "SELECT thread_id, step_index, id, v, source, node, status, error, \
                              next_node, state, created_at FROM checkpoints";

/// Checkpoint saver backed by a SQLite database file
#[derive(Clone, Debug)]
pub struct SqliteCheckpointSaver {
    pool: SqlitePool,
}

impl SqliteCheckpointSaver {
    /// Open (creating if missing) the database at `database_path`.
    ///
    /// Call [`setup`](CheckpointSaver::setup) before first use.
    pub async fn connect<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let path = database_path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        debug!(path = %path.display(), "Connecting to checkpoint database");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                CheckpointError::Storage(format!("Failed to connect to database: {}", e))
            })?;

        info!(path = %path.display(), "Checkpoint database connection established");

        Ok(Self { pool })
    }

    /// Private in-memory database, mostly for tests.
    ///
    /// Pinned to a single connection that never idles out, since each SQLite
    /// connection owns its own `:memory:` database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn max_step(&self, thread_id: &str) -> Result<Option<u64>> {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(step_index) FROM checkpoints WHERE thread_id = ?")
                .bind(thread_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(max.map(|step| step as u64))
    }

    async fn conflict(&self, checkpoint: &Checkpoint) -> CheckpointError {
        let expected = match self.max_step(&checkpoint.thread_id).await {
            Ok(latest) => latest.map_or(0, |step| step + 1),
            Err(e) => return e,
        };
        CheckpointError::Conflict {
            thread_id: checkpoint.thread_id.clone(),
            expected,
            actual: checkpoint.step_index,
        }
    }
}

fn decode_row(row: &SqliteRow) -> Result<Checkpoint> {
    let step_index: i64 = row.try_get("step_index")?;
    let source: String = row.try_get("source")?;
    let status: String = row.try_get("status")?;
    let next_node: Option<String> = row.try_get("next_node")?;
    let state: String = row.try_get("state")?;
    let created_at: String = row.try_get("created_at")?;

    let ts = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| CheckpointError::Invalid(format!("bad created_at '{}': {}", created_at, e)))?
        .with_timezone(&Utc);

    Ok(Checkpoint {
        v: row.try_get("v")?,
        id: row.try_get("id")?,
        thread_id: row.try_get("thread_id")?,
        step_index: step_index as u64,
        ts,
        values: serde_json::from_str(&state)?,
        next: next_node.map_or(NextStep::End, NextStep::Node),
        metadata: CheckpointMetadata {
            source: source.parse()?,
            node: row.try_get("node")?,
            status: status.parse()?,
            error: row.try_get("error")?,
        },
    })
}

#[async_trait]
impl CheckpointSaver for SqliteCheckpointSaver {
    async fn setup(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        debug!("Checkpoint table ready");
        Ok(())
    }

    async fn append(&self, checkpoint: &Checkpoint) -> Result<()> {
        checkpoint.validate()?;

        let state = serde_json::to_string(&checkpoint.values)?;
        let step = checkpoint.step_index as i64;

        let result = sqlx::query(INSERT_NEXT)
            .bind(&checkpoint.thread_id)
            .bind(step)
            .bind(&checkpoint.id)
            .bind(checkpoint.v)
            .bind(checkpoint.metadata.source.as_str())
            .bind(checkpoint.metadata.node.as_deref())
            .bind(checkpoint.metadata.status.as_str())
            .bind(checkpoint.metadata.error.as_deref())
            .bind(checkpoint.next.node_name())
            .bind(state)
            .bind(checkpoint.ts.to_rfc3339())
            .bind(&checkpoint.thread_id)
            .bind(step)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => {
                debug!(
                    thread_id = %checkpoint.thread_id,
                    step = checkpoint.step_index,
                    "Appended checkpoint"
                );
                Ok(())
            }
            Ok(_) => Err(self.conflict(checkpoint).await),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(self.conflict(checkpoint).await)
            }
            Err(e) => Err(CheckpointError::Storage(format!(
                "Failed to append checkpoint: {}",
                e
            ))),
        }
    }

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let sql = format!(
            "{} WHERE thread_id = ? ORDER BY step_index DESC LIMIT 1",
            SELECT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode_row).transpose()
    }

    async fn history(&self, thread_id: &str) -> Result<CheckpointStream> {
        let sql = format!("{} WHERE thread_id = ? ORDER BY step_index ASC", SELECT_COLUMNS);
        let rows = sqlx::query(&sql)
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await?;

        let entries: Vec<Result<Checkpoint>> = rows.iter().map(decode_row).collect();
        Ok(Box::pin(stream::iter(entries)))
    }

    async fn thread_ids(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT DISTINCT thread_id FROM checkpoints ORDER BY thread_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
