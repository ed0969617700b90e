//! SQLite-backed durable task store
//!
//! Status changes are conditional `UPDATE`s whose `WHERE` clause lists the
//! statuses allowed to precede the target, so the database row is the single
//! authority on whether a transition applies.

use super::{StoreError, StoreTransition, TaskStore};
use crate::task::{StatusChange, TaskRecord, TaskStatus, TaskType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS async_tasks (
    id            TEXT PRIMARY KEY NOT NULL,
    project_id    TEXT NOT NULL,
    requester_id  TEXT NOT NULL,
    task_type     TEXT NOT NULL,
    status        TEXT NOT NULL,
    payload       TEXT NOT NULL,
    result        TEXT,
    error_message TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
)
"#;

/// Task store persisting records in a SQLite `async_tasks` table
#[derive(Debug, Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    /// Connect to `url` (e.g. `sqlite://crewline.db`), creating the file and table if needed
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        info!(url = %url, "SQLite task store ready");
        Ok(store)
    }

    /// Private in-memory database; a single connection keeps every query on the same database
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Wrap an existing pool
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    /// Close the underlying pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn row_to_record(row: &SqliteRow) -> Result<TaskRecord, StoreError> {
        let id: String = row.try_get("id")?;
        let task_type: String = row.try_get("task_type")?;
        let status: String = row.try_get("status")?;
        let payload: String = row.try_get("payload")?;
        let result: Option<String> = row.try_get("result")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(TaskRecord {
            id: Uuid::parse_str(&id).map_err(|e| StoreError::Corrupt(format!("id: {e}")))?,
            project_id: row.try_get("project_id")?,
            requester_id: row.try_get("requester_id")?,
            task_type: TaskType::from_str(&task_type).map_err(StoreError::Corrupt)?,
            status: TaskStatus::from_str(&status).map_err(StoreError::Corrupt)?,
            payload: parse_json(&payload)?,
            result: result.as_deref().map(parse_json).transpose()?,
            error_message: row.try_get("error_message")?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }

    /// Build the conditional update for `target`; predecessor statuses are fixed enum strings
    fn transition_sql(target: TaskStatus) -> String {
        let allowed = TaskStatus::predecessors_of(target)
            .into_iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "UPDATE async_tasks \
             SET status = ?1, result = ?2, error_message = ?3, updated_at = ?4 \
             WHERE id = ?5 AND status IN ({allowed})"
        )
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    fn backend_name(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO async_tasks
                (id, project_id, requester_id, task_type, status, payload,
                 result, error_message, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.project_id)
        .bind(&record.requester_id)
        .bind(record.task_type.as_str())
        .bind(record.status.as_str())
        .bind(record.payload.to_string())
        .bind(record.result.as_ref().map(|r| r.to_string()))
        .bind(&record.error_message)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::Duplicate(record.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<TaskRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM async_tasks WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn advance(
        &self,
        id: Uuid,
        change: StatusChange,
    ) -> Result<StoreTransition, StoreError> {
        let target = change.target();
        let (result, error_message) = match &change {
            StatusChange::Processing => (None, None),
            StatusChange::Completed(value) => (Some(value.to_string()), None),
            StatusChange::Failed(message) => (None, Some(message.clone())),
        };

        let outcome = sqlx::query(&Self::transition_sql(target))
            .bind(target.as_str())
            .bind(result)
            .bind(error_message)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        let current = self.get(id).await?.ok_or(StoreError::NotFound(id))?;

        if outcome.rows_affected() == 0 {
            debug!(task_id = %id, current = %current.status, target = %target, "Transition not applied");
            Ok(StoreTransition::Ignored(current))
        } else {
            Ok(StoreTransition::Applied(current))
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::Decode(_) => StoreError::Corrupt(error.to_string()),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

fn parse_json(raw: &str) -> Result<serde_json::Value, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(format!("json column: {e}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{raw}': {e}")))
}
