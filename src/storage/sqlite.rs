use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use super::{Invocation, TurnStore};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::turns::TurnResult;

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
        Self::connect(options, pool_options).await
    }

    /// Create a private in-memory database. Used by tests.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options =
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
                StorageError::Connection {
                    message: format!("Invalid database URL: {}", e),
                }
            })?;

        // Every connection to :memory: is its own database; keep exactly one alive.
        let pool_options = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
        Self::connect(options, pool_options).await
    }

    async fn connect(
        options: SqliteConnectOptions,
        pool_options: SqlitePoolOptions,
    ) -> StorageResult<Self> {
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Invocations logged for a turn, oldest first.
    pub async fn turn_invocations(&self, turn_id: &str) -> StorageResult<Vec<Invocation>> {
        let rows: Vec<InvocationRow> = sqlx::query_as(
            r#"
            SELECT id, turn_id, stage, model, prompt_chars, completion_chars, latency_ms, success, error, created_at
            FROM invocations
            WHERE turn_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(turn_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Invocation::try_from).collect()
    }
}

const TURN_COLUMNS: &str = "id, requester, thread_id, kind, input, answer, library_functions, code, \
     pseudocode, suggestions, raw, finished, stalled_stage, error, created_at, updated_at";

#[async_trait]
impl TurnStore for SqliteStorage {
    async fn load_turn(&self, turn_id: &str) -> StorageResult<Option<TurnResult>> {
        let row: Option<TurnRow> =
            sqlx::query_as(&format!("SELECT {} FROM turns WHERE id = ?", TURN_COLUMNS))
                .bind(turn_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(TurnResult::try_from).transpose()
    }

    async fn save_turn(&self, turn: &TurnResult) -> StorageResult<()> {
        let input = serde_json::to_string(&turn.input)?;
        let library_functions = to_json_column(&turn.library_functions)?;
        let pseudocode = to_json_column(&turn.pseudocode)?;
        let suggestions = to_json_column(&turn.suggestions)?;

        sqlx::query(
            r#"
            INSERT INTO turns (id, requester, thread_id, kind, input, answer, library_functions, code,
                               pseudocode, suggestions, raw, finished, stalled_stage, error, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                answer = excluded.answer,
                library_functions = excluded.library_functions,
                code = excluded.code,
                pseudocode = excluded.pseudocode,
                suggestions = excluded.suggestions,
                raw = excluded.raw,
                finished = excluded.finished,
                stalled_stage = excluded.stalled_stage,
                error = excluded.error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&turn.id)
        .bind(&turn.requester)
        .bind(&turn.thread_id)
        .bind(turn.kind.as_str())
        .bind(&input)
        .bind(&turn.answer)
        .bind(&library_functions)
        .bind(&turn.code)
        .bind(&pseudocode)
        .bind(&suggestions)
        .bind(&turn.raw)
        .bind(turn.finished)
        .bind(turn.stalled_stage.map(|s| s.as_str()))
        .bind(&turn.error)
        .bind(timestamp(&turn.created_at))
        .bind(timestamp(&turn.updated_at))
        .execute(&self.pool)
        .await?;

        debug!(turn_id = %turn.id, finished = turn.finished, "Turn saved");
        Ok(())
    }

    async fn list_requester_turns(
        &self,
        requester: &str,
        limit: u32,
    ) -> StorageResult<Vec<TurnResult>> {
        let rows: Vec<TurnRow> = sqlx::query_as(&format!(
            "SELECT {} FROM turns WHERE requester = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
            TURN_COLUMNS
        ))
        .bind(requester)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TurnResult::try_from).collect()
    }

    async fn thread_turns(&self, thread_id: &str) -> StorageResult<Vec<TurnResult>> {
        let rows: Vec<TurnRow> = sqlx::query_as(&format!(
            "SELECT {} FROM turns WHERE thread_id = ? ORDER BY created_at ASC, rowid ASC",
            TURN_COLUMNS
        ))
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TurnResult::try_from).collect()
    }

    async fn log_invocation(&self, invocation: &Invocation) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO invocations (id, turn_id, stage, model, prompt_chars, completion_chars, latency_ms, success, error, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&invocation.id)
        .bind(&invocation.turn_id)
        .bind(invocation.stage.as_str())
        .bind(&invocation.model)
        .bind(invocation.prompt_chars)
        .bind(invocation.completion_chars)
        .bind(invocation.latency_ms)
        .bind(invocation.success)
        .bind(&invocation.error)
        .bind(timestamp(&invocation.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &str, value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Query {
            message: format!("Invalid {} column: {}", column, e),
        })
}

fn to_json_column<T: serde::Serialize>(value: &Option<T>) -> StorageResult<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(StorageError::from)
}

fn from_json_column<T: DeserializeOwned>(value: Option<String>) -> StorageResult<Option<T>> {
    value
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(StorageError::from)
}

fn parse_column<T: FromStr<Err = String>>(column: &str, value: &str) -> StorageResult<T> {
    value.parse().map_err(|e| StorageError::Query {
        message: format!("Invalid {} column: {}", column, e),
    })
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct TurnRow {
    id: String,
    requester: String,
    thread_id: String,
    kind: String,
    input: String,
    answer: Option<String>,
    library_functions: Option<String>,
    code: Option<String>,
    pseudocode: Option<String>,
    suggestions: Option<String>,
    raw: String,
    finished: bool,
    stalled_stage: Option<String>,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TurnRow> for TurnResult {
    type Error = StorageError;

    fn try_from(row: TurnRow) -> StorageResult<Self> {
        Ok(Self {
            kind: parse_column("kind", &row.kind)?,
            input: serde_json::from_str(&row.input)?,
            library_functions: from_json_column(row.library_functions)?,
            pseudocode: from_json_column(row.pseudocode)?,
            suggestions: from_json_column(row.suggestions)?,
            stalled_stage: row
                .stalled_stage
                .as_deref()
                .map(|s| parse_column("stalled_stage", s))
                .transpose()?,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            updated_at: parse_timestamp("updated_at", &row.updated_at)?,
            id: row.id,
            requester: row.requester,
            thread_id: row.thread_id,
            answer: row.answer,
            code: row.code,
            raw: row.raw,
            finished: row.finished,
            error: row.error,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InvocationRow {
    id: String,
    turn_id: String,
    stage: String,
    model: String,
    prompt_chars: i64,
    completion_chars: Option<i64>,
    latency_ms: Option<i64>,
    success: bool,
    error: Option<String>,
    created_at: String,
}

impl TryFrom<InvocationRow> for Invocation {
    type Error = StorageError;

    fn try_from(row: InvocationRow) -> StorageResult<Self> {
        Ok(Self {
            stage: parse_column("stage", &row.stage)?,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            id: row.id,
            turn_id: row.turn_id,
            model: row.model,
            prompt_chars: row.prompt_chars,
            completion_chars: row.completion_chars,
            latency_ms: row.latency_ms,
            success: row.success,
            error: row.error,
        })
    }
}
