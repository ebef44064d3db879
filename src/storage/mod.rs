//! Storage layer for turn persistence.
//!
//! This module provides the [`TurnStore`] trait the turn controller saves
//! through, and a SQLite implementation of it. Saves are last-writer-wins
//! per turn id.

mod sqlite;


pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::prompts::{ConversationThread, StageKind};
use crate::turns::TurnResult;

/// Stage-level log entry for debugging and latency tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    /// Unique invocation identifier.
    pub id: String,
    /// Turn the stage ran for.
    pub turn_id: String,
    /// Stage that ran.
    pub stage: StageKind,
    /// Model the prompt was sent to.
    pub model: String,
    /// Size of the rendered prompt in bytes.
    pub prompt_chars: i64,
    /// Size of the streamed completion in bytes.
    pub completion_chars: Option<i64>,
    /// Latency in milliseconds.
    pub latency_ms: Option<i64>,
    /// Whether the stage resolved.
    pub success: bool,
    /// Error message (if failed).
    pub error: Option<String>,
    /// When the invocation occurred.
    pub created_at: DateTime<Utc>,
}

impl Invocation {
    /// Create a new invocation log entry
    pub fn new(
        turn_id: impl Into<String>,
        stage: StageKind,
        model: impl Into<String>,
        prompt_chars: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            turn_id: turn_id.into(),
            stage,
            model: model.into(),
            prompt_chars: prompt_chars as i64,
            completion_chars: None,
            latency_ms: None,
            success: true,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Mark as successful
    pub fn success(mut self, completion_chars: usize, latency_ms: i64) -> Self {
        self.success = true;
        self.completion_chars = Some(completion_chars as i64);
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Mark as failed with error
    pub fn failure(mut self, error: impl Into<String>, latency_ms: i64) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// Persistence collaborator for turns.
#[async_trait]
pub trait TurnStore: Send + Sync {
    /// Get a turn by ID.
    async fn load_turn(&self, turn_id: &str) -> StorageResult<Option<TurnResult>>;
    /// Insert or overwrite a turn.
    async fn save_turn(&self, turn: &TurnResult) -> StorageResult<()>;
    /// Most recent turns of a requester, newest first.
    async fn list_requester_turns(
        &self,
        requester: &str,
        limit: u32,
    ) -> StorageResult<Vec<TurnResult>>;
    /// All turns of a thread in creation order.
    async fn thread_turns(&self, thread_id: &str) -> StorageResult<Vec<TurnResult>>;
    /// Record a stage invocation.
    async fn log_invocation(&self, invocation: &Invocation) -> StorageResult<()>;

    /// History of a thread for follow-up prompts: finished turns only.
    async fn load_thread(&self, thread_id: &str) -> StorageResult<ConversationThread> {
        let turns = self.thread_turns(thread_id).await?;
        let mut thread = ConversationThread::new(thread_id);
        for turn in turns.iter().filter(|t| t.finished) {
            thread.push(turn.thread_entry());
        }
        Ok(thread)
    }
}
