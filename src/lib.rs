//! # Tutor Stream
//!
//! Streaming backend for a programming tutor. A student's question becomes
//! a turn: a short chain of completion prompts whose streamed output is
//! parsed incrementally and pushed to the student while it arrives.
//!
//! ## Features
//!
//! - **Tag Grammar Parser**: Line-oriented `[tag]:` grammars for answers,
//!   pseudocode and follow-up suggestions, tolerant of partial text
//! - **Prompt Templates**: Few-shot prompts with conversation history
//! - **Streaming Orchestrator**: SSE completions parsed chunk by chunk
//! - **Turn Chain**: answer → pseudocode → suggestions with persistence
//!   and progress notifications
//!
//! ## Architecture
//!
//! ```text
//! JSON-RPC Client → RpcServer (stdio) → TurnController → StreamingOrchestrator
//!                         ↑                   ↓                  ↓
//!                   turn/progress       SQLite (turns)    Completion API (SSE)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tutor_stream::completion::CompletionClient;
//! use tutor_stream::orchestrator::NullNotifier;
//! use tutor_stream::storage::SqliteStorage;
//! use tutor_stream::turns::{TurnController, TurnCore, TurnInput};
//! use tutor_stream::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let core = TurnCore::new(
//!         Arc::new(CompletionClient::new(&config.completion, config.request.clone())?),
//!         Arc::new(SqliteStorage::new(&config.database).await?),
//!         Arc::new(NullNotifier),
//!     );
//!     let controller = TurnController::new(core, config.models.clone(), config.request.idle_timeout());
//!     let turn = controller
//!         .execute("student-1", TurnInput::question("how can I read from a file?"))
//!         .await?;
//!     println!("{:?}", turn.answer);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Command-line interface definitions.
pub mod cli;
/// Completion API client and streaming chunk types.
pub mod completion;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Tag grammars for parsing completion text.
pub mod grammar;
/// Per-stage streaming orchestration and turn events.
pub mod orchestrator;
/// Prompt templates and conversation history.
pub mod prompts;
/// Stdio JSON-RPC server and request handling.
pub mod server;
/// SQLite storage layer for persistence.
pub mod storage;
/// Turn types and the stage chain controller.
pub mod turns;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, RpcServer, SharedState};
pub use turns::{TurnController, TurnInput, TurnResult};
