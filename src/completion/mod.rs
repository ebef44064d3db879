//! Completion source abstraction and the streaming HTTP client.
//!
//! A completion source takes a rendered prompt and yields the completion
//! incrementally as [`CompletionChunk`]s.

mod client;
mod sse;
mod types;


pub use client::CompletionClient;
pub use sse::{SseDecoder, SseEvent, DONE_MARKER};
pub use types::{
    ApiErrorBody, ApiErrorEnvelope, CompletionChunk, CompletionRequest, CompletionStreamChunk,
    StreamChoice,
};

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::CompletionResult;

/// Ordered chunks of a single completion. Finite; ends after `End` or an error.
pub type ChunkStream = BoxStream<'static, CompletionResult<CompletionChunk>>;

/// Anything that can turn a prompt into a stream of completion text.
#[async_trait]
pub trait CompletionSource: Send + Sync {
    /// Submit a request and return its chunk stream once it is accepted.
    async fn submit(&self, request: CompletionRequest) -> CompletionResult<ChunkStream>;
}
