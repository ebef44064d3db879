use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::sse::{SseDecoder, SseEvent};
use super::types::{ApiErrorEnvelope, CompletionChunk, CompletionRequest, CompletionStreamChunk};
use super::{ChunkStream, CompletionSource};
use crate::config::{CompletionConfig, RequestConfig};
use crate::error::{CompletionError, CompletionResult};

/// Streaming client for an OpenAI-compatible `/v1/completions` endpoint
#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    base_url: String,
    api_key: String,
    request_config: RequestConfig,
}

impl CompletionClient {
    /// Create a new completion client
    pub fn new(config: &CompletionConfig, request_config: RequestConfig) -> CompletionResult<Self> {
        // Only the connect phase is bounded here; a whole-request timeout
        // would cut long streams. Chunk gaps are bounded by the orchestrator.
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(CompletionError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a request, retrying retryable failures before any chunk is read.
    pub async fn stream_completion(&self, request: &CompletionRequest) -> CompletionResult<ChunkStream> {
        let url = format!("{}/v1/completions", self.base_url);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = backoff_delay(self.request_config.retry_delay_ms, retries);
                warn!(
                    model = %request.model,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying completion request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, request).await {
                Ok(stream) => {
                    info!(
                        model = %request.model,
                        latency_ms = start.elapsed().as_millis(),
                        "Completion stream opened"
                    );
                    return Ok(stream);
                }
                Err(e) => {
                    error!(
                        model = %request.model,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Completion request failed"
                    );
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(CompletionError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single request (internal)
    async fn execute_request(
        &self,
        url: &str,
        request: &CompletionRequest,
    ) -> CompletionResult<ChunkStream> {
        debug!(
            model = %request.model,
            prompt_len = request.prompt.len(),
            max_tokens = request.max_tokens,
            "Submitting completion request"
        );

        let send = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(request)
            .send();

        let timeout_ms = self.request_config.timeout_ms;
        let response = tokio::time::timeout(Duration::from_millis(timeout_ms), send)
            .await
            .map_err(|_| CompletionError::Timeout { timeout_ms })?
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout { timeout_ms }
                } else {
                    CompletionError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        Ok(chunk_stream(response))
    }
}

#[async_trait]
impl CompletionSource for CompletionClient {
    async fn submit(&self, request: CompletionRequest) -> CompletionResult<ChunkStream> {
        self.stream_completion(&request).await
    }
}

/// Upper bound on a single retry delay.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Delay before retry `retry` (1-based): the base doubled per earlier retry,
/// capped at [`MAX_BACKOFF_MS`].
fn backoff_delay(base_ms: u64, retry: u32) -> Duration {
    let factor = 2_u64
        .checked_pow(retry.saturating_sub(1))
        .unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

struct StreamState {
    body: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    decoder: SseDecoder,
    pending: VecDeque<CompletionResult<CompletionChunk>>,
    body_closed: bool,
    terminated: bool,
}

impl StreamState {
    fn enqueue(&mut self, events: Vec<SseEvent>) {
        for event in events {
            match event {
                SseEvent::Done => {
                    self.pending
                        .push_back(Ok(CompletionChunk::End { finish_reason: None }));
                }
                SseEvent::Data(payload) => self.enqueue_payload(&payload),
            }
        }
    }

    fn enqueue_payload(&mut self, payload: &str) {
        // Chunk fields are all optional, so the envelope must be tried first.
        if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(payload) {
            self.pending.push_back(Err(CompletionError::Stream {
                message: envelope.error.message,
            }));
            return;
        }

        match serde_json::from_str::<CompletionStreamChunk>(payload) {
            Ok(chunk) => {
                let Some(choice) = chunk.first_choice() else {
                    return;
                };
                if !choice.text.is_empty() {
                    self.pending
                        .push_back(Ok(CompletionChunk::Delta(choice.text.clone())));
                }
                if let Some(reason) = &choice.finish_reason {
                    self.pending.push_back(Ok(CompletionChunk::End {
                        finish_reason: Some(reason.clone()),
                    }));
                }
            }
            Err(e) => {
                self.pending.push_back(Err(CompletionError::InvalidResponse {
                    message: format!("Failed to parse stream chunk: {}", e),
                }));
            }
        }
    }
}

/// Adapt an SSE response body into completion chunks.
///
/// The stream ends after the first `End` or error item; anything the
/// server sends afterwards is discarded.
fn chunk_stream(response: reqwest::Response) -> ChunkStream {
    let body = response
        .bytes_stream()
        .map(|item| item.map(|bytes| bytes.to_vec()))
        .boxed();

    let state = StreamState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        body_closed: false,
        terminated: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.terminated {
                return None;
            }

            if let Some(item) = state.pending.pop_front() {
                if matches!(item, Ok(CompletionChunk::End { .. }) | Err(_)) {
                    state.terminated = true;
                    state.pending.clear();
                }
                return Some((item, state));
            }

            if state.body_closed {
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let events = state.decoder.push(&bytes);
                    state.enqueue(events);
                }
                Some(Err(e)) => {
                    state.pending.push_back(Err(CompletionError::Stream {
                        message: e.to_string(),
                    }));
                }
                None => {
                    let events = state.decoder.finish();
                    state.enqueue(events);
                    state.body_closed = true;
                }
            }
        }
    })
    .boxed()
}
