//! Streaming orchestration of a single prompt stage.
//!
//! [`StreamingOrchestrator::run_stage`] submits one [`PromptSpec`], appends
//! every streamed delta to a stage-owned accumulator, re-parses the whole
//! accumulator with the stage grammar and pushes the fragment to the
//! notifier. The stage resolves on the end marker or when the stream closes.

mod events;

pub use events::{ChannelEvent, ChannelNotifier, Notifier, NullNotifier, TurnEvent};

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::completion::{CompletionChunk, CompletionSource};
use crate::error::{CompletionError, CompletionResult};
use crate::grammar::ParsedFragment;
use crate::prompts::{PromptSpec, StageKind};

/// Lifecycle of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Built, not yet submitted.
    Idle,
    /// Request sent, no chunk yet.
    Submitted,
    /// At least one chunk received.
    Streaming,
    /// Stream ended cleanly.
    Resolved,
    /// Submission or stream failed.
    Failed,
}

impl StageState {
    /// Get the state name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            StageState::Idle => "idle",
            StageState::Submitted => "submitted",
            StageState::Streaming => "streaming",
            StageState::Resolved => "resolved",
            StageState::Failed => "failed",
        }
    }

    /// Whether the stage can still make progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageState::Resolved | StageState::Failed)
    }
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A resolved stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    /// Stage that ran.
    pub stage: StageKind,
    /// Everything the completion source streamed for this stage.
    pub text: String,
    /// Final parse of `text`.
    pub fragment: ParsedFragment,
    /// Reason reported by the source, if any.
    pub finish_reason: Option<String>,
    /// Delta chunks received.
    pub chunks: usize,
    /// Submit-to-end time.
    pub latency_ms: i64,
}

/// Per-stage state. Lives only inside one `run_stage` future.
struct StageRun<'a> {
    spec: &'a PromptSpec,
    channel: &'a str,
    turn_id: &'a str,
    state: StageState,
    accumulator: String,
    chunks: usize,
}

impl<'a> StageRun<'a> {
    fn new(spec: &'a PromptSpec, channel: &'a str, turn_id: &'a str) -> Self {
        Self {
            spec,
            channel,
            turn_id,
            state: StageState::Idle,
            accumulator: String::new(),
            chunks: 0,
        }
    }

    fn transition(&mut self, next: StageState) {
        debug!(
            turn_id = %self.turn_id,
            stage = %self.spec.stage(),
            from = %self.state,
            to = %next,
            "Stage transition"
        );
        self.state = next;
    }
}

/// Drives prompt stages through a completion source.
#[derive(Clone)]
pub struct StreamingOrchestrator {
    source: Arc<dyn CompletionSource>,
    notifier: Arc<dyn Notifier>,
    idle_timeout: Duration,
}

impl StreamingOrchestrator {
    /// Create an orchestrator. `idle_timeout` bounds the wait for each chunk.
    pub fn new(
        source: Arc<dyn CompletionSource>,
        notifier: Arc<dyn Notifier>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            source,
            notifier,
            idle_timeout,
        }
    }

    /// Run one stage to resolution.
    ///
    /// Progress events for `turn_id` go to `channel` in chunk order. On
    /// failure the error is returned as is and no fragment is produced;
    /// nothing is retried.
    pub async fn run_stage(
        &self,
        spec: &PromptSpec,
        channel: &str,
        turn_id: &str,
    ) -> CompletionResult<StageOutcome> {
        let start = Instant::now();
        let mut run = StageRun::new(spec, channel, turn_id);

        match self.drive(&mut run).await {
            Ok(finish_reason) => {
                run.transition(StageState::Resolved);
                let fragment = spec.parse(&run.accumulator);
                let latency_ms = start.elapsed().as_millis() as i64;

                info!(
                    turn_id = %turn_id,
                    stage = %spec.stage(),
                    chunks = run.chunks,
                    chars = run.accumulator.len(),
                    latency_ms,
                    "Stage resolved"
                );

                Ok(StageOutcome {
                    stage: spec.stage(),
                    text: run.accumulator,
                    fragment,
                    finish_reason,
                    chunks: run.chunks,
                    latency_ms,
                })
            }
            Err(e) => {
                run.transition(StageState::Failed);
                warn!(
                    turn_id = %turn_id,
                    stage = %spec.stage(),
                    chunks = run.chunks,
                    error = %e,
                    "Stage failed"
                );
                Err(e)
            }
        }
    }

    /// Consume the stream until it ends. Returns the finish reason, if any.
    async fn drive(&self, run: &mut StageRun<'_>) -> CompletionResult<Option<String>> {
        run.transition(StageState::Submitted);
        let mut stream = self.source.submit(run.spec.to_request()).await?;

        loop {
            let next = tokio::time::timeout(self.idle_timeout, stream.next())
                .await
                .map_err(|_| CompletionError::Timeout {
                    timeout_ms: self.idle_timeout.as_millis() as u64,
                })?;

            let Some(item) = next else {
                return Ok(None);
            };
            let chunk = item?;

            if run.state == StageState::Submitted {
                run.transition(StageState::Streaming);
            }

            match chunk {
                CompletionChunk::End { finish_reason } => return Ok(finish_reason),
                CompletionChunk::Delta(text) => {
                    run.chunks += 1;
                    if text.is_empty() {
                        continue;
                    }
                    run.accumulator.push_str(&text);
                    self.emit_progress(run);
                }
            }
        }
    }

    fn emit_progress(&self, run: &StageRun<'_>) {
        let fragment = run.spec.parse(&run.accumulator);
        self.notifier.emit(
            run.channel,
            TurnEvent::Progress {
                turn_id: run.turn_id.to_string(),
                stage: run.spec.stage(),
                data: serde_json::to_value(&fragment).unwrap_or_default(),
            },
        );
    }
}
