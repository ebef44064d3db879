use std::time::Duration;
use tracing::{debug, info, warn};

use super::{TurnCore, TurnInput, TurnResult};
use crate::config::ModelConfig;
use crate::error::{AppResult, TurnError};
use crate::orchestrator::{StreamingOrchestrator, TurnEvent};
use crate::prompts::{
    answer_prompt, pseudocode_prompt, suggestions_prompt, write_code_prompt, PromptSpec,
};
use crate::storage::Invocation;

/// Runs the stage pipeline of a turn and merges the results.
///
/// Stages are strictly serial. A stage failure stalls the turn: the
/// remaining stages are skipped, the turn is saved unfinished with the
/// failing stage recorded, and no `done` event is sent. Storage failures
/// are returned to the caller.
#[derive(Clone)]
pub struct TurnController {
    core: TurnCore,
    orchestrator: StreamingOrchestrator,
    models: ModelConfig,
}

impl TurnController {
    /// Create a new controller. `idle_timeout` bounds each wait for a chunk.
    pub fn new(core: TurnCore, models: ModelConfig, idle_timeout: Duration) -> Self {
        let orchestrator = StreamingOrchestrator::new(
            core.source().clone(),
            core.notifier().clone(),
            idle_timeout,
        );
        Self {
            core,
            orchestrator,
            models,
        }
    }

    /// Shared collaborators.
    pub fn core(&self) -> &TurnCore {
        &self.core
    }

    /// Validate the input, create the turn and save its initial state.
    pub async fn start_turn(&self, requester: &str, input: TurnInput) -> AppResult<TurnResult> {
        input.validate()?;

        if let TurnInput::FollowUp { thread_id, .. } = &input {
            if self.core.store().thread_turns(thread_id).await?.is_empty() {
                return Err(TurnError::ThreadNotFound {
                    thread_id: thread_id.clone(),
                }
                .into());
            }
        }

        let turn = TurnResult::new(requester, input);
        self.core.store().save_turn(&turn).await?;

        info!(
            turn_id = %turn.id,
            thread_id = %turn.thread_id,
            kind = %turn.kind,
            requester = %turn.requester,
            "Turn started"
        );
        Ok(turn)
    }

    /// Run every stage of a started turn.
    ///
    /// Returns the turn in its terminal state: finished, or stalled when a
    /// stage failed.
    pub async fn run_turn(&self, mut turn: TurnResult) -> AppResult<TurnResult> {
        if !self.run_pipeline(&mut turn).await? {
            warn!(
                turn_id = %turn.id,
                stage = ?turn.stalled_stage,
                error = ?turn.error,
                "Turn stalled"
            );
            return Ok(turn);
        }

        turn.mark_finished();
        self.core.store().save_turn(&turn).await?;
        self.core.notifier().emit(
            &turn.requester,
            TurnEvent::Done {
                turn_id: turn.id.clone(),
            },
        );

        info!(turn_id = %turn.id, "Turn finished");
        Ok(turn)
    }

    /// Start and run a turn in one call.
    pub async fn execute(&self, requester: &str, input: TurnInput) -> AppResult<TurnResult> {
        let turn = self.start_turn(requester, input).await?;
        self.run_turn(turn).await
    }

    /// Returns false when a stage failed.
    async fn run_pipeline(&self, turn: &mut TurnResult) -> AppResult<bool> {
        let answer = self.answer_spec(turn).await?;
        if !self.run_stage(turn, &answer).await? {
            return Ok(false);
        }

        match turn.code_block().map(str::to_string) {
            Some(code) => {
                let spec = pseudocode_prompt(&code, &self.models.pseudocode);
                if !self.run_stage(turn, &spec).await? {
                    return Ok(false);
                }
            }
            None => debug!(turn_id = %turn.id, "No code block, skipping pseudocode stage"),
        }

        if turn.kind.suggests_follow_ups() {
            let spec = suggestions_prompt(
                turn.input.prompt_text(),
                turn.answer.as_deref().unwrap_or_default(),
                &self.models.suggestions,
            );
            if !self.run_stage(turn, &spec).await? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    async fn answer_spec(&self, turn: &TurnResult) -> AppResult<PromptSpec> {
        let params = &self.models.answer;
        let spec = match &turn.input {
            TurnInput::Question { question, code } => {
                answer_prompt(question, code.as_deref(), None, params)
            }
            TurnInput::FollowUp {
                thread_id,
                question,
            } => {
                let thread = self.core.store().load_thread(thread_id).await?;
                debug!(
                    turn_id = %turn.id,
                    thread_id = %thread_id,
                    history = thread.entries.len(),
                    "Loaded thread history"
                );
                answer_prompt(question, None, Some(&thread), params)
            }
            TurnInput::WriteCode { description } => write_code_prompt(description, params),
        };
        Ok(spec)
    }

    /// Run one stage, merge and save. Returns false when the stage failed.
    async fn run_stage(&self, turn: &mut TurnResult, spec: &PromptSpec) -> AppResult<bool> {
        let invocation = Invocation::new(
            &turn.id,
            spec.stage(),
            spec.model(),
            spec.prompt_text().len(),
        );

        match self
            .orchestrator
            .run_stage(spec, &turn.requester, &turn.id)
            .await
        {
            Ok(outcome) => {
                turn.merge(&outcome.fragment);
                turn.set_raw(spec.render_raw(&outcome.text));

                let invocation = invocation.success(outcome.text.len(), outcome.latency_ms);
                self.core.store().log_invocation(&invocation).await?;
                self.core.store().save_turn(turn).await?;
                Ok(true)
            }
            Err(e) => {
                let latency = (chrono::Utc::now() - invocation.created_at).num_milliseconds();
                let invocation = invocation.failure(e.to_string(), latency);
                self.core.store().log_invocation(&invocation).await?;

                turn.mark_stalled(spec.stage(), e.to_string());
                self.core.store().save_turn(turn).await?;
                Ok(false)
            }
        }
    }
}
