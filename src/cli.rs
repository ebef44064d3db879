//! Command-line interface.
//!
//! `serve` (the default) runs the stdio JSON-RPC server. The remaining
//! commands run a single turn, or inspect stored turns, from a terminal.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use crate::orchestrator::{ChannelEvent, TurnEvent};
use crate::prompts::StageKind;
use crate::turns::{TurnController, TurnInput, TurnResult};

/// Default requester for turns started from the terminal.
pub const CLI_REQUESTER: &str = "cli";

/// Streaming programming-tutor backend.
#[derive(Parser, Debug)]
#[command(name = "tutor-stream", version, about)]
pub struct Cli {
    /// Command to run; defaults to `serve`.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Top-level commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve JSON-RPC requests on stdin/stdout
    Serve,

    /// Ask a question, optionally about a source file
    Ask {
        /// The question to ask
        question: String,

        /// Source file the question is about
        #[arg(long)]
        code: Option<PathBuf>,

        /// Requester id recorded on the turn
        #[arg(long, default_value = CLI_REQUESTER)]
        requester: String,
    },

    /// Ask a follow-up question in an existing thread
    FollowUp {
        /// Thread to continue
        thread_id: String,

        /// The question to ask
        question: String,

        /// Requester id recorded on the turn
        #[arg(long, default_value = CLI_REQUESTER)]
        requester: String,
    },

    /// Describe code to have it written
    WriteCode {
        /// What the code should do
        description: String,

        /// Requester id recorded on the turn
        #[arg(long, default_value = CLI_REQUESTER)]
        requester: String,
    },

    /// Show a stored turn
    Show {
        /// Turn id
        turn_id: String,
    },

    /// List a requester's recent turns
    History {
        /// Requester id
        #[arg(long, default_value = CLI_REQUESTER)]
        requester: String,

        /// Maximum number of turns to show
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

/// Result of CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output written to stdout
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Execute a non-serving command.
///
/// `events` is the receiving end of the notifier the controller was built
/// with; stage progress is reported on stderr while a turn runs.
pub async fn execute_command(
    command: Commands,
    controller: &TurnController,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
) -> CliResult {
    match command {
        Commands::Serve => CliResult::error("serve is handled by the binary"),
        Commands::Ask {
            question,
            code,
            requester,
        } => {
            let input = match code {
                Some(path) => match tokio::fs::read_to_string(&path).await {
                    Ok(code) => TurnInput::question(question).with_code(code),
                    Err(e) => {
                        return CliResult::error(format!(
                            "Failed to read {}: {}",
                            path.display(),
                            e
                        ))
                    }
                },
                None => TurnInput::question(question),
            };
            execute_turn(controller, events, &requester, input).await
        }
        Commands::FollowUp {
            thread_id,
            question,
            requester,
        } => {
            execute_turn(
                controller,
                events,
                &requester,
                TurnInput::follow_up(thread_id, question),
            )
            .await
        }
        Commands::WriteCode {
            description,
            requester,
        } => {
            execute_turn(
                controller,
                events,
                &requester,
                TurnInput::write_code(description),
            )
            .await
        }
        Commands::Show { turn_id } => match controller.core().store().load_turn(&turn_id).await {
            Ok(Some(turn)) => render(&turn),
            Ok(None) => CliResult::error(format!("Turn not found: {}", turn_id)),
            Err(e) => CliResult::error(format!("Failed to load turn: {}", e)),
        },
        Commands::History { requester, limit } => {
            match controller
                .core()
                .store()
                .list_requester_turns(&requester, limit)
                .await
            {
                Ok(turns) => CliResult::success(format_history(&turns)),
                Err(e) => CliResult::error(format!("Failed to list turns: {}", e)),
            }
        }
    }
}

async fn execute_turn(
    controller: &TurnController,
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    requester: &str,
    input: TurnInput,
) -> CliResult {
    let progress = tokio::spawn(async move {
        let mut current: Option<StageKind> = None;
        while let Some(ChannelEvent { event, .. }) = events.recv().await {
            match event {
                TurnEvent::Progress { stage, .. } if current != Some(stage) => {
                    eprintln!("… {}", stage);
                    current = Some(stage);
                }
                TurnEvent::Progress { .. } => {}
                TurnEvent::Done { .. } => break,
            }
        }
    });

    let result = controller.execute(requester, input).await;
    progress.abort();

    match result {
        Ok(turn) if turn.is_stalled() => {
            let mut result = render(&turn);
            result.exit_code = 2;
            result
        }
        Ok(turn) => render(&turn),
        Err(e) => CliResult::error(format!("Turn failed: {}", e)),
    }
}

fn render(turn: &TurnResult) -> CliResult {
    match serde_json::to_string_pretty(&turn.public()) {
        Ok(json) => CliResult::success(json),
        Err(e) => CliResult::error(format!("Failed to render turn: {}", e)),
    }
}

fn format_history(turns: &[TurnResult]) -> String {
    if turns.is_empty() {
        return "No turns recorded.".to_string();
    }

    turns
        .iter()
        .map(|turn| {
            let status = if turn.finished {
                "done"
            } else if turn.is_stalled() {
                "stalled"
            } else {
                "open"
            };
            format!(
                "{}  {:<10} {:<8} {}",
                turn.created_at.format("%Y-%m-%d %H:%M"),
                turn.kind.as_str(),
                status,
                turn.input.prompt_text()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_is_serve() {
        let cli = Cli::try_parse_from(["tutor-stream"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_ask_with_code() {
        let cli =
            Cli::try_parse_from(["tutor-stream", "ask", "why?", "--code", "main.c"]).unwrap();
        match cli.command {
            Some(Commands::Ask {
                question,
                code,
                requester,
            }) => {
                assert_eq!(question, "why?");
                assert_eq!(code, Some(PathBuf::from("main.c")));
                assert_eq!(requester, CLI_REQUESTER);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_format_history_empty() {
        assert_eq!(format_history(&[]), "No turns recorded.");
    }

    #[test]
    fn test_format_history_status() {
        let mut turn = TurnResult::new("cli", TurnInput::question("what is a pointer?"));
        turn.mark_stalled(StageKind::Answer, "boom");
        let out = format_history(&[turn]);
        assert!(out.contains("stalled"));
        assert!(out.contains("what is a pointer?"));
    }
}
