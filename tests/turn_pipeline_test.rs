//! Integration tests for the turn chain
//!
//! Runs whole turns against a scripted completion source and an in-memory
//! store, checking stage order, persistence and notifications.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use mockall::mock;
use tokio::sync::mpsc;

use tutor_stream::completion::{ChunkStream, CompletionChunk, CompletionRequest, CompletionSource};
use tutor_stream::config::ModelConfig;
use tutor_stream::error::{
    AppError, CompletionError, CompletionResult, StorageError, StorageResult, TurnError,
};
use tutor_stream::orchestrator::{ChannelEvent, ChannelNotifier, NullNotifier, TurnEvent};
use tutor_stream::prompts::StageKind;
use tutor_stream::storage::{Invocation, SqliteStorage, TurnStore};
use tutor_stream::turns::{TurnController, TurnCore, TurnInput, TurnKind, TurnResult};

/// What the source does for one submitted stage.
enum Script {
    Deltas(Vec<&'static str>),
    /// Stream some deltas, then fail mid-stream.
    Interrupted(Vec<&'static str>),
    /// Refuse the submission.
    Rejected,
}

/// Completion source that replays one script per stage and records prompts.
struct ScriptedSource {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedSource {
    fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }
}

fn delta(text: &str) -> CompletionResult<CompletionChunk> {
    Ok(CompletionChunk::Delta(text.to_string()))
}

#[async_trait]
impl CompletionSource for ScriptedSource {
    async fn submit(&self, request: CompletionRequest) -> CompletionResult<ChunkStream> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected stage submission");

        let items: Vec<CompletionResult<CompletionChunk>> = match script {
            Script::Deltas(texts) => texts
                .into_iter()
                .map(delta)
                .chain(std::iter::once(Ok(CompletionChunk::End {
                    finish_reason: Some("stop".to_string()),
                })))
                .collect(),
            Script::Interrupted(texts) => texts
                .into_iter()
                .map(delta)
                .chain(std::iter::once(Err(CompletionError::Stream {
                    message: "connection reset".to_string(),
                })))
                .collect(),
            Script::Rejected => {
                return Err(CompletionError::Api {
                    status: 400,
                    message: "bad request".to_string(),
                })
            }
        };
        Ok(stream::iter(items).boxed())
    }
}

struct Harness {
    controller: TurnController,
    storage: Arc<SqliteStorage>,
    source: Arc<ScriptedSource>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl Harness {
    async fn new(scripts: Vec<Script>) -> Self {
        let storage = Arc::new(SqliteStorage::new_in_memory().await.unwrap());
        let source = ScriptedSource::new(scripts);
        let (notifier, events) = ChannelNotifier::new();
        let core = TurnCore::new(source.clone(), storage.clone(), Arc::new(notifier));
        let controller =
            TurnController::new(core, ModelConfig::default(), Duration::from_secs(5));
        Self {
            controller,
            storage,
            source,
            events,
        }
    }

    fn drain_events(&mut self) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

fn progress_stages(events: &[ChannelEvent]) -> Vec<StageKind> {
    let mut stages = Vec::new();
    for event in events {
        if let TurnEvent::Progress { stage, .. } = event.event {
            if stages.last() != Some(&stage) {
                stages.push(stage);
            }
        }
    }
    stages
}

const CODE_ANSWER: [&str; 4] = [
    " The pointer is never initialized.\n",
    "[code]:\nint x = 0;\nint *p = &x;\n",
    "*p = 1;\n",
    "[end-code]",
];

const PSEUDOCODE: [&str; 2] = [
    "[code-title]: setup\nint x = 0; // make an int\n",
    "int *p = &x; // point at it\n*p = 1; // write through it",
];

#[cfg(test)]
mod chain_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_question_without_code_skips_pseudocode() {
        let mut h = Harness::new(vec![
            Script::Deltas(vec![" You can use", " fopen().\n"]),
            Script::Deltas(vec!["1. What does fclose do?\n2. ", "What is EOF?"]),
        ])
        .await;

        let turn = h
            .controller
            .execute("student-1", TurnInput::question("how can I read from a file?"))
            .await
            .unwrap();

        assert!(turn.finished);
        assert!(!turn.is_stalled());
        assert_eq!(turn.answer.as_deref(), Some("You can use fopen()."));
        assert_eq!(turn.code, None);
        assert_eq!(turn.pseudocode, None);
        assert_eq!(
            turn.suggestions,
            Some(vec![
                "What does fclose do?".to_string(),
                "What is EOF?".to_string()
            ])
        );
        assert!(turn.raw.ends_with("What is EOF?"));
        assert!(turn.raw.contains("[follow-up-questions]:"));

        let events = h.drain_events();
        assert_eq!(
            progress_stages(&events),
            vec![StageKind::Answer, StageKind::Suggestions]
        );
        assert_eq!(
            events.last().map(|e| &e.event),
            Some(&TurnEvent::Done {
                turn_id: turn.id.clone()
            })
        );
        assert!(events.iter().all(|e| e.channel == "student-1"));

        assert_eq!(h.source.prompts().len(), 2);
        assert!(h.source.prompts()[0].ends_with("[question]: how can I read from a file?\n[answer]:"));

        let stored = h.storage.load_turn(&turn.id).await.unwrap().unwrap();
        assert!(stored.finished);
        assert_eq!(stored.suggestions, turn.suggestions);
        assert_eq!(h.storage.turn_invocations(&turn.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fopen_library_reference() {
        let mut h = Harness::new(vec![
            Script::Deltas(vec![
                " You can use fopen() to open the file",
                " and fgets() to read it.\n[c-library-functions]:\n",
                "[function-1]: [name]: fopen <> [description]: opens a file <> ",
                "[include]: stdio.h <> [prototype]: FILE *fopen(const char*, const char*)\n",
                "[end-c-library-functions]",
            ]),
            Script::Deltas(vec!["1. How do I close a file?"]),
        ])
        .await;

        let turn = h
            .controller
            .execute("student-1", TurnInput::question("how can I read from a file?"))
            .await
            .unwrap();

        assert!(turn.finished);
        assert!(turn
            .answer
            .as_deref()
            .unwrap()
            .starts_with("You can use fopen()"));

        let functions = turn.library_functions.as_ref().unwrap();
        assert_eq!(functions.len(), 1);
        let fopen = functions[0].as_ref().unwrap();
        assert_eq!(fopen.name, "fopen");
        assert_eq!(fopen.description, "opens a file");
        assert_eq!(fopen.include, "stdio.h");
        assert_eq!(fopen.prototype, "FILE *fopen(const char*, const char*)");

        // no code block, so no pseudocode stage
        assert_eq!(h.source.prompts().len(), 2);

        let answer_progress: Vec<serde_json::Value> = h
            .drain_events()
            .into_iter()
            .filter_map(|e| match e.event {
                TurnEvent::Progress {
                    stage: StageKind::Answer,
                    data,
                    ..
                } => Some(data),
                _ => None,
            })
            .collect();
        assert_eq!(answer_progress.len(), 5);
        assert_eq!(
            answer_progress[4]["library_functions"][0]["name"],
            "fopen"
        );
    }

    #[tokio::test]
    async fn test_question_with_code_runs_all_stages() {
        let mut h = Harness::new(vec![
            Script::Deltas(CODE_ANSWER.to_vec()),
            Script::Deltas(PSEUDOCODE.to_vec()),
            Script::Deltas(vec!["1. What is a null pointer?"]),
        ])
        .await;

        let turn = h
            .controller
            .execute(
                "student-1",
                TurnInput::question("why does this crash?").with_code("int *p;\n*p = 1;"),
            )
            .await
            .unwrap();

        assert!(turn.finished);
        assert_eq!(
            turn.answer.as_deref(),
            Some("The pointer is never initialized.")
        );
        assert_eq!(turn.code.as_deref(), Some("int x = 0;\nint *p = &x;\n*p = 1;"));

        let sections = turn.pseudocode.as_ref().unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title.as_deref(), Some("setup"));
        assert_eq!(sections[0].lines.len(), 3);
        assert_eq!(sections[0].lines[2].code, "*p = 1;");
        assert_eq!(
            sections[0].lines[2].explanation.as_deref(),
            Some("write through it")
        );

        let prompts = h.source.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("[code]:\nint *p;\n*p = 1;\n[end-code]"));
        // The pseudocode stage explains the answer's code, not the student's.
        assert!(prompts[1].contains("int *p = &x;"));
        assert!(prompts[1].ends_with("[pseudo-code]:\n"));

        let events = h.drain_events();
        assert_eq!(
            progress_stages(&events),
            vec![
                StageKind::Answer,
                StageKind::PseudoCode,
                StageKind::Suggestions
            ]
        );
        assert!(events.last().unwrap().event.is_done());
    }

    #[tokio::test]
    async fn test_write_code_has_no_suggestions() {
        let mut h = Harness::new(vec![
            Script::Deltas(vec![
                " Here is a loop.\n[code]:\nint sum = 0;\n",
                "for (int i = 0; i < n; i++) sum += a[i];\n[end-code]",
            ]),
            Script::Deltas(vec!["sum = 0 // start at zero\nadd each item // accumulate"]),
        ])
        .await;

        let turn = h
            .controller
            .execute("student-2", TurnInput::write_code("sum an array"))
            .await
            .unwrap();

        assert!(turn.finished);
        assert_eq!(turn.kind, TurnKind::WriteCode);
        assert!(turn.code.is_some());
        assert_eq!(turn.pseudocode.as_ref().map(|s| s[0].lines.len()), Some(2));
        assert_eq!(turn.suggestions, None);
        assert_eq!(h.source.prompts().len(), 2);
        assert!(h.drain_events().last().unwrap().event.is_done());
    }

    #[tokio::test]
    async fn test_follow_up_prompt_carries_thread_history() {
        let h = Harness::new(vec![
            Script::Deltas(vec![" A variable holding an address."]),
            Script::Deltas(vec!["1. What is a double pointer?"]),
        ])
        .await;

        let root = h
            .controller
            .execute("student-1", TurnInput::question("what is a pointer?"))
            .await
            .unwrap();

        h.source
            .push(Script::Deltas(vec![" A pointer to a pointer."]));
        h.source.push(Script::Deltas(vec!["1. When would I use one?"]));

        let follow_up = h
            .controller
            .execute(
                "student-1",
                TurnInput::follow_up(root.id.clone(), "and a double pointer?"),
            )
            .await
            .unwrap();

        assert!(follow_up.finished);
        assert_eq!(follow_up.thread_id, root.id);
        assert_eq!(follow_up.kind, TurnKind::FollowUp);

        let prompt = &h.source.prompts()[2];
        let history = prompt
            .find("[question]: what is a pointer?\n[answer]: A variable holding an address.")
            .expect("history in prompt");
        let subject = prompt
            .rfind("[question]: and a double pointer?\n[answer]:")
            .expect("subject in prompt");
        assert!(history < subject);
        assert!(prompt.ends_with("[answer]:"));

        let thread = h.storage.thread_turns(&root.id).await.unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[1].id, follow_up.id);
    }
}

#[cfg(test)]
mod failure_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_middle_stage_failure_stalls_turn() {
        let mut h = Harness::new(vec![
            Script::Deltas(CODE_ANSWER.to_vec()),
            Script::Interrupted(vec!["[code-title]: setup\nint x = 0; // make an int\n"]),
        ])
        .await;

        let turn = h
            .controller
            .execute(
                "student-1",
                TurnInput::question("why does this crash?").with_code("int *p;\n*p = 1;"),
            )
            .await
            .unwrap();

        assert!(!turn.finished);
        assert_eq!(turn.stalled_stage, Some(StageKind::PseudoCode));
        assert!(turn.error.as_deref().unwrap().contains("connection reset"));
        assert_eq!(turn.pseudocode, None);
        assert_eq!(turn.suggestions, None);

        // suggestions never submitted
        assert_eq!(h.source.prompts().len(), 2);

        let events = h.drain_events();
        assert!(events.iter().all(|e| !e.event.is_done()));
        assert_eq!(
            progress_stages(&events),
            vec![StageKind::Answer, StageKind::PseudoCode]
        );

        let stored = h.storage.load_turn(&turn.id).await.unwrap().unwrap();
        assert!(!stored.finished);
        assert_eq!(
            stored.answer.as_deref(),
            Some("The pointer is never initialized.")
        );
        assert!(stored.code.is_some());
        assert_eq!(stored.stalled_stage, Some(StageKind::PseudoCode));

        let invocations = h.storage.turn_invocations(&turn.id).await.unwrap();
        assert_eq!(
            invocations.iter().map(|i| i.success).collect::<Vec<_>>(),
            vec![true, false]
        );
    }

    #[tokio::test]
    async fn test_rejected_first_stage_stalls_turn() {
        let mut h = Harness::new(vec![Script::Rejected]).await;

        let turn = h
            .controller
            .execute("student-1", TurnInput::question("what is a pointer?"))
            .await
            .unwrap();

        assert!(!turn.finished);
        assert_eq!(turn.stalled_stage, Some(StageKind::Answer));
        assert_eq!(turn.answer, None);
        assert!(h.drain_events().is_empty());

        let public = turn.public();
        assert!(public.stalled);
        assert!(!public.finished);
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let h = Harness::new(vec![]).await;

        let err = h
            .controller
            .execute("student-1", TurnInput::question("   "))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Turn(TurnError::Validation { .. })));
        assert!(h.source.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_follow_up_to_unknown_thread_rejected() {
        let h = Harness::new(vec![]).await;

        let err = h
            .controller
            .execute("student-1", TurnInput::follow_up("missing", "and then?"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::Turn(TurnError::ThreadNotFound { .. })
        ));
    }
}

mock! {
    Store {}

    #[async_trait]
    impl TurnStore for Store {
        async fn load_turn(&self, turn_id: &str) -> StorageResult<Option<TurnResult>>;
        async fn save_turn(&self, turn: &TurnResult) -> StorageResult<()>;
        async fn list_requester_turns(&self, requester: &str, limit: u32) -> StorageResult<Vec<TurnResult>>;
        async fn thread_turns(&self, thread_id: &str) -> StorageResult<Vec<TurnResult>>;
        async fn log_invocation(&self, invocation: &Invocation) -> StorageResult<()>;
    }
}

#[cfg(test)]
mod store_failure_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn controller(store: MockStore, source: Arc<ScriptedSource>) -> TurnController {
        let core = TurnCore::new(source, Arc::new(store), Arc::new(NullNotifier));
        TurnController::new(core, ModelConfig::default(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_save_failure_after_stage_propagates() {
        let mut store = MockStore::new();
        // initial save succeeds, the save after the answer stage fails
        store.expect_save_turn().times(1).returning(|_| Ok(()));
        store.expect_save_turn().returning(|_| {
            Err(StorageError::Query {
                message: "disk I/O error".to_string(),
            })
        });
        store.expect_log_invocation().returning(|_| Ok(()));

        let source = ScriptedSource::new(vec![Script::Deltas(vec![" An address."])]);
        let controller = controller(store, source.clone());

        let err = controller
            .execute("student-1", TurnInput::question("what is a pointer?"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Storage(StorageError::Query { .. })));
        assert_eq!(source.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_start_failure_submits_nothing() {
        let mut store = MockStore::new();
        store.expect_save_turn().returning(|_| {
            Err(StorageError::Connection {
                message: "database locked".to_string(),
            })
        });

        let source = ScriptedSource::new(vec![]);
        let controller = controller(store, source.clone());

        let err = controller
            .execute("student-1", TurnInput::question("what is a pointer?"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Storage(_)));
        assert!(source.prompts().is_empty());
    }
}
