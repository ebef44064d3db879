//! Tests for the stdio JSON-RPC loop.

use super::*;
use crate::completion::{ChunkStream, CompletionChunk, CompletionRequest, CompletionSource};
use crate::config::{
    CompletionConfig, DatabaseConfig, LogFormat, LoggingConfig, ModelConfig, RequestConfig,
};
use crate::error::CompletionResult;
use crate::server::{AppState, StdioNotifier, DONE_METHOD, PROGRESS_METHOD};
use crate::storage::SqliteStorage;
use crate::turns::{TurnController, TurnCore};
use crate::Config;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// Replays one scripted completion per submitted stage.
struct ScriptedSource {
    scripts: std::sync::Mutex<VecDeque<Vec<&'static str>>>,
}

impl ScriptedSource {
    fn new(scripts: Vec<Vec<&'static str>>) -> Self {
        Self {
            scripts: std::sync::Mutex::new(scripts.into()),
        }
    }
}

#[async_trait]
impl CompletionSource for ScriptedSource {
    async fn submit(&self, _request: CompletionRequest) -> CompletionResult<ChunkStream> {
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        let mut chunks: Vec<CompletionResult<CompletionChunk>> = script
            .into_iter()
            .map(|text| Ok(CompletionChunk::Delta(text.to_string())))
            .collect();
        chunks.push(Ok(CompletionChunk::End {
            finish_reason: Some("stop".to_string()),
        }));
        Ok(stream::iter(chunks).boxed())
    }
}

fn test_config() -> Config {
    Config {
        completion: CompletionConfig {
            api_key: "test-key".to_string(),
            base_url: "http://localhost".to_string(),
        },
        database: DatabaseConfig {
            path: PathBuf::from(":memory:"),
            max_connections: 1,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        },
        request: RequestConfig::default(),
        models: ModelConfig::default(),
    }
}

async fn create_server(scripts: Vec<Vec<&'static str>>) -> (RpcServer, SharedState, mpsc::UnboundedReceiver<OutboundMessage>) {
    let (outbound, outbound_rx) = Outbound::channel();
    let storage = Arc::new(SqliteStorage::new_in_memory().await.unwrap());
    let core = TurnCore::new(
        Arc::new(ScriptedSource::new(scripts)),
        storage,
        Arc::new(StdioNotifier::new(outbound.clone())),
    );
    let config = test_config();
    let controller = TurnController::new(core, config.models.clone(), Duration::from_secs(5));
    let state: SharedState = Arc::new(AppState::new(config, controller));
    (RpcServer::new(state.clone(), outbound), state, outbound_rx)
}

/// Feed `input` through the server and collect every output line.
async fn run_session(server: &RpcServer, rx: mpsc::UnboundedReceiver<OutboundMessage>, input: &str) -> Vec<Value> {
    let (writer, mut reader) = tokio::io::duplex(1 << 20);
    server.serve(input.as_bytes(), writer, rx).await.unwrap();

    let mut output = String::new();
    tokio::time::timeout(Duration::from_secs(5), reader.read_to_string(&mut output))
        .await
        .expect("writer not released")
        .unwrap();

    output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_initialize_and_ping() {
    let (server, _state, rx) = create_server(vec![]).await;
    let out = run_session(
        &server,
        rx,
        concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n"
        ),
    )
    .await;

    assert_eq!(out.len(), 2);
    assert_eq!(out[0]["id"], 1);
    assert_eq!(out[0]["result"]["serverInfo"]["name"], "tutor-stream");
    assert!(out[0]["result"]["methods"]
        .as_array()
        .unwrap()
        .contains(&Value::from("turn/ask")));
    assert_eq!(out[1]["id"], 2);
    assert_eq!(out[1]["result"], serde_json::json!({}));
}

#[tokio::test]
async fn test_protocol_errors() {
    let (server, _state, rx) = create_server(vec![]).await;
    let out = run_session(
        &server,
        rx,
        concat!(
            "not json\n",
            r#"{"jsonrpc":"2.0","id":1,"method":"turn/bogus"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"turn/bogus"}"#,
            "\n",
            r#"{"jsonrpc":"1.0","id":2,"method":"ping"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":3,"method":"turn/ask","params":{"requester":"s","question":"  "}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":4,"method":"thread/get","params":{"thread_id":"missing"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":5,"method":"turn/get"}"#,
            "\n"
        ),
    )
    .await;

    let codes: Vec<(Value, i64)> = out
        .iter()
        .map(|r| (r["id"].clone(), r["error"]["code"].as_i64().unwrap()))
        .collect();
    assert_eq!(
        codes,
        vec![
            (Value::Null, -32700),
            (Value::from(1), -32601),
            (Value::from(2), -32600),
            (Value::from(3), -32602),
            (Value::from(4), -32602),
            (Value::from(5), -32602),
        ]
    );
}

#[tokio::test]
async fn test_turn_ask_streams_and_finishes() {
    let (server, state, rx) = create_server(vec![
        vec![" You can", " use fopen().\n"],
        vec!["1. What does fclose do?\n", "2. What is EOF?"],
    ])
    .await;

    let out = run_session(
        &server,
        rx,
        concat!(
            r#"{"jsonrpc":"2.0","id":7,"method":"turn/ask","params":{"requester":"student-1","question":"how can I read from a file?"}}"#,
            "\n"
        ),
    )
    .await;

    // reply first
    assert_eq!(out[0]["id"], 7);
    let turn_id = out[0]["result"]["turn_id"].as_str().unwrap().to_string();
    assert_eq!(out[0]["result"]["thread_id"], turn_id.as_str());

    let methods: Vec<&str> = out[1..]
        .iter()
        .map(|n| n["method"].as_str().unwrap())
        .collect();
    assert_eq!(
        methods,
        vec![
            PROGRESS_METHOD,
            PROGRESS_METHOD,
            PROGRESS_METHOD,
            PROGRESS_METHOD,
            DONE_METHOD
        ]
    );
    assert_eq!(out[1]["params"]["stage"], "answer");
    assert_eq!(out[3]["params"]["stage"], "suggestions");
    assert_eq!(out[5]["params"]["turn_id"], turn_id.as_str());
    assert_eq!(out[5]["params"]["requester"], "student-1");

    let turn = state.storage.load_turn(&turn_id).await.unwrap().unwrap();
    assert!(turn.finished);
    assert_eq!(turn.answer.as_deref(), Some("You can use fopen()."));
    assert!(turn.pseudocode.is_none());
    assert_eq!(
        turn.suggestions,
        Some(vec![
            "What does fclose do?".to_string(),
            "What is EOF?".to_string()
        ])
    );
}

#[tokio::test]
async fn test_turn_get_and_thread_get() {
    let (server, state, _rx) = create_server(vec![]).await;

    let turn = crate::turns::TurnResult::new("s", crate::turns::TurnInput::question("q?"));
    state.storage.save_turn(&turn).await.unwrap();

    let (outbound, rx) = Outbound::channel();
    let server = RpcServer::new(server.state.clone(), outbound);
    let input = format!(
        "{}\n{}\n{}\n",
        serde_json::json!({"jsonrpc":"2.0","id":1,"method":"turn/get","params":{"turn_id": turn.id}}),
        serde_json::json!({"jsonrpc":"2.0","id":2,"method":"thread/get","params":{"thread_id": turn.thread_id}}),
        serde_json::json!({"jsonrpc":"2.0","id":3,"method":"turn/list","params":{"requester":"s"}}),
    );
    let out = run_session(&server, rx, &input).await;

    assert_eq!(out[0]["result"]["id"], turn.id.as_str());
    assert_eq!(out[0]["result"]["finished"], false);
    assert!(out[0]["result"].get("raw").is_none());
    assert_eq!(out[1]["result"]["turns"].as_array().unwrap().len(), 1);
    assert_eq!(out[2]["result"]["turns"][0]["id"], turn.id.as_str());
}

#[test]
fn test_error_codes() {
    assert_eq!(
        error_code(&RpcError::UnknownMethod {
            method: "x".to_string()
        }),
        -32601
    );
    assert_eq!(
        error_code(&RpcError::ExecutionFailed {
            message: "x".to_string()
        }),
        -32603
    );
}
