//! JSON-RPC 2.0 over stdio.
//!
//! Requests arrive one per line on stdin. Responses and turn notifications
//! share stdout through a single writer task so lines never interleave.
//! Turn methods reply as soon as the turn is saved; the stages run in a
//! background task and report through `turn/progress` / `turn/done`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::handlers::{handle_call, Dispatch, TurnStarted};
use super::notifier::{Outbound, OutboundMessage};
use super::SharedState;
use crate::error::RpcError;
use crate::turns::TurnResult;

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod rpc_tests;

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request identifier (None for notifications).
    pub id: Option<Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request identifier (null when the request could not be read).
    pub id: Value,
    /// The result on success (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code (negative for predefined errors).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Server information returned during initialization.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// Crate name.
    pub name: String,
    /// Crate version.
    pub version: String,
}

/// Result of the initialize handshake.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    /// Server identity.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    /// Methods this server answers.
    pub methods: Vec<&'static str>,
    /// Notification methods this server emits.
    pub notifications: Vec<&'static str>,
}

/// Methods answered by [`RpcServer`].
pub const METHODS: &[&str] = &[
    "initialize",
    "ping",
    "turn/ask",
    "turn/follow_up",
    "turn/write_code",
    "turn/get",
    "turn/list",
    "thread/get",
];

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// JSON-RPC error code for an [`RpcError`].
pub fn error_code(err: &RpcError) -> i32 {
    match err {
        RpcError::InvalidRequest { .. } => -32600,
        RpcError::UnknownMethod { .. } => -32601,
        RpcError::InvalidParameters { .. } => -32602,
        RpcError::ExecutionFailed { .. } | RpcError::Json(_) => -32603,
    }
}

/// JSON-RPC server over stdio.
pub struct RpcServer {
    state: SharedState,
    outbound: Outbound,
    turns: Mutex<JoinSet<()>>,
}

impl RpcServer {
    /// Create a new server. `outbound` must feed the receiver passed to `run`.
    pub fn new(state: SharedState, outbound: Outbound) -> Self {
        Self {
            state,
            outbound,
            turns: Mutex::new(JoinSet::new()),
        }
    }

    /// Run the server using async stdio
    pub async fn run(
        &self,
        outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    ) -> std::io::Result<()> {
        self.serve(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            outbound_rx,
        )
        .await
    }

    /// Serve requests from `reader` until EOF, writing to `writer`.
    ///
    /// On EOF, running turns are awaited and all queued output is flushed.
    pub async fn serve<R, W>(
        &self,
        mut reader: R,
        writer: W,
        outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    ) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        info!("Tutor stream server starting...");

        let writer_task = tokio::spawn(write_lines(writer, outbound_rx));
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            // EOF reached
            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(request = %trimmed, "Received request");

            match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    error!(error = %e, "Failed to parse request");
                    self.outbound.send(&JsonRpcResponse::error(
                        None,
                        -32700,
                        format!("Parse error: {}", e),
                    ));
                }
            }
        }

        self.drain_turns().await;
        self.outbound.flush().await;
        writer_task.abort();

        Ok(())
    }

    /// Handle a single JSON-RPC request: queue its response, then start
    /// its turn if it created one. The reply always precedes the turn's
    /// first notification.
    pub async fn handle_request(&self, request: JsonRpcRequest) {
        let (response, turn) = self.dispatch(request).await;
        if let Some(response) = response {
            self.outbound.send(&response);
        }
        if let Some(turn) = turn {
            self.spawn_turn(turn).await;
        }
    }

    /// Route a request. No response is produced for notifications
    /// (requests without id).
    async fn dispatch(&self, request: JsonRpcRequest) -> (Option<JsonRpcResponse>, Option<TurnResult>) {
        let is_notification = request.id.is_none();

        if request.jsonrpc != "2.0" {
            let response = (!is_notification).then(|| {
                JsonRpcResponse::error(request.id, -32600, "Invalid request: jsonrpc must be 2.0")
            });
            return (response, None);
        }

        match request.method.as_str() {
            "initialize" => (Some(self.handle_initialize(request.id)), None),
            "initialized" | "notifications/cancelled" => {
                debug!(method = %request.method, "Received notification");
                (None, None)
            }
            "ping" => (
                Some(JsonRpcResponse::success(
                    request.id,
                    Value::Object(Default::default()),
                )),
                None,
            ),
            method => match handle_call(&self.state, method, request.params).await {
                Ok(Dispatch::Reply(value)) => (
                    (!is_notification).then(|| JsonRpcResponse::success(request.id, value)),
                    None,
                ),
                Ok(Dispatch::Turn(turn)) => {
                    let started = TurnStarted {
                        turn_id: turn.id.clone(),
                        thread_id: turn.thread_id.clone(),
                    };
                    let response = match serde_json::to_value(started) {
                        Ok(value) => JsonRpcResponse::success(request.id, value),
                        Err(e) => JsonRpcResponse::error(
                            request.id,
                            -32603,
                            format!("Internal error: {}", e),
                        ),
                    };
                    // A notification still starts its turn; only the reply is dropped.
                    ((!is_notification).then_some(response), Some(turn))
                }
                Err(e) if is_notification => {
                    debug!(method = %method, error = %e, "Notification failed, ignoring");
                    (None, None)
                }
                Err(e) => {
                    error!(method = %method, error = %e, "Call failed");
                    (
                        Some(JsonRpcResponse::error(request.id, error_code(&e), e.to_string())),
                        None,
                    )
                }
            },
        }
    }

    /// Handle initialize request
    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        let result = InitializeResult {
            server_info: ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            methods: METHODS.to_vec(),
            notifications: vec![super::PROGRESS_METHOD, super::DONE_METHOD],
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize initialize result");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        }
    }

    async fn spawn_turn(&self, turn: TurnResult) {
        let controller = self.state.controller.clone();
        let mut turns = self.turns.lock().await;

        // Reap finished tasks so the set does not grow without bound.
        while turns.try_join_next().is_some() {}

        turns.spawn(async move {
            let turn_id = turn.id.clone();
            if let Err(e) = controller.run_turn(turn).await {
                error!(turn_id = %turn_id, error = %e, "Turn aborted");
            }
        });
    }

    async fn drain_turns(&self) {
        let mut turns = self.turns.lock().await;
        if !turns.is_empty() {
            info!(running = turns.len(), "Waiting for running turns");
        }
        while let Some(joined) = turns.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Turn task panicked");
            }
        }
    }
}

/// Single writer for stdout.
async fn write_lines<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<OutboundMessage>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        match message {
            OutboundMessage::Line(line) => {
                debug!(message = %line, "Sending message");
                let written = async {
                    writer.write_all(line.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                    writer.flush().await?;
                    Ok::<_, std::io::Error>(())
                }
                .await;
                if let Err(e) = written {
                    error!(error = %e, "Failed to write message");
                    return;
                }
            }
            OutboundMessage::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}
