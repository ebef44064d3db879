use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, warn};

use crate::orchestrator::{Notifier, TurnEvent};

/// JSON-RPC method used for progress events.
pub const PROGRESS_METHOD: &str = "turn/progress";
/// JSON-RPC method used for done events.
pub const DONE_METHOD: &str = "turn/done";

/// JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Serialize)]
pub struct JsonRpcNotification {
    /// Always `2.0`.
    pub jsonrpc: String,
    /// Notification method.
    pub method: String,
    /// Notification payload.
    pub params: Value,
}

/// Message for the single stdout writer.
#[derive(Debug)]
pub enum OutboundMessage {
    /// One serialized JSON line.
    Line(String),
    /// Acknowledged once every earlier line has been written.
    Flush(oneshot::Sender<()>),
}

/// Handle for queueing lines to the writer task.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl Outbound {
    /// Create a handle and the receiver the writer task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Serialize `message` and queue it as one line.
    pub fn send<T: Serialize>(&self, message: &T) {
        match serde_json::to_string(message) {
            Ok(line) => {
                if self.tx.send(OutboundMessage::Line(line)).is_err() {
                    warn!("Outbound writer closed, dropping message");
                }
            }
            Err(e) => error!(error = %e, "Failed to serialize outbound message"),
        }
    }

    /// Wait until everything queued so far has been written.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(OutboundMessage::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

/// Notifier that writes turn events as JSON-RPC notifications.
///
/// The requester channel travels inside the params; a stdio transport
/// has a single peer.
#[derive(Debug, Clone)]
pub struct StdioNotifier {
    outbound: Outbound,
}

impl StdioNotifier {
    /// Create a notifier writing through `outbound`.
    pub fn new(outbound: Outbound) -> Self {
        Self { outbound }
    }
}

impl Notifier for StdioNotifier {
    fn emit(&self, channel: &str, event: TurnEvent) {
        let method = if event.is_done() {
            DONE_METHOD
        } else {
            PROGRESS_METHOD
        };

        let mut params = serde_json::to_value(&event).unwrap_or_default();
        if let Value::Object(map) = &mut params {
            map.remove("kind");
            map.insert("requester".to_string(), Value::String(channel.to_string()));
        }

        self.outbound.send(&JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        });
    }
}
