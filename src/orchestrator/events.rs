use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::prompts::StageKind;

/// Event pushed to a requester channel while a turn runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Best-effort fragment of the stage currently streaming.
    Progress {
        /// Turn being run.
        turn_id: String,
        /// Stage that produced `data`.
        stage: StageKind,
        /// The serialized fragment parsed so far.
        data: serde_json::Value,
    },
    /// Every stage of the turn resolved. Carries identifiers only.
    Done {
        /// Turn that finished.
        turn_id: String,
    },
}

impl TurnEvent {
    /// Turn the event belongs to.
    pub fn turn_id(&self) -> &str {
        match self {
            TurnEvent::Progress { turn_id, .. } | TurnEvent::Done { turn_id } => turn_id,
        }
    }

    /// Whether this is the terminal event of a turn.
    pub fn is_done(&self) -> bool {
        matches!(self, TurnEvent::Done { .. })
    }
}

/// Delivery target for turn events.
///
/// `emit` must not block and must preserve call order per channel.
/// Delivery failures are the notifier's concern; they never fail a turn.
pub trait Notifier: Send + Sync {
    /// Deliver `event` to the requester identified by `channel`.
    fn emit(&self, channel: &str, event: TurnEvent);
}

/// Event addressed to a requester channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    /// Requester the event is addressed to.
    pub channel: String,
    /// The event.
    pub event: TurnEvent,
}

/// Notifier that forwards events into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn emit(&self, channel: &str, event: TurnEvent) {
        let turn_id = event.turn_id().to_string();
        if self
            .tx
            .send(ChannelEvent {
                channel: channel.to_string(),
                event,
            })
            .is_err()
        {
            warn!(channel = %channel, turn_id = %turn_id, "Event receiver dropped");
        }
    }
}

/// Notifier that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn emit(&self, _channel: &str, _event: TurnEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = TurnEvent::Progress {
            turn_id: "t1".to_string(),
            stage: StageKind::PseudoCode,
            data: serde_json::json!({"sections": []}),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "progress");
        assert_eq!(json["stage"], "pseudocode");
        assert_eq!(json["turn_id"], "t1");

        let json = serde_json::to_value(TurnEvent::Done {
            turn_id: "t1".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"kind": "done", "turn_id": "t1"}));
    }

    #[tokio::test]
    async fn test_channel_notifier_preserves_order() {
        let (notifier, mut rx) = ChannelNotifier::new();
        for i in 0..3 {
            notifier.emit(
                "student-1",
                TurnEvent::Progress {
                    turn_id: "t".to_string(),
                    stage: StageKind::Answer,
                    data: serde_json::json!(i),
                },
            );
        }
        notifier.emit("student-1", TurnEvent::Done { turn_id: "t".to_string() });

        for i in 0..3 {
            let received = rx.recv().await.unwrap();
            assert_eq!(received.channel, "student-1");
            assert!(matches!(received.event, TurnEvent::Progress { data, .. } if data == i));
        }
        assert!(rx.recv().await.unwrap().event.is_done());
    }

    #[test]
    fn test_channel_notifier_survives_dropped_receiver() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        notifier.emit("c", TurnEvent::Done { turn_id: "t".to_string() });
    }
}
