use serde::{Deserialize, Serialize};

/// Request to the text completion endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Full prompt text.
    pub prompt: String,
    /// Stop sequences are enforced by the completion source, not re-checked here.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    /// Sampling temperature.
    pub temperature: f64,
    /// Completion token cap.
    pub max_tokens: u32,
    /// Always `true` for stage runs.
    pub stream: bool,
}

/// One `data:` payload of a streamed completion
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionStreamChunk {
    /// Completion id.
    #[serde(default)]
    pub id: Option<String>,
    /// Model that produced the chunk.
    #[serde(default)]
    pub model: Option<String>,
    /// Choices; only the first is read.
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

/// A single choice inside a streamed chunk
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChoice {
    /// Text delta.
    #[serde(default)]
    pub text: String,
    /// Choice index.
    #[serde(default)]
    pub index: u32,
    /// Set on the last chunk of a choice.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Error payload sent in place of a chunk
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorEnvelope {
    /// Error details.
    pub error: ApiErrorBody,
}

/// Error details
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Human-readable message.
    pub message: String,
    /// Provider error type.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Incremental unit produced by a completion source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionChunk {
    /// New text appended to the completion.
    Delta(String),
    /// The source finished: end marker received or a stop sequence was hit.
    End {
        /// Reason reported by the source, if any.
        finish_reason: Option<String>,
    },
}

impl CompletionChunk {
    /// Returns true if no further chunks follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CompletionChunk::End { .. })
    }

    /// Convenience accessor for delta text.
    pub fn as_delta(&self) -> Option<&str> {
        match self {
            CompletionChunk::Delta(text) => Some(text.as_str()),
            CompletionChunk::End { .. } => None,
        }
    }
}

impl CompletionStreamChunk {
    /// Text and finish reason of the first choice.
    pub fn first_choice(&self) -> Option<&StreamChoice> {
        self.choices.iter().find(|c| c.index == 0).or(self.choices.first())
    }
}
