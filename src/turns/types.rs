use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TurnError;
use crate::grammar::{LibraryFunction, ParsedFragment, PseudoSection};
use crate::prompts::{StageKind, ThreadEntry};

/// Interaction type of a turn. Each kind runs a fixed stage pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    /// answer → pseudocode (if code) → suggestions
    Question,
    /// answer with thread history → pseudocode (if code) → suggestions
    FollowUp,
    /// answer → pseudocode (if code)
    WriteCode,
}

impl TurnKind {
    /// Get the kind name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnKind::Question => "question",
            TurnKind::FollowUp => "follow_up",
            TurnKind::WriteCode => "write_code",
        }
    }

    /// Whether the pipeline ends with a suggestions stage.
    pub fn suggests_follow_ups(&self) -> bool {
        !matches!(self, TurnKind::WriteCode)
    }
}

impl std::fmt::Display for TurnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TurnKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "question" => Ok(TurnKind::Question),
            "follow_up" => Ok(TurnKind::FollowUp),
            "write_code" => Ok(TurnKind::WriteCode),
            _ => Err(format!("Unknown turn kind: {}", s)),
        }
    }
}

/// What the student asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnInput {
    /// A new question, optionally about the student's code.
    Question {
        /// Question text.
        question: String,
        /// Student code the question refers to.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// A question continuing an existing thread.
    FollowUp {
        /// Root turn id of the thread.
        thread_id: String,
        /// Question text.
        question: String,
    },
    /// A request to write code from a description.
    WriteCode {
        /// What the code should do.
        description: String,
    },
}

impl TurnInput {
    /// Create a question input
    pub fn question(question: impl Into<String>) -> Self {
        TurnInput::Question {
            question: question.into(),
            code: None,
        }
    }

    /// Attach the student's code to a question. No-op for other kinds.
    pub fn with_code(self, code: impl Into<String>) -> Self {
        match self {
            TurnInput::Question { question, .. } => TurnInput::Question {
                question,
                code: Some(code.into()),
            },
            other => other,
        }
    }

    /// Create a follow-up input
    pub fn follow_up(thread_id: impl Into<String>, question: impl Into<String>) -> Self {
        TurnInput::FollowUp {
            thread_id: thread_id.into(),
            question: question.into(),
        }
    }

    /// Create a write-code input
    pub fn write_code(description: impl Into<String>) -> Self {
        TurnInput::WriteCode {
            description: description.into(),
        }
    }

    /// Kind of turn this input starts.
    pub fn kind(&self) -> TurnKind {
        match self {
            TurnInput::Question { .. } => TurnKind::Question,
            TurnInput::FollowUp { .. } => TurnKind::FollowUp,
            TurnInput::WriteCode { .. } => TurnKind::WriteCode,
        }
    }

    /// The student's request text.
    pub fn prompt_text(&self) -> &str {
        match self {
            TurnInput::Question { question, .. } | TurnInput::FollowUp { question, .. } => question,
            TurnInput::WriteCode { description } => description,
        }
    }

    /// Reject inputs that cannot produce a prompt.
    pub fn validate(&self) -> Result<(), TurnError> {
        let (field, value) = match self {
            TurnInput::Question { question, .. } => ("question", question),
            TurnInput::FollowUp { thread_id, question } => {
                if thread_id.trim().is_empty() {
                    return Err(TurnError::Validation {
                        field: "thread_id".to_string(),
                        reason: "cannot be empty".to_string(),
                    });
                }
                ("question", question)
            }
            TurnInput::WriteCode { description } => ("description", description),
        };

        if value.trim().is_empty() {
            return Err(TurnError::Validation {
                field: field.to_string(),
                reason: "cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Aggregate record of one turn, mutated in place as stages resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    /// Unique turn identifier.
    pub id: String,
    /// Requester channel the turn belongs to.
    pub requester: String,
    /// Thread this turn is part of. A root turn's thread id is its own id.
    pub thread_id: String,
    /// Pipeline the turn runs.
    pub kind: TurnKind,
    /// What the student sent.
    pub input: TurnInput,
    /// Primary answer text.
    pub answer: Option<String>,
    /// C library references; `None` entries are unfilled slots.
    pub library_functions: Option<Vec<Option<LibraryFunction>>>,
    /// Code block from the answer stage.
    pub code: Option<String>,
    /// Pseudocode explaining `code`.
    pub pseudocode: Option<Vec<PseudoSection>>,
    /// Follow-up suggestions, empties removed.
    pub suggestions: Option<Vec<String>>,
    /// Request block plus completion of the most recent stage.
    pub raw: String,
    /// Set only after every stage of the pipeline resolved.
    pub finished: bool,
    /// Stage that failed, for stalled turns.
    pub stalled_stage: Option<StageKind>,
    /// Error text of the failed stage.
    pub error: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// Client-facing projection of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicTurn {
    /// Turn id.
    pub id: String,
    /// Thread id.
    pub thread_id: String,
    /// Turn kind.
    pub kind: TurnKind,
    /// What the student sent.
    pub input: TurnInput,
    /// Answer text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// Library references with holes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_functions: Option<Vec<Option<LibraryFunction>>>,
    /// Code block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Pseudocode sections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pseudocode: Option<Vec<PseudoSection>>,
    /// Follow-up suggestions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    /// Whether every stage resolved.
    pub finished: bool,
    /// True when a stage failed and the turn will not finish on its own.
    pub stalled: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl TurnResult {
    /// Start a new, empty turn.
    pub fn new(requester: impl Into<String>, input: TurnInput) -> Self {
        let id = Uuid::new_v4().to_string();
        let thread_id = match &input {
            TurnInput::FollowUp { thread_id, .. } => thread_id.clone(),
            _ => id.clone(),
        };
        let now = Utc::now();

        Self {
            id,
            requester: requester.into(),
            thread_id,
            kind: input.kind(),
            input,
            answer: None,
            library_functions: None,
            code: None,
            pseudocode: None,
            suggestions: None,
            raw: String::new(),
            finished: false,
            stalled_stage: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Write a resolved fragment's fields onto the turn.
    ///
    /// Only fields the fragment actually carries are written, so a later
    /// stage never clears what an earlier one set.
    pub fn merge(&mut self, fragment: &ParsedFragment) {
        match fragment {
            ParsedFragment::Answer(answer) => {
                if let Some(text) = &answer.answer {
                    self.answer = Some(text.clone());
                }
                if let Some(functions) = &answer.library_functions {
                    self.library_functions = Some(functions.clone());
                }
                if let Some(code) = &answer.code {
                    self.code = Some(code.clone());
                }
            }
            ParsedFragment::PseudoCode(pseudo) => {
                if !pseudo.sections.is_empty() {
                    self.pseudocode = Some(pseudo.sections.clone());
                }
            }
            ParsedFragment::Suggestions(fragment) => {
                let suggestions: Vec<String> = fragment
                    .suggestions
                    .iter()
                    .filter(|s| !s.is_empty())
                    .cloned()
                    .collect();
                if !suggestions.is_empty() {
                    self.suggestions = Some(suggestions);
                }
            }
        }
        self.touch();
    }

    /// Code block to explain, if the answer produced a non-empty one.
    pub fn code_block(&self) -> Option<&str> {
        self.code.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Replace the raw text.
    pub fn set_raw(&mut self, raw: String) {
        self.raw = raw;
        self.touch();
    }

    /// Mark every stage resolved.
    pub fn mark_finished(&mut self) {
        self.finished = true;
        self.stalled_stage = None;
        self.error = None;
        self.touch();
    }

    /// Record the stage that failed. The turn stays unfinished.
    pub fn mark_stalled(&mut self, stage: StageKind, error: impl Into<String>) {
        self.finished = false;
        self.stalled_stage = Some(stage);
        self.error = Some(error.into());
        self.touch();
    }

    /// Whether a stage failed.
    pub fn is_stalled(&self) -> bool {
        self.stalled_stage.is_some()
    }

    /// Summary of this turn for follow-up prompts.
    ///
    /// Taken from the tagged raw text when it carries both tags, otherwise
    /// from the typed fields.
    pub fn thread_entry(&self) -> ThreadEntry {
        let entry = ThreadEntry::from_raw(&self.raw);
        if !entry.question.is_empty() && !entry.answer.is_empty() {
            return entry;
        }
        ThreadEntry::new(
            self.input.prompt_text(),
            self.answer.clone().unwrap_or_default(),
        )
    }

    /// Projection sent to clients: no raw text, no internal error detail.
    pub fn public(&self) -> PublicTurn {
        PublicTurn {
            id: self.id.clone(),
            thread_id: self.thread_id.clone(),
            kind: self.kind,
            input: self.input.clone(),
            answer: self.answer.clone(),
            library_functions: self.library_functions.clone(),
            code: self.code.clone(),
            pseudocode: self.pseudocode.clone(),
            suggestions: self.suggestions.clone(),
            finished: self.finished,
            stalled: self.is_stalled(),
            created_at: self.created_at,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
