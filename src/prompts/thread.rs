use serde::{Deserialize, Serialize};

use super::{END_PREVIOUS_CONVERSATION_TAG, PREVIOUS_CONVERSATION_TAG};
use crate::grammar::parse_answer;
use crate::grammar::tags::{tokenize, Tag, TaggedLine, ANSWER_TAG, QUESTION_TAG};

/// Question/answer summary of one completed turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadEntry {
    /// The student's question.
    pub question: String,
    /// Prose answer, without code or functions.
    pub answer: String,
}

/// Prior turns of a conversation, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationThread {
    /// Root turn id.
    pub thread_id: String,
    /// Entries, oldest first.
    pub entries: Vec<ThreadEntry>,
}

impl ThreadEntry {
    /// Create an entry.
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }

    /// Extract a summary from a turn's raw text.
    ///
    /// The question is the first `[question]:` line; the answer is the
    /// answer-grammar text from the following `[answer]:` line up to the
    /// next tag the answer grammar does not know. Either comes back empty
    /// when its tag is missing.
    pub fn from_raw(raw: &str) -> Self {
        let mut question = None;
        let mut answer_start = None;
        let mut answer_end = raw.len();
        let mut offset = 0;

        for line in raw.split_inclusive('\n') {
            if let TaggedLine::Tag { tag, content } = tokenize(line) {
                match tag {
                    Tag::Question if question.is_none() => {
                        question = Some(content.to_string());
                    }
                    Tag::Answer if question.is_some() && answer_start.is_none() => {
                        answer_start = Some(offset);
                    }
                    Tag::Question | Tag::Unknown(_) if answer_start.is_some() => {
                        answer_end = offset;
                        break;
                    }
                    _ => {}
                }
            }
            offset += line.len();
        }

        let answer = answer_start
            .and_then(|start| parse_answer(&raw[start..answer_end]).answer)
            .unwrap_or_default();

        Self {
            question: question.unwrap_or_default(),
            answer,
        }
    }

    /// Whether both sides are blank.
    pub fn is_empty(&self) -> bool {
        self.question.trim().is_empty() && self.answer.trim().is_empty()
    }
}

impl ConversationThread {
    /// Create an empty thread.
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            entries: Vec::new(),
        }
    }

    /// Append the next entry.
    pub fn push(&mut self, entry: ThreadEntry) {
        self.entries.push(entry);
    }

    /// Whether no entry has content.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(ThreadEntry::is_empty)
    }

    /// Render the history block for a follow-up prompt. Empty entries are
    /// omitted; an empty thread renders as an empty string.
    pub fn render(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        out.push_str(PREVIOUS_CONVERSATION_TAG);
        out.push('\n');
        for entry in self.entries.iter().filter(|e| !e.is_empty()) {
            out.push_str(&format!("{} {}\n", QUESTION_TAG, entry.question.trim()));
            out.push_str(&format!("{} {}\n", ANSWER_TAG, entry.answer.trim()));
        }
        out.push_str(END_PREVIOUS_CONVERSATION_TAG);
        out.push_str("\n\n");
        out
    }
}
