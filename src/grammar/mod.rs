//! Tag grammar parsers for streamed model output.
//!
//! Each parser takes the *full* text accumulated so far for a stage and
//! returns the best-effort fragment for it. Parsers hold no state between
//! calls and never fail: missing or malformed tags simply leave fields unset.
//!
//! - [`parse_answer`]: `[answer]:`, `[code]:` … `[end-code]`,
//!   `[c-library-functions]:` … `[end-c-library-functions]`
//! - [`parse_pseudocode`]: `[code-title]:` sections of `code // explanation` lines
//! - [`parse_suggestions`]: numbered follow-up suggestions

mod answer;
mod pseudocode;
mod suggestions;
/// Line tokenizer, tag literals and the scope stack.
pub mod tags;


pub use answer::parse_answer;
pub use pseudocode::parse_pseudocode;
pub use suggestions::parse_suggestions;

use serde::{Deserialize, Serialize};

/// One C library function referenced by an answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryFunction {
    /// Function name, e.g. `fopen`.
    pub name: String,
    /// One-line description.
    pub description: String,
    /// Header that declares it.
    pub include: String,
    /// C prototype.
    pub prototype: String,
}

/// Fields parsed from the answer grammar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerFragment {
    /// Prose answer, trimmed.
    pub answer: Option<String>,
    /// `[function-N]:` lands in slot `N-1`; skipped indices stay `None`.
    pub library_functions: Option<Vec<Option<LibraryFunction>>>,
    /// Code block with indentation kept.
    pub code: Option<String>,
}

/// A single pseudocode line with its optional explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PseudoLine {
    /// Pseudocode text, indentation kept.
    pub code: String,
    /// Text after ` // `, if any.
    pub explanation: Option<String>,
}

/// A titled group of pseudocode lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PseudoSection {
    /// `None` for lines that appeared before the first `[code-title]:`.
    pub title: Option<String>,
    /// Lines in order.
    pub lines: Vec<PseudoLine>,
}

/// Fields parsed from the pseudocode grammar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PseudoCodeFragment {
    /// Sections in order of appearance.
    pub sections: Vec<PseudoSection>,
}

/// Fields parsed from the suggestions grammar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionFragment {
    /// Cleaned lines in order; may contain empty entries.
    pub suggestions: Vec<String>,
}

/// Structured result of parsing one stage's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedFragment {
    /// Answer grammar output.
    Answer(AnswerFragment),
    /// Pseudocode grammar output.
    PseudoCode(PseudoCodeFragment),
    /// Suggestions grammar output.
    Suggestions(SuggestionFragment),
}

/// Grammar family a prompt's completion is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grammar {
    /// Answer, code and library functions.
    Answer,
    /// Titled pseudocode sections.
    PseudoCode,
    /// Numbered follow-up questions.
    Suggestions,
}

impl Grammar {
    /// Parse accumulated text with this grammar.
    pub fn parse(&self, text: &str) -> ParsedFragment {
        match self {
            Grammar::Answer => ParsedFragment::Answer(parse_answer(text)),
            Grammar::PseudoCode => ParsedFragment::PseudoCode(parse_pseudocode(text)),
            Grammar::Suggestions => ParsedFragment::Suggestions(parse_suggestions(text)),
        }
    }
}

impl ParsedFragment {
    /// The grammar that produced this fragment.
    pub fn grammar(&self) -> Grammar {
        match self {
            ParsedFragment::Answer(_) => Grammar::Answer,
            ParsedFragment::PseudoCode(_) => Grammar::PseudoCode,
            ParsedFragment::Suggestions(_) => Grammar::Suggestions,
        }
    }
}
