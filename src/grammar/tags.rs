//! Tagged-line tokenizer and scope stack shared by every grammar.
//!
//! A tag is a bracketed lowercase identifier at the start of a trimmed line,
//! optionally followed by `:`. Everything after the tag is the line's
//! content. Lines without a tag are plain text.
//!
//! Parsers see the accumulated text of a stream, so the final line may be
//! cut mid-token. [`stream_lines`] marks that line as open; grammars hold
//! back an open line that could still become a tag, and drop a trailing
//! fragment of a delimiter from it.

use regex::Regex;
use std::sync::OnceLock;

/// Opens a student question.
pub const QUESTION_TAG: &str = "[question]:";
/// Opens the prose answer.
pub const ANSWER_TAG: &str = "[answer]:";
/// Opens a code scope.
pub const CODE_TAG: &str = "[code]:";
/// Closes a code scope.
pub const END_CODE_TAG: &str = "[end-code]";
/// Opens the library function list.
pub const LIBRARY_FUNCTIONS_TAG: &str = "[c-library-functions]:";
/// Closes the library function list.
pub const END_LIBRARY_FUNCTIONS_TAG: &str = "[end-c-library-functions]";
/// Starts a pseudocode section.
pub const CODE_TITLE_TAG: &str = "[code-title]:";
/// Introduces pseudocode in a prompt.
pub const PSEUDO_CODE_TAG: &str = "[pseudo-code]:";

/// Sub-field delimiter inside a `[function-N]:` line.
pub const FUNCTION_FIELD_DELIMITER: &str = " <> ";
/// Code/explanation delimiter inside a pseudocode line.
pub const EXPLANATION_DELIMITER: &str = " // ";

fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| {
        Regex::new(r"^\[([a-z][a-z0-9-]*)\]:?").expect("tag pattern is a valid regex")
    })
}

fn partial_tag_regex() -> &'static Regex {
    static PARTIAL: OnceLock<Regex> = OnceLock::new();
    PARTIAL.get_or_init(|| {
        Regex::new(r"^\[(?:[a-z][a-z0-9-]*)?$").expect("partial tag pattern is a valid regex")
    })
}

/// A recognized tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag<'a> {
    /// `[question]:`
    Question,
    /// `[answer]:`
    Answer,
    /// `[code]:`
    Code,
    /// `[end-code]`
    EndCode,
    /// `[c-library-functions]:`
    LibraryFunctions,
    /// `[end-c-library-functions]`
    EndLibraryFunctions,
    /// `[function-N]:`; `None` when `N` is not a number.
    Function(Option<usize>),
    /// `[code-title]:`
    CodeTitle,
    /// `[pseudo-code]:`
    PseudoCode,
    /// Any other `[end-*]` terminator.
    End(&'a str),
    /// A well-formed tag with an unrecognized name.
    Unknown(&'a str),
}

/// One tokenized input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaggedLine<'a> {
    /// A line starting with a tag.
    Tag {
        /// The tag itself.
        tag: Tag<'a>,
        /// Trimmed text after the tag.
        content: &'a str,
    },
    /// A trimmed line with no tag.
    Text(&'a str),
}

impl<'a> Tag<'a> {
    fn from_name(name: &'a str) -> Self {
        match name {
            "question" => Tag::Question,
            "answer" => Tag::Answer,
            "code" => Tag::Code,
            "end-code" => Tag::EndCode,
            "c-library-functions" => Tag::LibraryFunctions,
            "end-c-library-functions" => Tag::EndLibraryFunctions,
            "code-title" => Tag::CodeTitle,
            "pseudo-code" => Tag::PseudoCode,
            _ => {
                if let Some(index) = name.strip_prefix("function-") {
                    Tag::Function(index.parse().ok())
                } else if name.starts_with("end-") {
                    Tag::End(name)
                } else {
                    Tag::Unknown(name)
                }
            }
        }
    }
}

/// Tokenize a single line. The content of a tag line is trimmed.
pub fn tokenize(line: &str) -> TaggedLine<'_> {
    let trimmed = line.trim();
    match tag_regex().captures(trimmed) {
        Some(caps) => {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                return TaggedLine::Text(trimmed);
            };
            TaggedLine::Tag {
                tag: Tag::from_name(name.as_str()),
                content: trimmed[whole.end()..].trim(),
            }
        }
        None => TaggedLine::Text(trimmed),
    }
}

/// Lines of accumulated stream text, each paired with whether it is open:
/// the final line before any newline has arrived for it.
pub fn stream_lines(text: &str) -> impl Iterator<Item = (&str, bool)> + '_ {
    let open_tail = !text.ends_with('\n');
    let mut lines = text.lines().peekable();
    std::iter::from_fn(move || {
        let line = lines.next()?;
        Some((line, open_tail && lines.peek().is_none()))
    })
}

/// Whether an open line is a tag whose closing bracket has not arrived.
pub fn is_partial_tag(line: &str) -> bool {
    partial_tag_regex().is_match(line.trim())
}

/// Strip a trailing proper prefix of `delimiter` from an open line.
pub fn trim_partial_delimiter<'a>(line: &'a str, delimiter: &str) -> &'a str {
    (1..delimiter.len())
        .rev()
        .find_map(|len| line.strip_suffix(&delimiter[..len]))
        .unwrap_or(line)
}

/// Region kinds that can be open while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Between `[code]:` and `[end-code]`.
    Code,
    /// Between `[c-library-functions]:` and its end tag.
    LibraryFunctions,
}

/// Stack of currently open scopes.
#[derive(Debug, Default)]
pub struct ScopeStack {
    open: Vec<Scope>,
}

impl ScopeStack {
    /// Open a new scope on top of the stack.
    pub fn open(&mut self, scope: Scope) {
        self.open.push(scope);
    }

    /// Close the innermost occurrence of `scope`, discarding anything opened
    /// above it. Returns `false` (and changes nothing) when it is not open.
    pub fn close(&mut self, scope: Scope) -> bool {
        match self.open.iter().rposition(|s| *s == scope) {
            Some(pos) => {
                self.open.truncate(pos);
                true
            }
            None => false,
        }
    }

    /// The scope current content lines belong to.
    pub fn top(&self) -> Option<Scope> {
        self.open.last().copied()
    }

    /// Whether `scope` is anywhere on the stack.
    pub fn is_open(&self, scope: Scope) -> bool {
        self.open.contains(&scope)
    }

    /// Number of open scopes.
    pub fn depth(&self) -> usize {
        self.open.len()
    }
}
