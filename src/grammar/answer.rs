use super::tags::{
    is_partial_tag, stream_lines, tokenize, trim_partial_delimiter, Scope, ScopeStack, Tag,
    TaggedLine, FUNCTION_FIELD_DELIMITER,
};
use super::{AnswerFragment, LibraryFunction};

/// Parse text written in the answer grammar.
///
/// Lines outside any scope (and the content of `[answer]:`) form the answer.
/// Code lines are kept verbatim. Each `[function-N]:` inside the library
/// scope is written to slot `N-1`. An unterminated final line that may
/// still become a tag is not attributed yet.
pub fn parse_answer(text: &str) -> AnswerFragment {
    let mut scopes = ScopeStack::default();
    let mut answer: Vec<&str> = Vec::new();
    let mut code: Option<Vec<&str>> = None;
    let mut functions: Option<Vec<Option<LibraryFunction>>> = None;

    for (raw, open) in stream_lines(text) {
        if open && is_partial_tag(raw) {
            continue;
        }
        match tokenize(raw) {
            TaggedLine::Tag {
                tag: Tag::Answer,
                content,
            } => answer.push(content),
            TaggedLine::Tag {
                tag: Tag::Code,
                content,
            } => {
                scopes.open(Scope::Code);
                let lines = code.get_or_insert_with(Vec::new);
                if !lines.is_empty() {
                    lines.push("");
                }
                if !content.is_empty() {
                    lines.push(content);
                }
            }
            TaggedLine::Tag {
                tag: Tag::EndCode, ..
            } => {
                scopes.close(Scope::Code);
            }
            TaggedLine::Tag {
                tag: Tag::LibraryFunctions,
                ..
            } => {
                scopes.open(Scope::LibraryFunctions);
                functions.get_or_insert_with(Vec::new);
            }
            TaggedLine::Tag {
                tag: Tag::EndLibraryFunctions,
                ..
            } => {
                scopes.close(Scope::LibraryFunctions);
            }
            TaggedLine::Tag {
                tag: Tag::Function(index),
                content,
            } => {
                if scopes.top() != Some(Scope::LibraryFunctions) {
                    continue;
                }
                let Some(slot) = index.and_then(|n| n.checked_sub(1)) else {
                    continue;
                };
                let list = functions.get_or_insert_with(Vec::new);
                if list.len() <= slot {
                    list.resize(slot + 1, None);
                }
                list[slot] = Some(parse_function_fields(content, open));
            }
            TaggedLine::Tag {
                tag: Tag::End(_), ..
            } => {}
            _ => match scopes.top() {
                Some(Scope::Code) => {
                    if let Some(lines) = code.as_mut() {
                        lines.push(raw.trim_end_matches('\r'));
                    }
                }
                Some(Scope::LibraryFunctions) => {}
                None => answer.push(raw.trim()),
            },
        }
    }

    AnswerFragment {
        answer: non_empty(answer.join("\n").trim().to_string()),
        library_functions: functions,
        code: code.and_then(|lines| non_empty(render_code(&lines))),
    }
}

/// Split `[name]: x <> [description]: y <> …` into a [`LibraryFunction`].
/// Unrecognized sub-fields are ignored.
fn parse_function_fields(content: &str, open: bool) -> LibraryFunction {
    let mut function = LibraryFunction::default();
    let mut parts = content.split(FUNCTION_FIELD_DELIMITER).peekable();
    while let Some(part) = parts.next() {
        let part = if open && parts.peek().is_none() {
            trim_partial_delimiter(part, FUNCTION_FIELD_DELIMITER).trim()
        } else {
            part.trim()
        };
        let (field, value) = match part.split_once("]:") {
            Some((field, value)) => (field.trim_start_matches('['), value.trim()),
            None => continue,
        };
        match field {
            "name" => function.name = value.to_string(),
            "description" => function.description = value.to_string(),
            "include" => function.include = value.to_string(),
            "prototype" => function.prototype = value.to_string(),
            _ => {}
        }
    }
    function
}

/// Drop leading blank lines and trailing whitespace; keep indentation.
fn render_code(lines: &[&str]) -> String {
    let start = lines
        .iter()
        .position(|line| !line.trim().is_empty())
        .unwrap_or(lines.len());
    lines[start..].join("\n").trim_end().to_string()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
