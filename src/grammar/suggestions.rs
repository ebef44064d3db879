use regex::Regex;
use std::sync::OnceLock;

use super::SuggestionFragment;

fn numbering_regex() -> &'static Regex {
    static NUMBERING: OnceLock<Regex> = OnceLock::new();
    NUMBERING.get_or_init(|| Regex::new(r"^\s*\d+\.\s*").expect("numbering pattern is a valid regex"))
}

fn partial_numbering_regex() -> &'static Regex {
    static PARTIAL: OnceLock<Regex> = OnceLock::new();
    PARTIAL.get_or_init(|| Regex::new(r"^\s*\d+$").expect("partial numbering pattern is a valid regex"))
}

/// Parse numbered follow-up suggestions, one per line.
///
/// Every line is kept, including empty ones, so indices line up with the
/// raw text. Callers filter empties when they need to. A final line that
/// is only digits is still a numbering prefix and renders empty.
pub fn parse_suggestions(text: &str) -> SuggestionFragment {
    let lines: Vec<&str> = text.split('\n').collect();
    let last = lines.len().saturating_sub(1);
    let suggestions = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == last && partial_numbering_regex().is_match(line) {
                String::new()
            } else {
                numbering_regex().replace(line, "").trim().to_string()
            }
        })
        .collect();

    SuggestionFragment { suggestions }
}
