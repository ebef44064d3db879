use super::tags::{
    is_partial_tag, stream_lines, tokenize, trim_partial_delimiter, Tag, TaggedLine,
    EXPLANATION_DELIMITER,
};
use super::{PseudoCodeFragment, PseudoLine, PseudoSection};

/// Parse text written in the pseudocode grammar.
pub fn parse_pseudocode(text: &str) -> PseudoCodeFragment {
    let mut sections: Vec<PseudoSection> = Vec::new();

    for (raw, open) in stream_lines(text) {
        if open && is_partial_tag(raw) {
            continue;
        }
        let line = match tokenize(raw) {
            TaggedLine::Tag {
                tag: Tag::CodeTitle,
                content,
            } => {
                sections.push(PseudoSection {
                    title: Some(content.to_string()),
                    lines: Vec::new(),
                });
                continue;
            }
            // Unknown tags are content; every structural tag is not.
            TaggedLine::Tag {
                tag: Tag::Unknown(_),
                ..
            }
            | TaggedLine::Text(_) => raw.trim_end(),
            TaggedLine::Tag { .. } => continue,
        };

        if line.trim().is_empty() {
            continue;
        }

        if sections.is_empty() {
            sections.push(PseudoSection {
                title: None,
                lines: Vec::new(),
            });
        }
        if let Some(section) = sections.last_mut() {
            section.lines.push(split_line(line, open));
        }
    }

    PseudoCodeFragment { sections }
}

fn split_line(line: &str, open: bool) -> PseudoLine {
    match line.split_once(EXPLANATION_DELIMITER) {
        Some((code, explanation)) => PseudoLine {
            code: code.trim_end().to_string(),
            explanation: Some(explanation.trim().to_string()),
        },
        None if open => PseudoLine {
            code: trim_partial_delimiter(line, EXPLANATION_DELIMITER)
                .trim_end()
                .to_string(),
            explanation: None,
        },
        None => PseudoLine {
            code: line.to_string(),
            explanation: None,
        },
    }
}
