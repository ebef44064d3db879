use serde::{Deserialize, Serialize};

use crate::completion::CompletionRequest;
use crate::config::StageParams;
use crate::grammar::{Grammar, ParsedFragment};

/// Stage of a turn pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Primary answer to the student.
    Answer,
    /// Code block rewritten as annotated pseudocode.
    PseudoCode,
    /// Suggested follow-up questions.
    Suggestions,
}

impl StageKind {
    /// Get the stage name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Answer => "answer",
            StageKind::PseudoCode => "pseudocode",
            StageKind::Suggestions => "suggestions",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "answer" => Ok(StageKind::Answer),
            "pseudocode" => Ok(StageKind::PseudoCode),
            "suggestions" => Ok(StageKind::Suggestions),
            _ => Err(format!("Unknown stage: {}", s)),
        }
    }
}

/// A fully rendered prompt for one stage. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSpec {
    stage: StageKind,
    prompt_text: String,
    subject_text: String,
    stop_sequences: Vec<String>,
    model: String,
    temperature: f64,
    max_tokens: u32,
    grammar: Grammar,
}

impl PromptSpec {
    pub(crate) fn new(
        stage: StageKind,
        preamble: String,
        subject_text: String,
        stop_sequence: &str,
        params: &StageParams,
        grammar: Grammar,
    ) -> Self {
        Self {
            stage,
            prompt_text: format!("{}{}", preamble, subject_text),
            subject_text,
            stop_sequences: vec![stop_sequence.to_string()],
            model: params.model.clone(),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            grammar,
        }
    }

    /// Stage this prompt drives.
    pub fn stage(&self) -> StageKind {
        self.stage
    }

    /// The complete prompt sent to the completion source.
    pub fn prompt_text(&self) -> &str {
        &self.prompt_text
    }

    /// The trailing request block of the prompt, after exemplars and history.
    pub fn subject_text(&self) -> &str {
        &self.subject_text
    }

    /// Sequences that end the completion.
    pub fn stop_sequences(&self) -> &[String] {
        &self.stop_sequences
    }

    /// Model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sampling temperature.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Completion token cap.
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// Grammar the completion is parsed with.
    pub fn grammar(&self) -> Grammar {
        self.grammar
    }

    /// Parse accumulated completion text with this stage's grammar.
    pub fn parse(&self, text: &str) -> ParsedFragment {
        self.grammar.parse(text)
    }

    /// Raw audit text: the originating request block followed by the completion.
    pub fn render_raw(&self, completion: &str) -> String {
        format!("{}{}", self.subject_text, completion)
    }

    /// Build the completion source request for this prompt.
    pub fn to_request(&self) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            prompt: self.prompt_text.clone(),
            stop: self.stop_sequences.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> StageParams {
        StageParams {
            model: "test-model".to_string(),
            temperature: 0.3,
            max_tokens: 64,
        }
    }

    #[test]
    fn test_stage_kind_roundtrip() {
        for stage in [StageKind::Answer, StageKind::PseudoCode, StageKind::Suggestions] {
            assert_eq!(stage.as_str().parse::<StageKind>().unwrap(), stage);
        }
        assert!("bogus".parse::<StageKind>().is_err());
    }

    #[test]
    fn test_prompt_text_ends_with_subject() {
        let spec = PromptSpec::new(
            StageKind::Answer,
            "examples\n\n".to_string(),
            "[question]: q\n[answer]:".to_string(),
            "[end-answer]",
            &params(),
            Grammar::Answer,
        );
        assert_eq!(spec.prompt_text(), "examples\n\n[question]: q\n[answer]:");
        assert_eq!(spec.render_raw(" a"), "[question]: q\n[answer]: a");
        assert_eq!(spec.stop_sequences(), ["[end-answer]".to_string()]);
    }

    #[test]
    fn test_to_request_copies_parameters() {
        let spec = PromptSpec::new(
            StageKind::Suggestions,
            String::new(),
            "subject".to_string(),
            "[stop]",
            &params(),
            Grammar::Suggestions,
        );
        let request = spec.to_request();
        assert_eq!(request.model, "test-model");
        assert_eq!(request.prompt, "subject");
        assert_eq!(request.stop, vec!["[stop]".to_string()]);
        assert_eq!(request.max_tokens, 64);
        assert!(request.stream);
    }
}
