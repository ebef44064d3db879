use super::{
    ConversationThread, PromptSpec, StageKind, ANSWER_EXAMPLES, END_ANSWER, END_FOLLOW_UP,
    END_PSEUDO_CODE, FOLLOW_UP_TAG, PSEUDOCODE_EXAMPLES, SUGGESTIONS_EXAMPLES,
    WRITE_CODE_EXAMPLES,
};
use crate::config::StageParams;
use crate::grammar::tags::{ANSWER_TAG, CODE_TAG, END_CODE_TAG, PSEUDO_CODE_TAG, QUESTION_TAG};
use crate::grammar::Grammar;

/// Build the primary answer prompt.
///
/// `code` is the student's own code the question refers to, if any.
/// `thread` holds earlier turns for follow-up questions.
pub fn answer_prompt(
    question: &str,
    code: Option<&str>,
    thread: Option<&ConversationThread>,
    params: &StageParams,
) -> PromptSpec {
    let mut preamble = format!("{}\n", ANSWER_EXAMPLES);
    if let Some(thread) = thread {
        preamble.push_str(&thread.render());
    }

    let mut subject = String::new();
    if let Some(code) = code.filter(|c| !c.trim().is_empty()) {
        subject.push_str(&code_block(code));
    }
    subject.push_str(&format!("{} {}\n{}", QUESTION_TAG, question.trim(), ANSWER_TAG));

    PromptSpec::new(
        StageKind::Answer,
        preamble,
        subject,
        END_ANSWER,
        params,
        Grammar::Answer,
    )
}

/// Build the answer prompt for a "help me write code for this behaviour" turn.
pub fn write_code_prompt(description: &str, params: &StageParams) -> PromptSpec {
    let subject = format!("{} {}\n{}", QUESTION_TAG, description.trim(), ANSWER_TAG);

    PromptSpec::new(
        StageKind::Answer,
        format!("{}\n", WRITE_CODE_EXAMPLES),
        subject,
        END_ANSWER,
        params,
        Grammar::Answer,
    )
}

/// Build the code-to-pseudocode prompt.
pub fn pseudocode_prompt(code: &str, params: &StageParams) -> PromptSpec {
    let subject = format!("{}{}\n", code_block(code), PSEUDO_CODE_TAG);

    PromptSpec::new(
        StageKind::PseudoCode,
        format!("{}\n", PSEUDOCODE_EXAMPLES),
        subject,
        END_PSEUDO_CODE,
        params,
        Grammar::PseudoCode,
    )
}

/// Build the follow-up suggestions prompt from a finished question/answer pair.
pub fn suggestions_prompt(question: &str, answer: &str, params: &StageParams) -> PromptSpec {
    let subject = format!(
        "{} {}\n{} {}\n{}\n",
        QUESTION_TAG,
        question.trim(),
        ANSWER_TAG,
        answer.trim(),
        FOLLOW_UP_TAG
    );

    PromptSpec::new(
        StageKind::Suggestions,
        format!("{}\n", SUGGESTIONS_EXAMPLES),
        subject,
        END_FOLLOW_UP,
        params,
        Grammar::Suggestions,
    )
}

fn code_block(code: &str) -> String {
    format!("{}\n{}\n{}\n", CODE_TAG, code.trim_end(), END_CODE_TAG)
}
