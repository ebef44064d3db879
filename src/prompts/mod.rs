//! Prompt templates for every stage of a tutoring turn.
//!
//! This module contains the fixed few-shot exemplars, the conversation
//! thread renderer and the pure builders that package a prompt with its stop
//! sequences, model parameters and grammar into a [`PromptSpec`].
//!
//! Subject text (questions, code, descriptions) is embedded as-is. If it
//! contains a stage's stop sequence literally, the completion will stop
//! early; nothing is escaped.

mod spec;
mod templates;
mod thread;

pub use spec::{PromptSpec, StageKind};
pub use templates::{answer_prompt, pseudocode_prompt, suggestions_prompt, write_code_prompt};
pub use thread::{ConversationThread, ThreadEntry};

/// Stop sequence for the answer stage.
pub const END_ANSWER: &str = "[end-answer]";
/// Stop sequence for the pseudocode stage.
pub const END_PSEUDO_CODE: &str = "[end-pseudo-code]";
/// Stop sequence for the suggestions stage.
pub const END_FOLLOW_UP: &str = "[end-follow-up-questions]";

/// Opening and closing tags of the rendered conversation history.
pub const PREVIOUS_CONVERSATION_TAG: &str = "[previous-conversation]:";
/// Closes the rendered conversation history.
pub const END_PREVIOUS_CONVERSATION_TAG: &str = "[end-previous-conversation]";

/// Header introducing the follow-up suggestions region.
pub const FOLLOW_UP_TAG: &str = "[follow-up-questions]:";

/// Instructions and exemplars for answering C programming questions.
pub const ANSWER_EXAMPLES: &str = r#"The following is a conversation with a teaching assistant for an introductory C programming course. The assistant answers conceptually and never writes a complete solution to an assignment. When a short code example helps, it is placed between [code]: and [end-code]. Every C library function mentioned in the answer is listed between [c-library-functions]: and [end-c-library-functions], one per line, using the fields [name], [description], [include] and [prototype] separated by " <> ".

[question]: how do I print an integer?
[answer]: You can use printf() with the %d format specifier, which is replaced by the value of the integer argument.
[code]:
int count = 5;
printf("count is %d\n", count);
[end-code]
[c-library-functions]:
[function-1]: [name]: printf <> [description]: writes formatted output to stdout <> [include]: stdio.h <> [prototype]: int printf(const char *format, ...)
[end-c-library-functions]
[end-answer]

[question]: what is the difference between = and == in C?
[answer]: A single = assigns the value on its right to the variable on its left. A double == compares two values and evaluates to 1 when they are equal and 0 otherwise. Using = inside an if condition is a common bug because the assignment itself becomes the condition.
[end-answer]

[question]: how can I get the length of a string?
[answer]: Use strlen(), which counts the characters before the terminating null byte. The null byte itself is not included in the count.
[code]:
char name[] = "ada";
size_t n = strlen(name);
[end-code]
[c-library-functions]:
[function-1]: [name]: strlen <> [description]: returns the length of a null-terminated string <> [include]: string.h <> [prototype]: size_t strlen(const char *s)
[end-c-library-functions]
[end-answer]
"#;

/// Instructions and exemplars for describing the code a student wants to write.
pub const WRITE_CODE_EXAMPLES: &str = r#"The following is a conversation with a teaching assistant for an introductory C programming course. The student describes a behaviour they want to implement. The assistant explains the approach and gives a short illustrative code example between [code]: and [end-code] that the student must adapt rather than copy. C library functions used are listed between [c-library-functions]: and [end-c-library-functions].

[question]: read numbers until the user enters 0 and print their sum
[answer]: Keep a running total and read one number per loop iteration with scanf(). Stop the loop as soon as the number read is 0, then print the total.
[code]:
int total = 0;
int value;
scanf("%d", &value);
while (value != 0) {
    total += value;
    scanf("%d", &value);
}
printf("%d\n", total);
[end-code]
[c-library-functions]:
[function-1]: [name]: scanf <> [description]: reads formatted input from stdin <> [include]: stdio.h <> [prototype]: int scanf(const char *format, ...)
[function-2]: [name]: printf <> [description]: writes formatted output to stdout <> [include]: stdio.h <> [prototype]: int printf(const char *format, ...)
[end-c-library-functions]
[end-answer]
"#;

/// Instructions and exemplars for converting C code into annotated pseudocode.
pub const PSEUDOCODE_EXAMPLES: &str = r#"Convert C code into line-by-line pseudocode for a beginner. Group lines under a [code-title]: describing what that part of the program does. Each pseudocode line is followed by " // " and a short explanation.

[code]:
int total = 0;
for (int i = 1; i <= 10; i++) {
    total += i;
}
printf("%d\n", total);
[end-code]
[pseudo-code]:
[code-title]: add the numbers from 1 to 10
set total to 0 // the running sum starts empty
repeat for i from 1 to 10 // visits every number once
    add i to total // accumulate the sum
[code-title]: show the result
print total // writes the sum followed by a newline
[end-pseudo-code]
"#;

/// Instructions and exemplars for proposing follow-up questions.
pub const SUGGESTIONS_EXAMPLES: &str = r#"Given a student's question and the answer they received, suggest three short follow-up questions the student could ask next to deepen their understanding. Number each question.

[question]: how do I print an integer?
[answer]: You can use printf() with the %d format specifier.
[follow-up-questions]:
1. How do I print a floating point number?
2. What other format specifiers does printf support?
3. How can I print several values on one line?
[end-follow-up-questions]
"#;
