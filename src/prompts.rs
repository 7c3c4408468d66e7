//! Prompts for turning extracted page text into a narrated lesson script.
//!
//! Callers can override the system prompt via
//! [`crate::config::TransformConfig::system_prompt`]; the constant here is
//! used only when no override is provided.

use crate::config::PageRange;

/// Default system prompt for lesson-script generation.
///
/// Used when `TransformConfig::system_prompt` is `None`.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert educational content creator. Your task is to transform raw PDF text into a structured, engaging lesson plan that is suitable for audio narration.

Structure your output as a clear, organized lesson with:
1. An engaging introduction
2. Main learning points (clear and concise)
3. Key definitions and explanations
4. Practical examples or applications
5. A brief summary and conclusion

Keep the language clear and conversational, as it will be read aloud. Avoid complex formatting."#;

/// Build the user turn: the page range followed by the combined page text.
pub fn user_message(range: PageRange, text: &str) -> String {
    format!(
        "Please transform the following text from pages {}-{} into a structured lesson script suitable for audio narration:\n\n{}",
        range.from_page(),
        range.to_page(),
        text
    )
}
