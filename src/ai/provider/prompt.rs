//! Prompt assembly

/// System prompt used when none is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant for a developer portfolio website.

STYLE GUIDE:
- Write clearly with short paragraphs and visible blank lines between ideas.
- Use clean bullets with a leading hyphen and one space (e.g., \"- item\").
- Be friendly, direct, and practical.";

/// Single-turn prompt for APIs without a system role
pub fn inline_prompt(system_prompt: &str, message: &str) -> String {
    format!("{}\n\nUser message: {}", system_prompt, message)
}
