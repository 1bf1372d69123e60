//! The agent's system prompt template.

use chrono::Utc;

/// Render the system prompt for an agent persona.
///
/// Substitutes the agent's name, purpose, notes, and the current date
/// into the fixed preamble. The rendered prompt is written as the
/// thread's system message at the start of each user turn.
#[must_use]
pub fn render_system_prompt(name: &str, purpose: &str, notes: &str) -> String {
    let current_date = Utc::now().format("%Y-%m-%d %A");
    format!(
        "You are {name}, an LLM agent with a specific purpose that can converse with users, \
answer questions, and when necessary, use tools to perform tasks.\n\
Current date: {current_date}\n\n\
Your purpose is: {purpose}\n\n\
Here are some relevant notes to help you accomplish your purpose:\n\
```\n{notes}\n```\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_all_fields() {
        let prompt = render_system_prompt("Tyler", "To answer questions.", "Prefer brevity.");
        assert!(prompt.contains("You are Tyler,"));
        assert!(prompt.contains("Your purpose is: To answer questions."));
        assert!(prompt.contains("Prefer brevity."));
        assert!(prompt.contains("Current date: "));
    }

    #[test]
    fn rendering_is_stable_within_a_day() {
        let a = render_system_prompt("Tyler", "p", "n");
        let b = render_system_prompt("Tyler", "p", "n");
        assert_eq!(a, b);
    }
}
