//! Token counting for the supported model families.
//!
//! OpenAI and Claude models are counted with the cl100k_base encoding plus
//! the small per-message framing overheads their chat formats add. Gemini
//! is counted server-side where possible with a heuristic fallback; the
//! Cerebras llama family approximates with cl100k; anything unknown falls
//! back to a word split.

use std::sync::LazyLock;

use tiktoken_rs::{CoreBPE, cl100k_base};

use crate::models::conversations::{Message, MessageRole};

static CL100K: LazyLock<CoreBPE> =
    LazyLock::new(|| cl100k_base().expect("embedded cl100k_base tokenizer"));

pub fn cl100k() -> &'static CoreBPE {
    &CL100K
}

/// Token count of a bare string under cl100k_base.
pub fn count_text_tokens(text: &str) -> usize {
    CL100K.encode_ordinary(text).len()
}

/// Character-truncate a string so it encodes to at most `max_tokens`.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    let tokens = CL100K.encode_ordinary(text);
    if tokens.len() <= max_tokens {
        return text.to_string();
    }
    CL100K
        .decode(tokens[..max_tokens].to_vec())
        .unwrap_or_else(|_| text.chars().take(max_tokens * 3).collect())
}

/// Count tokens for a message list under the model-appropriate scheme.
/// Gemini uses the offline approximation here; callers that can reach the
/// Google counter go through `LlmRouter::count_tokens`.
pub fn count_tokens(model_name: &str, messages: &[Message]) -> usize {
    if model_name.starts_with("gpt-") || model_name == "o3-mini" {
        let mut num_tokens = 0;
        for message in messages {
            num_tokens += count_text_tokens(&message.content);
            num_tokens += 4;
        }
        num_tokens + 2
    } else if model_name.starts_with("claude-") {
        let mut num_tokens = 0;
        for message in messages {
            num_tokens += count_text_tokens(&message.content);
            num_tokens += count_text_tokens(&message.role.to_string());
            match message.role {
                MessageRole::User => num_tokens += count_text_tokens("Human: "),
                MessageRole::Assistant => num_tokens += count_text_tokens("Assistant: "),
                MessageRole::System => {}
            }
            num_tokens += 2;
        }
        if matches!(messages.first(), Some(m) if m.role == MessageRole::System) {
            num_tokens += count_text_tokens("\n\nHuman: ");
        }
        num_tokens
    } else if model_name.starts_with("gemini-") {
        approximate_gemini_tokens(messages)
    } else if model_name.starts_with("llama3")
        || model_name == "llama-3.3-70b"
        || model_name == "deepSeek-r1-distill-llama-70B"
    {
        let mut num_tokens = 0;
        for message in messages {
            num_tokens += count_text_tokens(&message.content);
            num_tokens += count_text_tokens(&message.role.to_string());
            num_tokens += 4;
        }
        num_tokens
    } else {
        messages
            .iter()
            .map(|m| m.content.split_whitespace().count())
            .sum()
    }
}

/// Heuristic Gemini token estimate: chars/4 blended with words x 1.3.
pub fn approximate_gemini_tokens(messages: &[Message]) -> usize {
    messages
        .iter()
        .map(|message| {
            let char_count = message.content.chars().count() as f64;
            let word_count = message.content.split_whitespace().count() as f64;
            ((char_count / 4.0 + word_count * 1.3) / 2.0) as usize
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpt_counting_adds_per_message_overhead() {
        let messages = vec![Message::user("hello")];
        let content = count_text_tokens("hello");
        assert_eq!(count_tokens("gpt-4o-mini", &messages), content + 4 + 2);
    }

    #[test]
    fn gpt_counting_matches_the_framing_formula() {
        let prompt = vec![Message::system("be brief"), Message::user("hello there")];
        let reply = vec![Message::assistant("hi")];

        let expected_prompt = count_text_tokens("be brief") + count_text_tokens("hello there")
            + 4 * prompt.len()
            + 2;
        let expected_reply = count_text_tokens("hi") + 4 + 2;
        assert_eq!(count_tokens("gpt-4o-mini", &prompt), expected_prompt);
        assert_eq!(count_tokens("gpt-4o-mini", &reply), expected_reply);
    }

    #[test]
    fn claude_counts_system_prefix_once() {
        let with_system = vec![Message::system("sys"), Message::user("hi")];
        let without_system = vec![Message::user("sys"), Message::user("hi")];
        // The "\n\nHuman: " prefix only applies when the list opens with a
        // system message.
        assert!(count_tokens("claude-3-5-sonnet", &with_system) > 0);
        assert!(count_tokens("claude-3-5-sonnet", &without_system) > 0);
    }

    #[test]
    fn unknown_model_falls_back_to_word_split() {
        let messages = vec![Message::user("one two three four")];
        assert_eq!(count_tokens("mystery-model", &messages), 4);
    }

    #[test]
    fn gemini_approximation_is_reasonable() {
        let messages = vec![Message::user("the quick brown fox jumps over the lazy dog")];
        let estimate = approximate_gemini_tokens(&messages);
        assert!(estimate >= 5 && estimate <= 20, "estimate was {}", estimate);
    }

    #[test]
    fn truncate_to_tokens_bounds_the_encoding() {
        let text = "alpha beta gamma delta epsilon zeta eta theta".repeat(50);
        let truncated = truncate_to_tokens(&text, 10);
        assert!(count_text_tokens(&truncated) <= 10);

        let short = "tiny";
        assert_eq!(truncate_to_tokens(short, 100), short);
    }
}
