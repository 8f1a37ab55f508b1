//! Token estimation and model context windows.
//!
//! The compactor only needs an approximate, deterministic cost per message.
//! [`CharRatioEstimator`] divides the content length by a chars-per-token
//! ratio and adds a fixed per-message overhead for role and framing tokens.
//! Hosts with a real tokenizer implement [`TokenEstimator`] instead.

use crate::Message;

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; we use 3.5 as a middle ground.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Default per-message framing overhead in tokens.
pub const DEFAULT_MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Context window used for models missing from the lookup table.
pub const DEFAULT_CONTEXT_WINDOW: usize = 128_000;

/// Estimates the token cost of messages for the active model.
///
/// Implementations must be deterministic: the same message always costs the
/// same. The total cost of a conversation is the sum of its messages' costs.
pub trait TokenEstimator: Send + Sync {
    fn estimate_message(&self, message: &Message) -> usize;

    fn estimate(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.estimate_message(m)).sum()
    }
}

/// Character-ratio estimator.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    chars_per_token: f64,
    per_message_overhead: usize,
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN, DEFAULT_MESSAGE_OVERHEAD_TOKENS)
    }
}

impl CharRatioEstimator {
    /// Non-positive or non-finite ratios fall back to the default.
    pub fn new(chars_per_token: f64, per_message_overhead: usize) -> Self {
        let chars_per_token = if chars_per_token.is_finite() && chars_per_token > 0.0 {
            chars_per_token
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        Self {
            chars_per_token,
            per_message_overhead,
        }
    }

    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate_message(&self, message: &Message) -> usize {
        let content = (message.content.len() as f64 / self.chars_per_token).ceil() as usize;
        content + self.per_message_overhead
    }
}

/// Look up the context window of a model by name.
///
/// Matches on the model name segment (after the last `/` in paths like
/// `"anthropic/claude-sonnet-4"`) so org prefixes don't cause false
/// positives. Unknown models get [`DEFAULT_CONTEXT_WINDOW`].
pub fn context_window_for_model(model: &str) -> usize {
    let name = model.rsplit('/').next().unwrap_or(model).to_lowercase();

    if ["claude", "opus", "sonnet", "haiku"]
        .iter()
        .any(|family| name.contains(family))
    {
        200_000
    } else if name.contains("gpt-4.1") {
        1_047_576
    } else if name.contains("gpt-4o") || name.contains("gpt-4-turbo") {
        128_000
    } else if name.contains("gpt-4") {
        8_192
    } else if name.contains("gpt-3.5") {
        16_385
    } else if name.starts_with("o1") || name.starts_with("o3") || name.starts_with("o4") {
        200_000
    } else if name.contains("gemini") {
        1_048_576
    } else if name.contains("mistral") || name.contains("mixtral") {
        32_768
    } else if name.contains("deepseek") {
        64_000
    } else {
        DEFAULT_CONTEXT_WINDOW
    }
}
