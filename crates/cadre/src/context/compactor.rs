//! Message-removal compaction.
//!
//! When a conversation no longer fits in the model's context window (minus
//! the tokens reserved for the response and a safety margin), the oldest
//! removable messages are dropped until it does. Two kinds of message are
//! never removed:
//!
//! - the **anchor**, `messages[0]`, which carries the original task;
//! - **pinned** messages, whose content contains the pinned marker
//!   (memory-recall blocks by default).
//!
//! The output is the input filtered down to the retained messages, so the
//! relative order of every survivor is unchanged. If the anchor and pinned
//! messages alone exceed the budget they are returned anyway; compaction
//! never fails.
//!
//! ```ignore
//! let compactor = ContextCompactor::for_model("anthropic/claude-sonnet-4", CompactorConfig::default());
//! let result = compactor.compact_messages_with_meta(&messages, 8_192);
//! if result.meta.removed_messages.did_remove {
//!     info!("dropped {} messages", result.meta.removed_messages.count);
//! }
//! send(&result.messages);
//! ```

use std::borrow::Cow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::estimate::{
    CharRatioEstimator, DEFAULT_CHARS_PER_TOKEN, DEFAULT_MESSAGE_OVERHEAD_TOKENS, TokenEstimator,
    context_window_for_model,
};
use crate::Message;

/// Marker that pins a message by default.
pub const DEFAULT_PINNED_MARKER: &str = "<memory_recall>";

/// Default tokens held back on top of the reserved output.
pub const DEFAULT_SAFETY_MARGIN_TOKENS: usize = 1024;

/// Configuration for [`ContextCompactor`].
///
/// ```ignore
/// let config = CompactorConfig::default()
///     .with_safety_margin(2048)
///     .with_pinned_marker("<pinned>");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactorConfig {
    pub safety_margin_tokens: usize,
    /// Substring that marks a message as pinned. An empty marker pins
    /// nothing.
    pub pinned_marker: String,
    pub chars_per_token: f64,
    pub per_message_overhead_tokens: usize,
}

impl Default for CompactorConfig {
    fn default() -> Self {
        Self {
            safety_margin_tokens: DEFAULT_SAFETY_MARGIN_TOKENS,
            pinned_marker: DEFAULT_PINNED_MARKER.into(),
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            per_message_overhead_tokens: DEFAULT_MESSAGE_OVERHEAD_TOKENS,
        }
    }
}

impl CompactorConfig {
    pub fn with_safety_margin(mut self, tokens: usize) -> Self {
        self.safety_margin_tokens = tokens;
        self
    }

    pub fn with_pinned_marker(mut self, marker: impl Into<String>) -> Self {
        self.pinned_marker = marker.into();
        self
    }

    pub fn with_chars_per_token(mut self, ratio: f64) -> Self {
        self.chars_per_token = ratio;
        self
    }

    pub fn with_per_message_overhead(mut self, tokens: usize) -> Self {
        self.per_message_overhead_tokens = tokens;
        self
    }
}

// ── Result types ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionKind {
    /// The conversation fit; nothing was touched.
    None,
    MessageRemoval,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RemovedMessages {
    pub did_remove: bool,
    pub count: usize,
    /// Removed messages, oldest first.
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompactionMeta {
    pub kind: CompactionKind,
    pub removed_messages: RemovedMessages,
    pub estimated_tokens_before: usize,
    pub estimated_tokens_after: usize,
    pub available_tokens: usize,
}

impl CompactionMeta {
    /// Whether the retained messages still exceed the budget.
    pub fn over_budget(&self) -> bool {
        self.estimated_tokens_after > self.available_tokens
    }
}

/// Retained messages plus what happened to get there.
///
/// `messages` borrows the input when nothing was removed.
#[derive(Debug, Clone, Serialize)]
pub struct CompactionResult<'a> {
    pub messages: Cow<'a, [Message]>,
    pub meta: CompactionMeta,
}

impl CompactionResult<'_> {
    /// `true` when the output is the input itself.
    pub fn is_unchanged(&self) -> bool {
        matches!(self.messages, Cow::Borrowed(_))
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages.into_owned()
    }
}

// ── ContextCompactor ───────────────────────────────────────────────

/// Fits a conversation into a model's context window by removing the oldest
/// removable messages.
#[derive(Clone)]
pub struct ContextCompactor {
    context_window: usize,
    estimator: Arc<dyn TokenEstimator>,
    config: CompactorConfig,
}

impl ContextCompactor {
    pub fn new(
        context_window: usize,
        estimator: Arc<dyn TokenEstimator>,
        config: CompactorConfig,
    ) -> Self {
        Self {
            context_window,
            estimator,
            config,
        }
    }

    /// A compactor for a named model, using the model's context window and
    /// a [`CharRatioEstimator`] built from `config`.
    pub fn for_model(model: &str, config: CompactorConfig) -> Self {
        Self::with_context_window(context_window_for_model(model), config)
    }

    /// A compactor with an explicit context window and a
    /// [`CharRatioEstimator`] built from `config`.
    pub fn with_context_window(context_window: usize, config: CompactorConfig) -> Self {
        let estimator = CharRatioEstimator::new(
            config.chars_per_token,
            config.per_message_overhead_tokens,
        );
        Self::new(context_window, Arc::new(estimator), config)
    }

    pub fn context_window(&self) -> usize {
        self.context_window
    }

    pub fn config(&self) -> &CompactorConfig {
        &self.config
    }

    /// Tokens the conversation may use: the context window minus the
    /// reserved output and the safety margin.
    pub fn available_tokens(&self, reserved_output_tokens: usize) -> usize {
        self.context_window
            .saturating_sub(reserved_output_tokens)
            .saturating_sub(self.config.safety_margin_tokens)
    }

    pub fn estimate_tokens(&self, messages: &[Message]) -> usize {
        self.estimator.estimate(messages)
    }

    /// Whether a message carries the pinned marker.
    pub fn is_pinned(&self, message: &Message) -> bool {
        !self.config.pinned_marker.is_empty()
            && message.content.contains(&self.config.pinned_marker)
    }

    /// Compact `messages` to fit the budget left after
    /// `reserved_output_tokens`. Never mutates the input and always returns
    /// the same result for the same input.
    pub fn compact_messages_with_meta<'a>(
        &self,
        messages: &'a [Message],
        reserved_output_tokens: usize,
    ) -> CompactionResult<'a> {
        let available = self.available_tokens(reserved_output_tokens);
        let costs: Vec<usize> = messages
            .iter()
            .map(|m| self.estimator.estimate_message(m))
            .collect();
        let before: usize = costs.iter().sum();

        if before <= available {
            debug!(estimated = before, available, "Context within budget");
            return CompactionResult {
                messages: Cow::Borrowed(messages),
                meta: CompactionMeta {
                    kind: CompactionKind::None,
                    removed_messages: RemovedMessages::default(),
                    estimated_tokens_before: before,
                    estimated_tokens_after: before,
                    available_tokens: available,
                },
            };
        }

        // Oldest-first over everything after the anchor, skipping pinned.
        let mut estimate = before;
        let mut removed_flags = vec![false; messages.len()];
        let mut removed = Vec::new();
        for (i, message) in messages.iter().enumerate().skip(1) {
            if estimate <= available {
                break;
            }
            if self.is_pinned(message) {
                continue;
            }
            removed_flags[i] = true;
            estimate = estimate.saturating_sub(costs[i]);
            removed.push(message.clone());
        }

        let retained: Vec<Message> = messages
            .iter()
            .zip(&removed_flags)
            .filter(|(_, removed)| !**removed)
            .map(|(m, _)| m.clone())
            .collect();

        if estimate > available {
            warn!(
                estimated = estimate,
                available,
                retained = retained.len(),
                "Anchor and pinned messages alone exceed the context budget"
            );
        }
        info!(
            removed = removed.len(),
            before,
            after = estimate,
            available,
            "Context compacted"
        );

        CompactionResult {
            messages: Cow::Owned(retained),
            meta: CompactionMeta {
                kind: CompactionKind::MessageRemoval,
                removed_messages: RemovedMessages {
                    did_remove: !removed.is_empty(),
                    count: removed.len(),
                    messages: removed,
                },
                estimated_tokens_before: before,
                estimated_tokens_after: estimate,
                available_tokens: available,
            },
        }
    }
}
