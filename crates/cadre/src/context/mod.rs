//! Context window management.
//!
//! [`estimate`] turns messages into approximate token counts and knows the
//! context window of common models. [`compactor`] drops the oldest removable
//! messages when a conversation no longer fits, keeping the first message
//! and every pinned memory-recall block.

pub mod compactor;
pub mod estimate;

pub use compactor::{
    CompactionKind, CompactionMeta, CompactionResult, CompactorConfig, ContextCompactor,
    RemovedMessages,
};
pub use estimate::{
    CharRatioEstimator, DEFAULT_CHARS_PER_TOKEN, TokenEstimator, context_window_for_model,
};
