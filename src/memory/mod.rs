//! Context-window management for agent transcripts.
//!
//! This module provides:
//! - Token estimation for message lists
//! - Two-stage compression (search payload trimming, then eviction of the
//!   oldest messages after a preserved prefix)
//! - Normalization of message bodies to plain text before a model call

pub mod context_manager;

pub use context_manager::{
    count_message_tokens, count_text_tokens, validate_message_content, ContextManager,
    DEFAULT_MAX_CONTENT_LENGTH, RAW_CONTENT_LIMIT,
};

/// Preserved prefix used when compressing a worker's input transcript.
pub const STEP_PRESERVE_PREFIX: usize = 3;
