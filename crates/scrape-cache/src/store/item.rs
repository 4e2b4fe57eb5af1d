//! Captured content items and the fixed character-to-token estimate.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Characters per token used for every estimate in the engine.
///
/// This is a flat approximation, not a tokenizer: 4 characters ≈ 1 token,
/// i.e. 0.25 tokens per character.
pub const CHARS_PER_TOKEN: u64 = 4;

/// Caller-supplied key-value bag attached to an item (originating URL,
/// scroll offset, ...). Never interpreted by the engine.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Estimate the token cost of `content`: `ceil(chars * 0.25)`.
///
/// Counts characters rather than bytes so multi-byte text is not
/// over-charged relative to the ratio.
pub fn estimate_tokens(content: &str) -> u64 {
    (content.chars().count() as u64).div_ceil(CHARS_PER_TOKEN)
}

/// One captured snapshot of page content.
///
/// Items are immutable once stored: they are created by
/// [`BoundedContentStore::insert`](super::BoundedContentStore::insert) and
/// destroyed only by eviction or clearing.
#[derive(Debug, Clone, Serialize)]
pub struct ContentItem {
    content: String,
    token_estimate: u64,
    byte_size: u64,
    sequence: u64,
    captured_at: DateTime<Utc>,
    metadata: Metadata,
}

impl ContentItem {
    pub(crate) fn new(content: String, metadata: Metadata, sequence: u64) -> Self {
        let token_estimate = estimate_tokens(&content);
        let byte_size = content.len() as u64;
        Self {
            content,
            token_estimate,
            byte_size,
            sequence,
            captured_at: Utc::now(),
            metadata,
        }
    }

    /// The raw captured text.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn token_estimate(&self) -> u64 {
        self.token_estimate
    }

    /// UTF-8 size of the content in bytes.
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    /// Strictly increasing per store; the ordering key for recency.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Wall-clock capture time. Debugging only; ordering uses [`sequence`](Self::sequence).
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}
