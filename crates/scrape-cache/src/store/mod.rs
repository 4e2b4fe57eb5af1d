//! The bounded content store: captured page snapshots with token/byte
//! accounting and oldest-first eviction.
//!
//! - [`item`] — [`ContentItem`] and the fixed 4-chars-per-token
//!   [`estimate_tokens`] approximation.
//! - [`bounded`] — [`BoundedContentStore`], the capacity-bounded FIFO log,
//!   plus the snapshot types it hands out ([`CacheSlice`], [`CacheSize`],
//!   [`InsertResult`]).

pub mod bounded;
pub mod item;

pub use bounded::{
    BoundedContentStore, CacheSize, CacheSlice, DEFAULT_MAX_TOKENS, InsertOutcome, InsertResult,
    OversizePolicy,
};
pub use item::{CHARS_PER_TOKEN, ContentItem, Metadata, estimate_tokens};
