//! Convenience re-exports for common `scrape-cache` types.
//!
//! ```ignore
//! use scrape_cache::prelude::*;
//! ```
//!
//! Snapshot types ([`CacheSize`], [`InsertResult`]) are included because
//! every status display needs them; lower-level helpers such as
//! `estimate_tokens` are left in their modules.

pub use crate::config::EngineConfig;
pub use crate::policy::{
    Allocation, AllocationError, KnownModel, ModelAllocationPolicy, ModelInfo, ModelLimits,
    ModelPolicy, ModelTable,
};
pub use crate::session::ScrapeSession;
pub use crate::store::{
    BoundedContentStore, CacheSize, CacheSlice, ContentItem, InsertOutcome, InsertResult,
    Metadata, OversizePolicy,
};
