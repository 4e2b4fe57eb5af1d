//! One page-tracking session: a store and the policy that allocates from it.
//!
//! A [`ScrapeSession`] is an ordinary owned value. Collaborators receive it
//! (or its parts) by reference; there is no process-wide cache. Mutation
//! requires `&mut ScrapeSession`, so the borrow checker enforces the single
//! owner the store is designed for.

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::policy::{Allocation, AllocationError, ModelAllocationPolicy, ModelInfo};
use crate::store::{BoundedContentStore, CacheSize, InsertResult, Metadata};

/// A capture store paired with its model allocation policy.
#[derive(Debug)]
pub struct ScrapeSession {
    store: BoundedContentStore,
    policy: ModelAllocationPolicy,
}

impl Default for ScrapeSession {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl ScrapeSession {
    /// Build a session from `config`.
    ///
    /// Logs a warning for every send-all model whose safe budget is smaller
    /// than the configured store capacity.
    pub fn new(config: &EngineConfig) -> Self {
        Self::from_parts(config.build_store(), config.build_policy())
    }

    pub fn from_parts(store: BoundedContentStore, policy: ModelAllocationPolicy) -> Self {
        for problem in policy.table().capacity_warnings(store.max_tokens()) {
            warn!("{problem}");
        }
        debug!(
            max_tokens = store.max_tokens(),
            models = policy.table().len(),
            "scrape session created"
        );
        Self { store, policy }
    }

    /// Record a newly captured snapshot.
    pub fn insert(&mut self, content: impl Into<String>, metadata: Metadata) -> InsertResult {
        self.store.insert(content, metadata)
    }

    /// Point the session at `url`; a different page clears the cache.
    pub fn update_tracked_url(&mut self, url: impl Into<String>) {
        self.store.update_tracked_url(url);
    }

    /// Decide what `model_id` may be sent from the current cache.
    pub fn allocate(&self, model_id: &str) -> Result<Allocation<'_>, AllocationError> {
        self.policy.allocate(model_id, &self.store)
    }

    pub fn get_size(&self) -> CacheSize {
        self.store.get_size()
    }

    pub fn get_model_info(&self, model_id: &str) -> Option<ModelInfo> {
        self.policy.get_model_info(model_id)
    }

    pub fn clear(&mut self) {
        self.store.clear();
    }

    pub fn store(&self) -> &BoundedContentStore {
        &self.store
    }

    pub fn policy(&self) -> &ModelAllocationPolicy {
        &self.policy
    }
}
