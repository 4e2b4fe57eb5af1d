//! Deciding how much of the cache a model may receive.
//!
//! [`ModelAllocationPolicy::allocate`] reads the store's occupancy and the
//! model's [`ModelPolicy`] and returns an [`Allocation`]: either the whole
//! cache or the newest whole items that fit the model's safe budget. The
//! request builder must not send more than the allocation reports.

use serde::Serialize;
use serde::ser::SerializeStruct;
use tracing::{debug, info, warn};

use super::models::{ModelInfo, ModelPolicy, ModelTable};
use crate::store::bounded::percent_of;
use crate::store::{BoundedContentStore, CacheSlice, ContentItem};

/// Usage percentage at which a send-all allocation carries a warning.
pub const WARNING_PERCENT: u32 = 90;

/// Fixed `percent_used` reported when a budgeted allocation was capped.
pub const CAPPED_PERCENT: u32 = 90;

/// Why no allocation could be made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// The model id is not in the policy table. The extraction must not
    /// proceed until a supported model is selected.
    UnknownModel { model_id: String },
}

impl AllocationError {
    /// User-facing description of the error.
    pub fn message(&self) -> String {
        match self {
            AllocationError::UnknownModel { model_id } => format!(
                "Unknown model '{model_id}': no token limits are configured for it. \
                 Select a supported model before extracting."
            ),
        }
    }

    /// Retrying with the same inputs can never succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

impl std::fmt::Display for AllocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for AllocationError {}

// Serialized as `{ "error": true, "message": ... }` for the status display.
impl Serialize for AllocationError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("AllocationError", 2)?;
        s.serialize_field("error", &true)?;
        s.serialize_field("message", &self.message())?;
        s.end()
    }
}

/// The portion of the cache selected for one request.
#[derive(Debug, Clone, Serialize)]
pub struct Allocation<'a> {
    pub success: bool,
    pub model_id: String,
    /// Display name of the model.
    pub model_name: String,
    /// Whether the whole cache was selected.
    pub send_all_cache: bool,
    pub items_to_send: usize,
    pub tokens_to_send: u64,
    pub kb_to_send: u64,
    /// Share of the model's safe budget used. Pinned at
    /// [`CAPPED_PERCENT`] when the cache had to be truncated.
    pub percent_used: u32,
    /// Advisory for the user. Never an error.
    pub warning: Option<String>,
    /// The selected items, oldest first.
    #[serde(skip)]
    pub items: Vec<&'a ContentItem>,
}

impl<'a> Allocation<'a> {
    fn from_slice(
        model_id: &str,
        model_name: &str,
        send_all_cache: bool,
        slice: CacheSlice<'a>,
        percent_used: u32,
        warning: Option<String>,
    ) -> Self {
        Self {
            success: true,
            model_id: model_id.to_string(),
            model_name: model_name.to_string(),
            send_all_cache,
            items_to_send: slice.item_count,
            tokens_to_send: slice.tokens,
            kb_to_send: slice.kb,
            percent_used,
            warning,
            items: slice.items,
        }
    }

    /// Content of the selected items in chronological order.
    pub fn contents(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.items.iter().map(|&item| item.content())
    }

    /// All selected content joined into one payload.
    pub fn joined(&self, separator: &str) -> String {
        self.contents().collect::<Vec<_>>().join(separator)
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "allocation[{}]: {} items, ~{} tokens ({} KB, {}%{})",
            self.model_id,
            self.items_to_send,
            self.tokens_to_send,
            self.kb_to_send,
            self.percent_used,
            if self.send_all_cache { ", full cache" } else { ", newest slice" },
        )
    }
}

/// Maps a model id to the slice of a store it may receive.
///
/// # Example
///
/// ```
/// use scrape_cache::policy::{ModelAllocationPolicy, ModelLimits, ModelPolicy, ModelTable};
/// use scrape_cache::store::{BoundedContentStore, Metadata};
///
/// let table = ModelTable::empty().with_model(
///     "budgeted-model",
///     ModelPolicy::Budgeted(ModelLimits::new("Budgeted", 700, 600, 60)),
/// );
/// let policy = ModelAllocationPolicy::new(table);
///
/// let mut store = BoundedContentStore::new(1000);
/// for _ in 0..3 {
///     store.insert("x".repeat(1600), Metadata::new());
/// }
///
/// let allocation = policy.allocate("budgeted-model", &store).unwrap();
/// assert!(!allocation.send_all_cache);
/// assert_eq!(allocation.tokens_to_send, 400);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ModelAllocationPolicy {
    table: ModelTable,
}

impl ModelAllocationPolicy {
    pub fn new(table: ModelTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ModelTable {
        &self.table
    }

    pub fn get_model_info(&self, model_id: &str) -> Option<ModelInfo> {
        self.table.get_model_info(model_id)
    }

    /// Select the part of `store` that `model_id` may receive.
    ///
    /// Send-all models always get the full cache, with a warning once it
    /// reaches [`WARNING_PERCENT`] of their safe budget. Budgeted models get
    /// the full cache while it fits their safe budget and otherwise the
    /// newest whole items that do; `tokens_to_send` never exceeds the
    /// budget in that case.
    pub fn allocate<'a>(
        &self,
        model_id: &str,
        store: &'a BoundedContentStore,
    ) -> Result<Allocation<'a>, AllocationError> {
        let Some(policy) = self.table.get(model_id) else {
            warn!(model_id, "allocation requested for unknown model");
            return Err(AllocationError::UnknownModel {
                model_id: model_id.to_string(),
            });
        };

        let limits = policy.limits();
        let size = store.get_size();

        let allocation = match policy {
            ModelPolicy::SendAll(_) => {
                let percent_used = percent_of(size.tokens, limits.safe_tpm);
                let warning = (percent_used >= WARNING_PERCENT).then(|| {
                    format!(
                        "Cache is at {percent_used}% of the {} budget ({} tokens). \
                         Pause before the next capture so the following extraction \
                         stays within rate limits.",
                        limits.display_name, size.tokens,
                    )
                });
                Allocation::from_slice(
                    model_id,
                    &limits.display_name,
                    true,
                    store.get_all_items(),
                    percent_used,
                    warning,
                )
            }
            ModelPolicy::Budgeted(_) if size.tokens <= limits.safe_tpm => Allocation::from_slice(
                model_id,
                &limits.display_name,
                true,
                store.get_all_items(),
                percent_of(size.tokens, limits.safe_tpm),
                None,
            ),
            ModelPolicy::Budgeted(_) => {
                let slice = store.get_newest_up_to_tokens(limits.safe_tpm);
                info!(
                    model_id,
                    cached_tokens = size.tokens,
                    safe_tpm = limits.safe_tpm,
                    kept_items = slice.item_count,
                    "cache exceeds model budget, sending newest slice"
                );
                let warning = format!(
                    "Cache exceeds the {} limit; sending only the newest {} items ({} KB).",
                    limits.display_name, slice.item_count, slice.kb,
                );
                Allocation::from_slice(
                    model_id,
                    &limits.display_name,
                    false,
                    slice,
                    CAPPED_PERCENT,
                    Some(warning),
                )
            }
        };

        debug!("{}", allocation.to_log_string());
        Ok(allocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::models::ModelLimits;
    use crate::store::{CHARS_PER_TOKEN, Metadata};

    fn blob(tokens: u64) -> String {
        "x".repeat((tokens * CHARS_PER_TOKEN) as usize)
    }

    fn policy() -> ModelAllocationPolicy {
        ModelAllocationPolicy::new(
            ModelTable::empty()
                .with_model(
                    "budgeted-model",
                    ModelPolicy::Budgeted(ModelLimits::new("Budgeted", 700, 600, 60)),
                )
                .with_model(
                    "send-all-model",
                    ModelPolicy::SendAll(ModelLimits::new("Everything", 500, 1000, 10)),
                ),
        )
    }

    fn store_with(tokens: &[u64]) -> BoundedContentStore {
        let mut store = BoundedContentStore::new(1000);
        for &t in tokens {
            store.insert(blob(t), Metadata::new());
        }
        store
    }

    #[test]
    fn unknown_model_is_an_error() {
        let store = store_with(&[10]);
        let err = policy().allocate("mystery", &store).unwrap_err();
        assert_eq!(
            err,
            AllocationError::UnknownModel {
                model_id: "mystery".into()
            }
        );
        assert!(err.to_string().contains("mystery"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn unknown_model_serializes_as_error_object() {
        let err = AllocationError::UnknownModel {
            model_id: "x".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"], true);
        assert!(json["message"].as_str().unwrap().contains("'x'"));
    }

    #[test]
    fn budgeted_under_limit_sends_everything() {
        let store = store_with(&[200, 100]);
        let allocation = policy().allocate("budgeted-model", &store).unwrap();
        assert!(allocation.success);
        assert!(allocation.send_all_cache);
        assert_eq!(allocation.items_to_send, 2);
        assert_eq!(allocation.tokens_to_send, 300);
        assert_eq!(allocation.percent_used, 50);
        assert!(allocation.warning.is_none());
    }

    #[test]
    fn budgeted_at_exact_limit_sends_everything() {
        let store = store_with(&[300, 300]);
        let allocation = policy().allocate("budgeted-model", &store).unwrap();
        assert!(allocation.send_all_cache);
        assert_eq!(allocation.percent_used, 100);
    }

    #[test]
    fn budgeted_over_limit_sends_newest_slice() {
        let store = store_with(&[400, 400, 400]);
        let allocation = policy().allocate("budgeted-model", &store).unwrap();
        assert!(!allocation.send_all_cache);
        assert_eq!(allocation.items_to_send, 1);
        assert_eq!(allocation.tokens_to_send, 400);
        assert_eq!(allocation.percent_used, CAPPED_PERCENT);
        let warning = allocation.warning.unwrap();
        assert!(warning.contains("Budgeted"));
        assert!(warning.contains("newest 1 items"));
    }

    #[test]
    fn budgeted_never_exceeds_safe_budget() {
        for sizes in [
            vec![599, 2],
            vec![100, 200, 300, 350],
            vec![601],
            vec![50; 20],
        ] {
            let store = store_with(&sizes);
            let allocation = policy().allocate("budgeted-model", &store).unwrap();
            assert!(allocation.tokens_to_send <= 600, "{sizes:?}");
        }
    }

    #[test]
    fn send_all_ignores_occupancy() {
        let store = store_with(&[400, 400]);
        let allocation = policy().allocate("send-all-model", &store).unwrap();
        assert!(allocation.send_all_cache);
        assert_eq!(allocation.tokens_to_send, 800);
        assert_eq!(allocation.percent_used, 80);
        assert!(allocation.warning.is_none());
    }

    #[test]
    fn send_all_warns_near_budget() {
        let store = store_with(&[450, 450]);
        let allocation = policy().allocate("send-all-model", &store).unwrap();
        assert_eq!(allocation.percent_used, 90);
        assert!(allocation.warning.unwrap().contains("Pause"));
    }

    #[test]
    fn empty_store_allocates_nothing() {
        let store = BoundedContentStore::new(1000);
        let allocation = policy().allocate("budgeted-model", &store).unwrap();
        assert!(allocation.send_all_cache);
        assert_eq!(allocation.items_to_send, 0);
        assert_eq!(allocation.percent_used, 0);
        assert_eq!(allocation.joined("\n"), "");
    }

    #[test]
    fn contents_are_chronological() {
        let mut store = BoundedContentStore::new(1000);
        store.insert("first", Metadata::new());
        store.insert("second", Metadata::new());
        let allocation = policy().allocate("budgeted-model", &store).unwrap();
        assert_eq!(allocation.joined("|"), "first|second");
    }

    #[test]
    fn allocation_serializes_without_items() {
        let store = store_with(&[10]);
        let allocation = policy().allocate("budgeted-model", &store).unwrap();
        let json = serde_json::to_value(&allocation).unwrap();
        assert_eq!(json["model_name"], "Budgeted");
        assert_eq!(json["tokens_to_send"], 10);
        assert!(json.get("items").is_none());
    }
}
