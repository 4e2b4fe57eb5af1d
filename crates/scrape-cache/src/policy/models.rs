//! Per-model rate-limit policies.
//!
//! Each model is tagged with the allocation strategy it uses and carries
//! its own limits. The built-in models are a closed [`KnownModel`] enum; a
//! [`ModelTable`] keyed by model id is what the allocator actually consults,
//! so deployments can add or override entries through configuration.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::store::CHARS_PER_TOKEN;
use crate::store::bounded::bytes_to_kb;

/// Rate limits for one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ModelLimits {
    /// Human-readable name used in warnings.
    pub display_name: String,
    /// Tokens per minute as published by the provider.
    pub declared_tpm: u64,
    /// Ceiling the allocator actually budgets against. Configured per model,
    /// not derived from `declared_tpm`.
    pub safe_tpm: u64,
    /// Requests per minute. Informational; pacing lives elsewhere.
    pub rpm: u32,
}

impl ModelLimits {
    pub fn new(
        display_name: impl Into<String>,
        declared_tpm: u64,
        safe_tpm: u64,
        rpm: u32,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            declared_tpm,
            safe_tpm,
            rpm,
        }
    }
}

/// How the allocator treats a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ModelPolicy {
    /// Always send the whole cache. Only valid when `safe_tpm` is provisioned
    /// at or above the store capacity and downstream request pacing absorbs
    /// the gap to `declared_tpm`; see [`ModelTable::capacity_warnings`].
    SendAll(ModelLimits),
    /// Send the whole cache while it fits `safe_tpm`, otherwise the newest
    /// slice that does.
    Budgeted(ModelLimits),
}

impl ModelPolicy {
    pub fn limits(&self) -> &ModelLimits {
        match self {
            ModelPolicy::SendAll(limits) | ModelPolicy::Budgeted(limits) => limits,
        }
    }

    pub fn is_send_all(&self) -> bool {
        matches!(self, ModelPolicy::SendAll(_))
    }
}

/// Models supported out of the box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownModel {
    Gemini25Flash,
    Gemini25FlashLite,
    Gemini20Flash,
    Gpt4o,
    Gpt4oMini,
    Gpt41Mini,
}

impl KnownModel {
    pub const ALL: [KnownModel; 6] = [
        KnownModel::Gemini25Flash,
        KnownModel::Gemini25FlashLite,
        KnownModel::Gemini20Flash,
        KnownModel::Gpt4o,
        KnownModel::Gpt4oMini,
        KnownModel::Gpt41Mini,
    ];

    /// Provider model identifier.
    pub fn id(self) -> &'static str {
        match self {
            KnownModel::Gemini25Flash => "gemini-2.5-flash",
            KnownModel::Gemini25FlashLite => "gemini-2.5-flash-lite",
            KnownModel::Gemini20Flash => "gemini-2.0-flash",
            KnownModel::Gpt4o => "gpt-4o",
            KnownModel::Gpt4oMini => "gpt-4o-mini",
            KnownModel::Gpt41Mini => "gpt-4.1-mini",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.id() == id)
    }

    pub fn policy(self) -> ModelPolicy {
        match self {
            // Provisioned above the default 25 MB store so the full cache
            // always goes out in one request.
            KnownModel::Gemini25Flash => ModelPolicy::SendAll(ModelLimits::new(
                "Gemini 2.5 Flash",
                1_000_000,
                7_000_000,
                10,
            )),
            KnownModel::Gemini25FlashLite => ModelPolicy::Budgeted(ModelLimits::new(
                "Gemini 2.5 Flash-Lite",
                250_000,
                225_000,
                15,
            )),
            KnownModel::Gemini20Flash => ModelPolicy::Budgeted(ModelLimits::new(
                "Gemini 2.0 Flash",
                1_000_000,
                900_000,
                15,
            )),
            KnownModel::Gpt4o => {
                ModelPolicy::Budgeted(ModelLimits::new("GPT-4o", 30_000, 27_000, 500))
            }
            KnownModel::Gpt4oMini => {
                ModelPolicy::Budgeted(ModelLimits::new("GPT-4o mini", 200_000, 180_000, 500))
            }
            KnownModel::Gpt41Mini => {
                ModelPolicy::Budgeted(ModelLimits::new("GPT-4.1 mini", 200_000, 180_000, 500))
            }
        }
    }
}

impl std::fmt::Display for KnownModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Static limits for a model, shaped for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub model_id: String,
    pub display_name: String,
    pub declared_tpm: u64,
    pub safe_tpm: u64,
    pub rpm: u32,
    /// Approximate payload ceiling: `safe_tpm * 4 bytes / 1024`.
    pub max_kb: u64,
    pub send_all: bool,
}

/// Model policies keyed by model id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ModelTable {
    models: BTreeMap<String, ModelPolicy>,
}

impl Default for ModelTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelTable {
    /// A table with no models. Every allocation against it fails.
    pub fn empty() -> Self {
        Self {
            models: BTreeMap::new(),
        }
    }

    /// A table holding every [`KnownModel`].
    pub fn builtin() -> Self {
        let models = KnownModel::ALL
            .into_iter()
            .map(|m| (m.id().to_string(), m.policy()))
            .collect();
        Self { models }
    }

    /// Add or replace a model entry.
    pub fn with_model(mut self, model_id: impl Into<String>, policy: ModelPolicy) -> Self {
        self.insert(model_id, policy);
        self
    }

    pub fn insert(&mut self, model_id: impl Into<String>, policy: ModelPolicy) {
        self.models.insert(model_id.into(), policy);
    }

    /// Add every entry from `other`, replacing entries with the same id.
    pub fn merge(&mut self, other: ModelTable) {
        self.models.extend(other.models);
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelPolicy> {
        self.models.get(model_id)
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }

    /// Entries sorted by model id.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelPolicy)> {
        self.models.iter().map(|(id, policy)| (id.as_str(), policy))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Static limits for `model_id`, or `None` if the model is unknown.
    pub fn get_model_info(&self, model_id: &str) -> Option<ModelInfo> {
        let policy = self.get(model_id)?;
        let limits = policy.limits();
        Some(ModelInfo {
            model_id: model_id.to_string(),
            display_name: limits.display_name.clone(),
            declared_tpm: limits.declared_tpm,
            safe_tpm: limits.safe_tpm,
            rpm: limits.rpm,
            max_kb: bytes_to_kb(limits.safe_tpm.saturating_mul(CHARS_PER_TOKEN)),
            send_all: policy.is_send_all(),
        })
    }

    /// Send-all models whose `safe_tpm` cannot cover a store of
    /// `store_max_tokens`. Such a model could be handed more tokens than it
    /// is budgeted for, so each entry is a configuration problem.
    pub fn capacity_warnings(&self, store_max_tokens: u64) -> Vec<String> {
        self.iter()
            .filter(|(_, policy)| policy.is_send_all())
            .filter(|(_, policy)| policy.limits().safe_tpm < store_max_tokens)
            .map(|(id, policy)| {
                format!(
                    "model '{id}' sends the whole cache but its safe budget ({} tokens) \
                     is below the cache capacity ({store_max_tokens} tokens)",
                    policy.limits().safe_tpm,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DEFAULT_MAX_TOKENS;

    #[test]
    fn known_model_ids_round_trip() {
        for model in KnownModel::ALL {
            assert_eq!(KnownModel::from_id(model.id()), Some(model));
        }
        assert_eq!(KnownModel::from_id("gpt-2"), None);
    }

    #[test]
    fn builtin_table_has_every_known_model() {
        let table = ModelTable::builtin();
        assert_eq!(table.len(), KnownModel::ALL.len());
        assert!(table.get("gemini-2.5-flash").unwrap().is_send_all());
        assert!(!table.get("gpt-4o").unwrap().is_send_all());
    }

    #[test]
    fn budgeted_models_derate_declared_limit() {
        for model in KnownModel::ALL {
            if let ModelPolicy::Budgeted(limits) = model.policy() {
                assert!(limits.safe_tpm < limits.declared_tpm, "{model}");
            }
        }
    }

    #[test]
    fn builtin_send_all_models_cover_default_capacity() {
        let table = ModelTable::builtin();
        assert!(table.capacity_warnings(DEFAULT_MAX_TOKENS).is_empty());
        assert_eq!(table.capacity_warnings(8_000_000).len(), 1);
    }

    #[test]
    fn model_info_reports_kb_ceiling() {
        let info = ModelTable::builtin().get_model_info("gpt-4o").unwrap();
        assert_eq!(info.display_name, "GPT-4o");
        assert_eq!(info.safe_tpm, 27_000);
        assert_eq!(info.declared_tpm, 30_000);
        assert_eq!(info.rpm, 500);
        assert_eq!(info.max_kb, 105); // 108_000 bytes
        assert!(!info.send_all);
    }

    #[test]
    fn model_info_unknown_is_none() {
        assert!(ModelTable::builtin().get_model_info("llama-1").is_none());
    }

    #[test]
    fn with_model_overrides_builtin() {
        let table = ModelTable::builtin().with_model(
            "gpt-4o",
            ModelPolicy::Budgeted(ModelLimits::new("GPT-4o (tier 2)", 450_000, 400_000, 5000)),
        );
        assert_eq!(table.len(), KnownModel::ALL.len());
        assert_eq!(table.get("gpt-4o").unwrap().limits().safe_tpm, 400_000);
    }

    #[test]
    fn policy_serializes_with_strategy_tag() {
        let policy = KnownModel::Gpt4o.policy();
        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["strategy"], "budgeted");
        assert_eq!(json["safe_tpm"], 27_000);

        let back: ModelPolicy = serde_json::from_value(json).unwrap();
        assert_eq!(back, policy);
    }
}
