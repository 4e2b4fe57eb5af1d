//! Engine configuration: store capacity, oversize handling, and the model
//! table.
//!
//! Everything here is fixed at construction time. [`EngineConfig`] can be
//! built in code with the `with_*` methods or loaded from JSON, in which
//! case the document is validated against the schema generated from this
//! type before it is deserialized.
//!
//! ```json
//! {
//!   "max_tokens": 2000000,
//!   "oversize_policy": "truncate",
//!   "models": {
//!     "gpt-4o": {
//!       "strategy": "budgeted",
//!       "display_name": "GPT-4o (tier 3)",
//!       "declared_tpm": 800000,
//!       "safe_tpm": 720000,
//!       "rpm": 5000
//!     }
//!   }
//! }
//! ```

use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::policy::{ModelAllocationPolicy, ModelPolicy, ModelTable};
use crate::store::{BoundedContentStore, DEFAULT_MAX_TOKENS, OversizePolicy};

/// Construction-time settings for a [`ScrapeSession`](crate::session::ScrapeSession).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Store capacity in estimated tokens. Default: 25 MB of text.
    pub max_tokens: u64,
    /// Handling of single captures larger than the whole capacity.
    pub oversize_policy: OversizePolicy,
    /// Start from the built-in model table. Default: `true`.
    pub include_builtin_models: bool,
    /// Extra or overriding model entries, keyed by model id.
    pub models: ModelTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            oversize_policy: OversizePolicy::default(),
            include_builtin_models: true,
            models: ModelTable::empty(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the store capacity (in tokens).
    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_oversize_policy(mut self, policy: OversizePolicy) -> Self {
        self.oversize_policy = policy;
        self
    }

    /// Add or override a model entry.
    pub fn with_model(mut self, model_id: impl Into<String>, policy: ModelPolicy) -> Self {
        self.models.insert(model_id, policy);
        self
    }

    /// Drop the built-in models; only entries added explicitly remain.
    pub fn without_builtin_models(mut self) -> Self {
        self.include_builtin_models = false;
        self
    }

    /// The effective model table: built-ins (if enabled) overlaid with the
    /// configured entries.
    pub fn model_table(&self) -> ModelTable {
        let mut table = if self.include_builtin_models {
            ModelTable::builtin()
        } else {
            ModelTable::empty()
        };
        table.merge(self.models.clone());
        table
    }

    pub fn build_store(&self) -> BoundedContentStore {
        BoundedContentStore::new(self.max_tokens).with_oversize_policy(self.oversize_policy)
    }

    pub fn build_policy(&self) -> ModelAllocationPolicy {
        ModelAllocationPolicy::new(self.model_table())
    }

    /// JSON Schema describing the configuration document.
    pub fn json_schema() -> serde_json::Value {
        let schema = schemars::schema_for!(EngineConfig);
        serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, String> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| format!("invalid config JSON: {e}"))?;
        validate_against_schema(&value)?;
        serde_json::from_value(value).map_err(|e| format!("invalid config: {e}"))
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config {}: {e}", path.display()))?;
        Self::from_json_str(&json).map_err(|e| format!("{}: {e}", path.display()))
    }
}

/// Check `value` against [`EngineConfig::json_schema`], listing every
/// violation with its instance path.
fn validate_against_schema(value: &serde_json::Value) -> Result<(), String> {
    let schema = EngineConfig::json_schema();
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| format!("config schema is invalid: {e}"))?;

    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!("config validation failed:\n{}", errors.join("\n")))
    }
}
