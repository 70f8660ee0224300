//! Routing documents
//!
//! One file per document in a config directory. The format follows the
//! extension: YAML, JSON or TOML.

use super::types::{FallbackPolicy, ModelConfig, ProviderConfig, ProviderKind, TaskConfig, TaskOverride};
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Document file stems
pub const PROVIDERS_DOC: &str = "providers";
/// Models document
pub const MODELS_DOC: &str = "models";
/// Tiers document
pub const TIERS_DOC: &str = "tiers";
/// Tasks document
pub const TASKS_DOC: &str = "tasks";
/// Fallback policy document
pub const FALLBACK_DOC: &str = "fallback";
/// Task override document
pub const TASK_OVERRIDES_DOC: &str = "task_overrides";
/// Tier override document
pub const TIER_OVERRIDES_DOC: &str = "tier_overrides";

const EXTENSIONS: &[&str] = &["yaml", "yml", "json", "toml"];

/// All routing documents, immutable once loaded
#[derive(Debug, Clone, Default)]
pub struct RoutingConfig {
    /// Provider name → credentials and endpoint
    pub providers: BTreeMap<ProviderKind, ProviderConfig>,
    /// Model key → model config
    pub models: BTreeMap<String, ModelConfig>,
    /// Tier name → ordered model keys
    pub tiers: BTreeMap<String, Vec<String>>,
    /// Task name → tier and defaults
    pub tasks: BTreeMap<String, TaskConfig>,
    /// Retry and backoff policy
    pub fallback: FallbackPolicy,
    /// Task name → override
    pub task_overrides: BTreeMap<String, TaskOverride>,
    /// Tier name → replacement model keys
    pub tier_overrides: BTreeMap<String, Vec<String>>,
}

impl RoutingConfig {
    /// Load every document from `dir` and validate cross references
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();

        let config = Self {
            providers: read_required(dir, PROVIDERS_DOC)?,
            models: read_required(dir, MODELS_DOC)?,
            tiers: read_required(dir, TIERS_DOC)?,
            tasks: read_optional(dir, TASKS_DOC)?.unwrap_or_default(),
            fallback: read_optional(dir, FALLBACK_DOC)?.unwrap_or_default(),
            task_overrides: read_optional(dir, TASK_OVERRIDES_DOC)?.unwrap_or_default(),
            tier_overrides: read_optional(dir, TIER_OVERRIDES_DOC)?.unwrap_or_default(),
        };
        config.validate()?;

        info!(
            dir = %dir.display(),
            providers = config.providers.len(),
            models = config.models.len(),
            tiers = config.tiers.len(),
            tasks = config.tasks.len(),
            "Loaded routing documents"
        );
        Ok(config)
    }

    /// Check that every reference points at a known entry
    pub fn validate(&self) -> Result<()> {
        for (key, model) in &self.models {
            if !self.providers.contains_key(&model.provider) {
                return Err(Error::Config(format!(
                    "model '{key}' targets provider '{}' which has no providers entry",
                    model.provider
                )));
            }
        }

        let tier_lists = self
            .tiers
            .iter()
            .chain(self.tier_overrides.iter())
            .map(|(name, keys)| (format!("tier '{name}'"), keys));
        let override_lists = self
            .task_overrides
            .iter()
            .filter_map(|(task, o)| o.models.as_ref().map(|keys| (format!("task override '{task}'"), keys)));

        for (owner, keys) in tier_lists.chain(override_lists) {
            if let Some(unknown) = keys.iter().find(|k| !self.models.contains_key(*k)) {
                return Err(Error::Config(format!(
                    "{owner} references unknown model '{unknown}'"
                )));
            }
        }

        self.fallback.validate()?;

        for (task, entry) in &self.tasks {
            if let Some(tier) = &entry.tier {
                if !self.has_tier(tier) {
                    return Err(Error::Config(format!(
                        "task '{task}' references unknown tier '{tier}'"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Whether `tier` exists in the base or override document
    #[must_use]
    pub fn has_tier(&self, tier: &str) -> bool {
        self.tiers.contains_key(tier) || self.tier_overrides.contains_key(tier)
    }

    /// Look up a model by key
    #[must_use]
    pub fn model(&self, key: &str) -> Option<&ModelConfig> {
        self.models.get(key)
    }
}

fn find_document(dir: &Path, stem: &str) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|path| path.is_file())
}

fn read_required<T: DeserializeOwned>(dir: &Path, stem: &str) -> Result<T> {
    read_optional(dir, stem)?.ok_or_else(|| {
        Error::Config(format!(
            "missing required document '{stem}' in {}",
            dir.display()
        ))
    })
}

fn read_optional<T: DeserializeOwned>(dir: &Path, stem: &str) -> Result<Option<T>> {
    let Some(path) = find_document(dir, stem) else {
        debug!(document = stem, "Optional document not present");
        return Ok(None);
    };
    parse_document(&path).map(Some)
}

/// Parse one document, picking the format from the extension
pub fn parse_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let parsed = match ext {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
        "json" => serde_json::from_str(&content).map_err(|e| e.to_string()),
        "toml" => toml::from_str(&content).map_err(|e| e.to_string()),
        other => Err(format!("unsupported document format '{other}'")),
    };

    parsed.map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    fn base_documents(dir: &Path) {
        write(
            dir,
            "providers.yaml",
            "azure:\n  api_key_env: AZURE_OPENAI_API_KEY\n  endpoint_env: AZURE_OPENAI_ENDPOINT\n  api_version: \"2024-10-21\"\nopenrouter:\n  api_key_env: OPENROUTER_API_KEY\n",
        );
        write(
            dir,
            "models.json",
            r#"{
                "m1": {"provider": "azure", "model": "gpt-4o-mini",
                       "capabilities": {"max_output_tokens": 150}},
                "m2": {"provider": "openrouter", "model": "openai/gpt-4o-mini"}
            }"#,
        );
        write(dir, "tiers.yaml", "standard: [m1, m2]\nfast: [m2]\n");
    }

    #[test]
    fn test_load_mixed_formats() {
        let dir = tempfile::tempdir().unwrap();
        base_documents(dir.path());
        write(
            dir.path(),
            "tasks.toml",
            "[tts_annotate]\ntier = \"fast\"\n\n[tts_annotate.defaults]\ntemperature = 0.2\n",
        );
        write(
            dir.path(),
            "fallback.yaml",
            "retry_limit: 3\nper_status_backoff:\n  429: 5.0\n",
        );

        let config = RoutingConfig::load(dir.path()).unwrap();
        assert_eq!(config.tiers["standard"], vec!["m1", "m2"]);
        assert_eq!(
            config.models["m1"].capabilities.max_output_tokens,
            Some(150)
        );
        assert_eq!(config.tasks["tts_annotate"].tier.as_deref(), Some("fast"));
        assert_eq!(config.tasks["tts_annotate"].defaults.temperature, Some(0.2));
        assert_eq!(config.fallback.retry_limit, 3);
        assert_eq!(config.fallback.per_status_backoff.get(&429), Some(&5.0));
        // untouched fields keep their defaults
        assert!(config.fallback.transient_statuses.contains(&503));
    }

    #[test]
    fn test_missing_required_document() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "providers.yaml", "{}\n");

        let err = RoutingConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("models")));
    }

    #[test]
    fn test_unknown_model_in_tier_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        base_documents(dir.path());
        write(dir.path(), "tier_overrides.yaml", "standard: [m3]\n");

        let err = RoutingConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("m3")));
    }

    #[test]
    fn test_model_without_provider_entry_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        base_documents(dir.path());
        write(
            dir.path(),
            "models.yaml",
            "m1:\n  provider: gemini\n  model: gemini-2.5-flash\n",
        );
        // models.yaml is found before models.json
        write(dir.path(), "tiers.yaml", "standard: [m1]\n");

        let err = RoutingConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("gemini")));
    }
    #[test]
    fn test_fallback_backoff_must_be_finite() {
        let dir = tempfile::tempdir().unwrap();
        base_documents(dir.path());
        write(dir.path(), "fallback.yaml", "backoff_sec: .inf
");

        let err = RoutingConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("backoff_sec")));
    }

    #[test]
    fn test_fallback_infinite_wait_cap_loads() {
        let dir = tempfile::tempdir().unwrap();
        base_documents(dir.path());
        write(dir.path(), "fallback.yaml", "max_total_wait_sec: .inf
");

        let config = RoutingConfig::load(dir.path()).unwrap();
        assert_eq!(config.fallback.max_total_wait(), None);
    }
}
