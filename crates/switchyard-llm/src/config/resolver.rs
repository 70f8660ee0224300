//! Task resolution
//!
//! Priority, highest first: process force overrides, the task override
//! document, the task's declared tier, then the `standard` tier.

use super::documents::RoutingConfig;
use super::settings::ForceOverrides;
use crate::completion::Options;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Tier used for tasks the tasks document does not know
pub const DEFAULT_TIER: &str = "standard";

/// Tier label reported for forced candidate lists
pub const FORCED_TIER: &str = "forced";

/// Which layer decided the candidate list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Per-task force override
    ForcedTask,
    /// Global force override
    ForcedGlobal,
    /// Task override document
    TaskOverride,
    /// Tasks document
    TaskConfig,
    /// Unknown task, default tier
    DefaultTier,
}

/// Outcome of resolving a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedTask {
    /// Task name
    pub task: String,
    /// Tier name (or `forced`)
    pub tier: String,
    /// Ordered candidate model keys, never empty
    pub models: Vec<String>,
    /// Merged default options for the task
    pub defaults: Options,
    /// Deciding layer
    pub source: ResolutionSource,
}

impl RoutingConfig {
    /// Resolve `task` to its candidate chain and default options
    pub fn resolve(&self, task: &str, force: &ForceOverrides) -> Result<ResolvedTask> {
        let task_entry = self.tasks.get(task);
        let task_override = self.task_overrides.get(task);

        let defaults = match (task_override, task_entry) {
            (Some(o), Some(t)) => o.defaults.merged_over(&t.defaults),
            (Some(o), None) => o.defaults.clone(),
            (None, Some(t)) => t.defaults.clone(),
            (None, None) => Options::default(),
        };

        let forced = force
            .tasks
            .get(task)
            .filter(|keys| !keys.is_empty())
            .map(|keys| (keys, ResolutionSource::ForcedTask))
            .or_else(|| {
                (!force.models.is_empty()).then_some((&force.models, ResolutionSource::ForcedGlobal))
            });

        if let Some((keys, source)) = forced {
            let models = self.checked_candidates(keys, "force override")?;
            return Ok(ResolvedTask {
                task: task.to_string(),
                tier: FORCED_TIER.to_string(),
                models,
                defaults,
                source,
            });
        }

        if let Some(keys) = task_override.and_then(|o| o.models.as_ref()) {
            let models = self.checked_candidates(keys, "task override")?;
            if models.is_empty() {
                return Err(Error::Config(format!(
                    "task override for '{task}' has an empty model list"
                )));
            }
            return Ok(ResolvedTask {
                task: task.to_string(),
                tier: FORCED_TIER.to_string(),
                models,
                defaults,
                source: ResolutionSource::TaskOverride,
            });
        }

        let (tier, source) = if let Some(tier) = task_override.and_then(|o| o.tier.as_ref()) {
            (tier.as_str(), ResolutionSource::TaskOverride)
        } else if let Some(tier) = task_entry.and_then(|t| t.tier.as_ref()) {
            (tier.as_str(), ResolutionSource::TaskConfig)
        } else {
            (DEFAULT_TIER, ResolutionSource::DefaultTier)
        };

        let keys = self
            .tier_overrides
            .get(tier)
            .or_else(|| self.tiers.get(tier))
            .ok_or_else(|| Error::Config(format!("task '{task}' resolves to unknown tier '{tier}'")))?;

        let models = self.checked_candidates(keys, "tier")?;
        if models.is_empty() {
            return Err(Error::Config(format!(
                "tier '{tier}' for task '{task}' has no candidate models"
            )));
        }

        Ok(ResolvedTask {
            task: task.to_string(),
            tier: tier.to_string(),
            models,
            defaults,
            source,
        })
    }

    /// Validate keys against the model registry and drop duplicates
    fn checked_candidates(&self, keys: &[String], origin: &str) -> Result<Vec<String>> {
        let mut models: Vec<String> = Vec::with_capacity(keys.len());
        for key in keys {
            if !self.models.contains_key(key) {
                return Err(Error::Config(format!(
                    "{origin} names unknown model '{key}'"
                )));
            }
            if !models.contains(key) {
                models.push(key.clone());
            }
        }
        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{ModelConfig, ProviderConfig, ProviderKind, TaskConfig, TaskOverride};
    use std::collections::BTreeMap;

    fn config() -> RoutingConfig {
        let mut config = RoutingConfig::default();
        config
            .providers
            .insert(ProviderKind::Azure, ProviderConfig::new("AZURE_OPENAI_API_KEY"));
        for key in ["m1", "m2", "m3"] {
            config
                .models
                .insert(key.to_string(), ModelConfig::new(ProviderKind::Azure, key));
        }
        config
            .tiers
            .insert("standard".into(), vec!["m1".into(), "m2".into()]);
        config.tiers.insert("fast".into(), vec!["m3".into()]);
        config.tiers.insert("empty".into(), vec![]);

        let mut annotate = TaskConfig::on_tier("fast");
        annotate.defaults.temperature = Some(0.2);
        annotate.defaults.max_tokens = Some(400);
        config.tasks.insert("tts_annotate".into(), annotate);
        config
    }

    #[test]
    fn test_declared_tier() {
        let resolved = config()
            .resolve("tts_annotate", &ForceOverrides::default())
            .unwrap();
        assert_eq!(resolved.tier, "fast");
        assert_eq!(resolved.models, vec!["m3"]);
        assert_eq!(resolved.defaults.temperature, Some(0.2));
        assert_eq!(resolved.source, ResolutionSource::TaskConfig);
    }

    #[test]
    fn test_unknown_task_falls_back_to_standard() {
        let resolved = config().resolve("t1", &ForceOverrides::default()).unwrap();
        assert_eq!(resolved.tier, DEFAULT_TIER);
        assert_eq!(resolved.models, vec!["m1", "m2"]);
        assert_eq!(resolved.source, ResolutionSource::DefaultTier);
    }

    #[test]
    fn test_empty_tier_is_config_error() {
        let mut config = config();
        config.tasks.insert("t2".into(), TaskConfig::on_tier("empty"));

        let err = config.resolve("t2", &ForceOverrides::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_task_override_document() {
        let mut config = config();
        config.task_overrides.insert(
            "tts_annotate".into(),
            TaskOverride {
                tier: Some("standard".into()),
                models: None,
                defaults: Options::new().with_temperature(0.7),
            },
        );

        let resolved = config
            .resolve("tts_annotate", &ForceOverrides::default())
            .unwrap();
        assert_eq!(resolved.models, vec!["m1", "m2"]);
        assert_eq!(resolved.defaults.temperature, Some(0.7));
        // untouched task defaults survive the merge
        assert_eq!(resolved.defaults.max_tokens, Some(400));
        assert_eq!(resolved.source, ResolutionSource::TaskOverride);
    }

    #[test]
    fn test_tier_override_document() {
        let mut config = config();
        config
            .tier_overrides
            .insert("standard".into(), vec!["m2".into(), "m2".into(), "m1".into()]);

        let resolved = config.resolve("t1", &ForceOverrides::default()).unwrap();
        assert_eq!(resolved.models, vec!["m2", "m1"]);
    }

    #[test]
    fn test_force_overrides_win_and_are_validated() {
        let config = config();

        let global = ForceOverrides {
            models: vec!["m3".into()],
            tasks: BTreeMap::new(),
        };
        let resolved = config.resolve("tts_annotate", &global).unwrap();
        assert_eq!(resolved.models, vec!["m3"]);
        assert_eq!(resolved.tier, FORCED_TIER);
        assert_eq!(resolved.source, ResolutionSource::ForcedGlobal);

        let mut per_task = global.clone();
        per_task
            .tasks
            .insert("tts_annotate".into(), vec!["m2".into(), "m1".into()]);
        let resolved = config.resolve("tts_annotate", &per_task).unwrap();
        assert_eq!(resolved.models, vec!["m2", "m1"]);
        assert_eq!(resolved.source, ResolutionSource::ForcedTask);

        let bogus = ForceOverrides {
            models: vec!["nope".into()],
            tasks: BTreeMap::new(),
        };
        assert!(matches!(
            config.resolve("tts_annotate", &bogus),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let config = config();
        let force = ForceOverrides::default();
        let first = config.resolve("tts_annotate", &force).unwrap();
        let second = config.resolve("tts_annotate", &force).unwrap();
        assert_eq!(first.models, second.models);
        assert_eq!(first.defaults, second.defaults);
        assert_eq!(config.tiers["fast"], vec!["m3"]);
    }
}
