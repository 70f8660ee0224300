//! Process-level router settings
//!
//! Loaded with the `config` crate: an optional settings file, then
//! `SWITCHYARD_*` environment variables (highest priority). Nested keys use
//! `__`, e.g. `SWITCHYARD_CACHE__TTL_SECS=3600`.

use super::types::ProviderKind;
use crate::error::{Error, Result};
use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SWITCHYARD";

/// Default settings file stem, relative to the working directory
pub const DEFAULT_SETTINGS_FILE: &str = "config/router";

/// Router settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Directory holding the routing documents
    pub config_dir: PathBuf,
    /// Per-invocation timeout when the call does not set one
    pub request_timeout_secs: u64,
    /// Forced candidate lists
    pub force: ForceOverrides,
    /// Content cache controls
    pub cache: CacheSettings,
    /// Traffic split controls
    pub split: SplitSettings,
    /// Truncation retry controls
    pub truncation: TruncationSettings,
    /// Usage log controls
    pub usage_log: UsageLogSettings,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("config"),
            request_timeout_secs: 120,
            force: ForceOverrides::default(),
            cache: CacheSettings::default(),
            split: SplitSettings::default(),
            truncation: TruncationSettings::default(),
            usage_log: UsageLogSettings::default(),
        }
    }
}

/// Forced candidate lists, validated against the model registry at resolve time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceOverrides {
    /// Candidate list for every task
    #[serde(deserialize_with = "string_list")]
    pub models: Vec<String>,
    /// Candidate list per task, wins over `models`
    #[serde(deserialize_with = "task_model_map")]
    pub tasks: BTreeMap<String, Vec<String>>,
}

/// Content cache controls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Master switch
    pub enabled: bool,
    /// Allow reads
    pub read: bool,
    /// Allow writes
    pub write: bool,
    /// Cache directory (defaults under the user cache dir)
    pub dir: Option<PathBuf>,
    /// Entry lifetime in seconds, 0 disables expiry
    pub ttl_secs: u64,
    /// Delete expired entries when a read finds them
    pub purge_expired: bool,
    /// Exact task names that bypass the cache
    #[serde(deserialize_with = "string_list")]
    pub exclude_tasks: Vec<String>,
    /// Task name prefixes that bypass the cache
    #[serde(deserialize_with = "string_list")]
    pub exclude_prefixes: Vec<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            read: true,
            write: true,
            dir: None,
            ttl_secs: 0,
            purge_expired: false,
            exclude_tasks: Vec::new(),
            exclude_prefixes: Vec::new(),
        }
    }
}

impl CacheSettings {
    /// Cache directory, falling back to `<user cache dir>/switchyard/llm`
    #[must_use]
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("switchyard")
                .join("llm")
        })
    }
}

/// Deterministic traffic split between one provider class and the rest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitSettings {
    /// Share of calls that try `provider` first, in `[0, 1]`; unset disables
    pub ratio: Option<f64>,
    /// Preferred provider class
    pub provider: ProviderKind,
    /// Routing key used for every call when set
    pub key: Option<String>,
}

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            ratio: None,
            provider: ProviderKind::OpenRouter,
            key: None,
        }
    }
}

/// Truncation retry controls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncationSettings {
    /// Retry truncated output with a larger cap
    pub enabled: bool,
    /// Growth factor for the cap
    pub multiplier: f64,
    /// Cap ceiling applied on top of the model cap
    pub max_tokens: Option<u32>,
}

impl Default for TruncationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            multiplier: 2.0,
            max_tokens: None,
        }
    }
}

/// Usage log controls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageLogSettings {
    /// Write usage records
    pub enabled: bool,
    /// Log path (defaults under the user data dir)
    pub path: Option<PathBuf>,
}

impl Default for UsageLogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl UsageLogSettings {
    /// Log path, falling back to `<user data dir>/switchyard/usage.jsonl`
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("switchyard")
                .join("usage.jsonl")
        })
    }
}

impl RouterSettings {
    /// Load settings from `file` (or `config/router.*` when present) and the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let builder = Config::builder();
        let builder = match file {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_SETTINGS_FILE).required(false)),
        };
        Self::from_builder(builder.add_source(env_source()))
    }

    /// Deserialize from a prepared builder
    pub fn from_builder(
        builder: ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build settings: {e}")))?
            .try_deserialize()
            .map_err(|e| Error::Config(format!("failed to deserialize settings: {e}")))
    }
}

/// `SWITCHYARD_*` environment source
///
/// `prefix_separator("_")` keeps `SWITCHYARD_CACHE__DIR` working; without it
/// the prefix separator defaults to `__`.
#[must_use]
pub fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

// ============================================================================
// Lenient list parsing (env vars arrive as plain strings)
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    List(Vec<String>),
    One(String),
}

impl StringOrList {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::List(items) => items,
            Self::One(text) => split_list(&text),
        }
    }
}

fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn string_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(StringOrList::deserialize(deserializer)?.into_vec())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskModelMap {
    Map(BTreeMap<String, StringOrList>),
    Json(String),
}

fn task_model_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = match TaskModelMap::deserialize(deserializer)? {
        TaskModelMap::Map(map) => map,
        TaskModelMap::Json(text) if text.trim().is_empty() => BTreeMap::new(),
        TaskModelMap::Json(text) => serde_json::from_str(&text).map_err(serde::de::Error::custom)?,
    };
    Ok(map
        .into_iter()
        .map(|(task, models)| (task, models.into_vec()))
        .collect())
}
