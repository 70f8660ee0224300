//! Configuration types for LLM routing
//!
//! This module contains the document shapes for providers, models, tasks
//! and the fallback policy.

use crate::completion::Options;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Provider Configuration
// ============================================================================

/// Closed set of upstream providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Azure OpenAI deployments
    Azure,
    /// OpenRouter gateway
    OpenRouter,
    /// Google Gemini API
    Gemini,
}

impl ProviderKind {
    /// All providers
    pub const ALL: [ProviderKind; 3] = [Self::Azure, Self::OpenRouter, Self::Gemini];

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Azure => "azure",
            Self::OpenRouter => "openrouter",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "azure" => Ok(Self::Azure),
            "openrouter" => Ok(Self::OpenRouter),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Configuration for a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Whether the provider is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Env var holding the API key
    pub api_key_env: String,
    /// Env var holding the endpoint (Azure resource URL)
    #[serde(default)]
    pub endpoint_env: Option<String>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<String>,
    /// Default API version (Azure)
    #[serde(default)]
    pub api_version: Option<String>,
    /// Request timeout in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ProviderConfig {
    /// Create a provider config reading its key from `api_key_env`
    #[must_use]
    pub fn new(api_key_env: impl Into<String>) -> Self {
        Self {
            enabled: true,
            api_key_env: api_key_env.into(),
            endpoint_env: None,
            base_url: None,
            api_version: None,
            timeout_ms: None,
        }
    }
}

// ============================================================================
// Model Configuration
// ============================================================================

/// Wire API a model is served through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
    /// OpenAI chat completions
    #[default]
    ChatCompletions,
    /// OpenAI responses API
    Responses,
    /// Gemini generateContent
    GenerateContent,
}

/// What a model accepts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Accepts `temperature`
    pub allow_temperature: bool,
    /// Accepts stop sequences
    pub allow_stop: bool,
    /// Supports native JSON mode
    pub allow_json_mode: bool,
    /// Accepts a reasoning payload
    pub allow_reasoning: bool,
    /// Hard cap on output tokens
    pub max_output_tokens: Option<u32>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            allow_temperature: true,
            allow_stop: true,
            allow_json_mode: true,
            allow_reasoning: false,
            max_output_tokens: None,
        }
    }
}

/// Model configuration, keyed by model key in the models document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider serving the model
    pub provider: ProviderKind,
    /// Deployment or model name sent upstream
    pub model: String,
    /// Wire API
    #[serde(default)]
    pub api_type: ApiType,
    /// Capability flags
    #[serde(default)]
    pub capabilities: Capabilities,
}

impl ModelConfig {
    /// Create a new model configuration
    #[must_use]
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            api_type: ApiType::default(),
            capabilities: Capabilities::default(),
        }
    }

    /// Replace capabilities
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the wire API
    #[must_use]
    pub fn with_api_type(mut self, api_type: ApiType) -> Self {
        self.api_type = api_type;
        self
    }
}

// ============================================================================
// Task Configuration
// ============================================================================

/// Task entry in the tasks document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Tier the task runs on
    pub tier: Option<String>,
    /// Default options for the task
    pub defaults: Options,
}

impl TaskConfig {
    /// Create a task on `tier`
    #[must_use]
    pub fn on_tier(tier: impl Into<String>) -> Self {
        Self {
            tier: Some(tier.into()),
            defaults: Options::default(),
        }
    }
}

/// Task entry in the task overrides document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOverride {
    /// Replacement tier
    pub tier: Option<String>,
    /// Explicit candidate list, wins over `tier`
    pub models: Option<Vec<String>>,
    /// Options layered over the task defaults
    pub defaults: Options,
}

// ============================================================================
// Fallback Policy
// ============================================================================

fn default_transient_statuses() -> BTreeSet<u16> {
    [408, 409, 425, 429, 500, 502, 503, 504].into_iter().collect()
}

/// Retry and backoff tuning for provider failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackPolicy {
    /// Statuses treated as transient
    pub transient_statuses: BTreeSet<u16>,
    /// Retries per candidate for a transient status
    pub retry_limit: u32,
    /// Backoff between retries, in seconds
    pub backoff_sec: f64,
    /// Backoff overrides by status
    pub per_status_backoff: BTreeMap<u16, f64>,
    /// Retry limit overrides by status
    pub per_status_retry: BTreeMap<u16, u32>,
    /// Cap on provider invocations per call
    pub max_total_attempts: Option<u32>,
    /// Cap on cumulative backoff per call, in seconds
    pub max_total_wait_sec: Option<f64>,
    /// Treat errors without a status (network, timeout) as transient
    pub unclassified_is_transient: bool,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            transient_statuses: default_transient_statuses(),
            retry_limit: 2,
            backoff_sec: 1.0,
            per_status_backoff: BTreeMap::new(),
            per_status_retry: BTreeMap::new(),
            max_total_attempts: None,
            max_total_wait_sec: None,
            unclassified_is_transient: true,
        }
    }
}

impl FallbackPolicy {
    /// Whether a failure with this status may be retried
    #[must_use]
    pub fn is_transient(&self, status: Option<u16>) -> bool {
        match status {
            Some(code) => self.transient_statuses.contains(&code),
            None => self.unclassified_is_transient,
        }
    }

    /// Retries allowed per candidate for this status
    #[must_use]
    pub fn retry_limit_for(&self, status: Option<u16>) -> u32 {
        status
            .and_then(|code| self.per_status_retry.get(&code).copied())
            .unwrap_or(self.retry_limit)
    }

    /// Backoff before retrying after this status
    #[must_use]
    pub fn backoff_for(&self, status: Option<u16>) -> Duration {
        let secs = status
            .and_then(|code| self.per_status_backoff.get(&code).copied())
            .unwrap_or(self.backoff_sec);
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Cumulative backoff cap; infinite or out-of-range values mean no cap
    #[must_use]
    pub fn max_total_wait(&self) -> Option<Duration> {
        self.max_total_wait_sec
            .and_then(|secs| Duration::try_from_secs_f64(secs.max(0.0)).ok())
    }

    /// Reject backoff values that cannot describe a wait
    pub fn validate(&self) -> Result<()> {
        let backoffs = std::iter::once(("backoff_sec".to_string(), self.backoff_sec)).chain(
            self.per_status_backoff
                .iter()
                .map(|(code, secs)| (format!("per_status_backoff.{code}"), *secs)),
        );
        for (name, secs) in backoffs {
            if !secs.is_finite() || secs < 0.0 {
                return Err(Error::Config(format!(
                    "fallback {name} must be a finite, non-negative number of seconds"
                )));
            }
        }
        if let Some(secs) = self.max_total_wait_sec {
            if secs.is_nan() || secs < 0.0 {
                return Err(Error::Config(
                    "fallback max_total_wait_sec must be a non-negative number of seconds".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infinite_wait_cap_means_no_cap() {
        let policy = FallbackPolicy {
            max_total_wait_sec: Some(f64::INFINITY),
            ..FallbackPolicy::default()
        };
        assert_eq!(policy.max_total_wait(), None);
        assert!(policy.validate().is_ok());

        let huge = FallbackPolicy {
            max_total_wait_sec: Some(1e300),
            ..FallbackPolicy::default()
        };
        assert_eq!(huge.max_total_wait(), None);
    }

    #[test]
    fn test_oversized_backoff_saturates() {
        let mut policy = FallbackPolicy {
            backoff_sec: 1e300,
            ..FallbackPolicy::default()
        };
        policy.per_status_backoff.insert(429, f64::INFINITY);

        assert_eq!(policy.backoff_for(Some(503)), Duration::MAX);
        assert_eq!(policy.backoff_for(Some(429)), Duration::MAX);
        assert_eq!(
            FallbackPolicy::default().backoff_for(None),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_validate_rejects_unusable_backoff() {
        let mut policy = FallbackPolicy::default();
        policy.per_status_backoff.insert(429, f64::INFINITY);
        assert!(matches!(policy.validate(), Err(Error::Config(_))));

        let negative = FallbackPolicy {
            max_total_wait_sec: Some(-1.0),
            ..FallbackPolicy::default()
        };
        assert!(matches!(negative.validate(), Err(Error::Config(_))));

        let nan = FallbackPolicy {
            backoff_sec: f64::NAN,
            ..FallbackPolicy::default()
        };
        assert!(nan.validate().is_err());
    }
}
