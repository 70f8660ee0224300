//! Call options, provider responses and call results
//!
//! `Options` is the typed option set callers pass to the router. It merges
//! field by field (call-site over task overrides over task defaults) and
//! splits into *semantic* fields, which feed the cache key, and
//! *transport* fields (`max_tokens`, `routing_key`, `timeout_secs`), which
//! do not.

use crate::config::ProviderKind;
use crate::router::RoutingDecision;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Option keys excluded from the cache key
pub const TRANSPORT_KEYS: &[&str] = &["max_tokens", "routing_key", "timeout_secs"];

/// Requested response format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Plain text
    Text,
    /// A single JSON object
    JsonObject,
}

/// Reasoning effort hint, shared by `reasoning_effort` and `thinking_level`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    /// Minimal reasoning
    Minimal,
    /// Low effort
    Low,
    /// Medium effort
    Medium,
    /// High effort
    High,
}

impl ReasoningEffort {
    /// Wire representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Options for a routed call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Output token cap
    #[serde(
        skip_serializing_if = "Option::is_none",
        alias = "max_output_tokens",
        alias = "max_completion_tokens"
    )]
    pub max_tokens: Option<u32>,
    /// Response format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    /// Stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Reasoning effort
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Thinking level (Gemini naming of the same hint)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_level: Option<ReasoningEffort>,
    /// Sampling seed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    /// Explicit traffic-split routing key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_key: Option<String>,
    /// Per-invocation timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Options {
    /// Create empty options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set response format
    #[must_use]
    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    /// Set stop sequences
    #[must_use]
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Set reasoning effort
    #[must_use]
    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    /// Set the traffic-split routing key
    #[must_use]
    pub fn with_routing_key(mut self, key: impl Into<String>) -> Self {
        self.routing_key = Some(key.into());
        self
    }

    /// Set per-invocation timeout
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Layer `self` over `lower`: fields set here win
    #[must_use]
    pub fn merged_over(&self, lower: &Options) -> Options {
        Options {
            temperature: self.temperature.or(lower.temperature),
            top_p: self.top_p.or(lower.top_p),
            max_tokens: self.max_tokens.or(lower.max_tokens),
            response_format: self.response_format.or(lower.response_format),
            stop: self.stop.clone().or_else(|| lower.stop.clone()),
            reasoning_effort: self.reasoning_effort.or(lower.reasoning_effort),
            thinking_level: self.thinking_level.or(lower.thinking_level),
            seed: self.seed.or(lower.seed),
            routing_key: self.routing_key.clone().or_else(|| lower.routing_key.clone()),
            timeout_secs: self.timeout_secs.or(lower.timeout_secs),
        }
    }

    /// JSON object of the semantic fields only
    ///
    /// `serde_json` object maps are ordered by key, so the result has a
    /// canonical serialization.
    pub fn semantic_value(&self) -> serde_json::Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            for key in TRANSPORT_KEYS {
                map.remove(*key);
            }
        }
        Ok(value)
    }
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

/// Normalized finish reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FinishReason {
    /// Natural end of output
    Stop,
    /// Cut off by the token cap
    Length,
    /// Blocked by a content filter
    ContentFilter,
    /// Model requested tool calls
    ToolCalls,
    /// Anything else, kept verbatim
    Other(String),
}

impl FinishReason {
    /// Whether the output was cut off by the token cap
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Length)
    }

    /// Canonical string form
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ContentFilter => "content_filter",
            Self::ToolCalls => "tool_calls",
            Self::Other(other) => other,
        }
    }
}

impl From<&str> for FinishReason {
    fn from(value: &str) -> Self {
        match value {
            "stop" | "STOP" | "end_turn" | "completed" => Self::Stop,
            "length" | "max_tokens" | "MAX_TOKENS" | "max_output_tokens" => Self::Length,
            "content_filter" | "SAFETY" | "RECITATION" => Self::ContentFilter,
            "tool_calls" | "function_call" => Self::ToolCalls,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for FinishReason {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<FinishReason> for String {
    fn from(value: FinishReason) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a provider client returns for one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Generated content
    pub content: String,
    /// Token usage
    pub usage: Option<TokenUsage>,
    /// Finish reason
    pub finish_reason: Option<FinishReason>,
    /// Provider request id
    pub request_id: Option<String>,
    /// Model reported by the provider
    pub model: String,
}

impl ProviderResponse {
    /// Whether the provider stopped at the token cap
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.finish_reason
            .as_ref()
            .is_some_and(FinishReason::is_truncated)
    }
}

/// Token cap escalation performed after a truncated response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationRetry {
    /// Cap of the truncated attempt
    pub from_max_tokens: u32,
    /// Cap of the retry
    pub to_max_tokens: u32,
}

/// Retry metadata for the winning candidate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryInfo {
    /// Transient retries spent on the winning candidate
    pub transient_retries: u32,
    /// Escalation performed on the winning candidate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncation: Option<TruncationRetry>,
}

impl RetryInfo {
    /// Whether any retry happened
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transient_retries == 0 && self.truncation.is_none()
    }
}

/// Cache metadata attached to a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInfo {
    /// Content-addressed key
    pub task_id: String,
    /// Served from cache
    pub hit: bool,
    /// File read or written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Full result of a routed call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResult {
    /// Generated content
    pub content: String,
    /// Provider that produced the content
    pub provider: ProviderKind,
    /// Model key of the winning candidate
    pub model_key: String,
    /// Concrete model id
    pub model: String,
    /// Token usage
    pub usage: Option<TokenUsage>,
    /// Provider request id
    pub request_id: Option<String>,
    /// Candidates tried, in order
    pub chain: Vec<String>,
    /// Wall time of the call in milliseconds
    pub latency_ms: u64,
    /// Finish reason
    pub finish_reason: Option<FinishReason>,
    /// Retry metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryInfo>,
    /// Cache metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheInfo>,
    /// Traffic-split decision
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingDecision>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_merge_precedence() {
        let call = Options::new().with_temperature(0.9);
        let defaults = Options::new().with_temperature(0.1).with_max_tokens(500);

        let merged = call.merged_over(&defaults);
        assert_eq!(merged.temperature, Some(0.9));
        assert_eq!(merged.max_tokens, Some(500));
    }

    #[test]
    fn test_max_tokens_aliases() {
        let a: Options = serde_json::from_str(r#"{"max_output_tokens": 300}"#).unwrap();
        let b: Options = serde_json::from_str(r#"{"max_completion_tokens": 300}"#).unwrap();
        assert_eq!(a.max_tokens, Some(300));
        assert_eq!(b.max_tokens, Some(300));
    }

    #[test]
    fn test_semantic_value_drops_transport_keys() {
        let options = Options::new()
            .with_temperature(0.5)
            .with_max_tokens(100)
            .with_routing_key("cohort-a")
            .with_timeout_secs(30);

        let value = options.semantic_value().unwrap();
        let map = value.as_object().unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("temperature"));
    }

    #[test]
    fn test_finish_reason_normalization() {
        assert!(FinishReason::from("length").is_truncated());
        assert!(FinishReason::from("MAX_TOKENS").is_truncated());
        assert_eq!(FinishReason::from("STOP"), FinishReason::Stop);
        assert_eq!(
            FinishReason::from("weird"),
            FinishReason::Other("weird".to_string())
        );

        let json = serde_json::to_string(&FinishReason::Length).unwrap();
        assert_eq!(json, r#""length""#);
    }
}
