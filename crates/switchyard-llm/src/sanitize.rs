//! Capability-aware parameter sanitization
//!
//! Options are sanitized per candidate, since candidates in one chain can
//! differ in what they accept. The provider-specific wire names are only
//! chosen at invocation time by [`ProviderParams::to_wire`].

use crate::completion::{Options, ReasoningEffort, ResponseFormat};
use crate::config::{ApiType, ModelConfig, ProviderKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Provider + model-id prefixes that accept a reasoning payload
///
/// Models outside this list never receive one, even when their
/// capabilities allow reasoning: unknown fields make some upstreams reject
/// the whole request.
pub const REASONING_ALLOWLIST: &[(ProviderKind, &str)] = &[
    (ProviderKind::Azure, "o1"),
    (ProviderKind::Azure, "o3"),
    (ProviderKind::Azure, "o4-mini"),
    (ProviderKind::Azure, "gpt-5"),
    (ProviderKind::OpenRouter, "openai/o1"),
    (ProviderKind::OpenRouter, "openai/o3"),
    (ProviderKind::OpenRouter, "openai/o4-mini"),
    (ProviderKind::OpenRouter, "openai/gpt-5"),
    (ProviderKind::OpenRouter, "anthropic/claude-sonnet-4"),
    (ProviderKind::OpenRouter, "anthropic/claude-opus-4"),
    (ProviderKind::OpenRouter, "google/gemini-2.5"),
    (ProviderKind::OpenRouter, "deepseek/deepseek-r1"),
    (ProviderKind::Gemini, "gemini-2.5"),
    (ProviderKind::Gemini, "gemini-3"),
];

/// Normalized reasoning request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningParams {
    /// Requested effort
    pub effort: ReasoningEffort,
}

/// Options a specific model accepts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderParams {
    /// Canonical output cap
    pub max_tokens: Option<u32>,
    /// Temperature
    pub temperature: Option<f32>,
    /// Nucleus sampling
    pub top_p: Option<f32>,
    /// Stop sequences
    pub stop: Option<Vec<String>>,
    /// Native JSON mode
    pub json_mode: bool,
    /// Reasoning payload
    pub reasoning: Option<ReasoningParams>,
    /// Sampling seed
    pub seed: Option<i64>,
}

/// Whether `model` may receive a reasoning payload
#[must_use]
pub fn reasoning_allowed(model: &ModelConfig) -> bool {
    model.capabilities.allow_reasoning
        && REASONING_ALLOWLIST
            .iter()
            .any(|(provider, prefix)| *provider == model.provider && model.model.starts_with(prefix))
}

/// Reduce merged options to what `model` accepts
#[must_use]
pub fn sanitize(model: &ModelConfig, options: &Options) -> ProviderParams {
    let caps = &model.capabilities;

    let max_tokens = match (options.max_tokens, caps.max_output_tokens) {
        (Some(requested), Some(cap)) => Some(requested.min(cap)),
        (requested, _) => requested,
    };

    let json_mode =
        options.response_format == Some(ResponseFormat::JsonObject) && caps.allow_json_mode;

    let reasoning = options
        .reasoning_effort
        .or(options.thinking_level)
        .filter(|_| reasoning_allowed(model))
        .map(|effort| ReasoningParams { effort });

    ProviderParams {
        max_tokens,
        temperature: options.temperature.filter(|_| caps.allow_temperature),
        top_p: options.top_p,
        stop: options
            .stop
            .clone()
            .filter(|stop| caps.allow_stop && !stop.is_empty()),
        json_mode,
        reasoning,
        seed: options.seed,
    }
}

/// Gemini 2.x models that take a token budget instead of a thinking level
const GEMINI_BUDGET_PREFIXES: &[&str] = &["gemini-2."];

/// Thinking token budget for an effort on budget-based Gemini models
#[must_use]
pub fn gemini_thinking_budget(effort: ReasoningEffort) -> u32 {
    match effort {
        ReasoningEffort::Minimal => 512,
        ReasoningEffort::Low => 1024,
        ReasoningEffort::Medium => 8192,
        ReasoningEffort::High => 24576,
    }
}

fn gemini_thinking_config(model_id: &str, effort: ReasoningEffort) -> Value {
    if GEMINI_BUDGET_PREFIXES
        .iter()
        .any(|prefix| model_id.starts_with(prefix))
    {
        json!({ "thinkingBudget": gemini_thinking_budget(effort) })
    } else {
        json!({ "thinkingLevel": effort.as_str() })
    }
}

/// Name of the output cap field for a provider and wire API
#[must_use]
pub fn token_field(provider: ProviderKind, api_type: ApiType) -> &'static str {
    match (provider, api_type) {
        (ProviderKind::Gemini, _) | (_, ApiType::GenerateContent) => "maxOutputTokens",
        (ProviderKind::Azure, ApiType::Responses) => "max_output_tokens",
        (ProviderKind::Azure, ApiType::ChatCompletions) => "max_completion_tokens",
        (ProviderKind::OpenRouter, ApiType::Responses) => "max_output_tokens",
        (ProviderKind::OpenRouter, ApiType::ChatCompletions) => "max_tokens",
    }
}

impl ProviderParams {
    /// Copy with a different output cap
    #[must_use]
    pub fn with_max_tokens(&self, max_tokens: u32) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            ..self.clone()
        }
    }

    /// Provider-specific request fields
    ///
    /// For Gemini the map is the `generationConfig` object; for the
    /// OpenAI-style APIs it is merged into the top-level request body.
    #[must_use]
    pub fn to_wire(&self, model: &ModelConfig) -> Map<String, Value> {
        let mut wire = Map::new();
        let token_key = token_field(model.provider, model.api_type);

        if model.provider == ProviderKind::Gemini || model.api_type == ApiType::GenerateContent {
            if let Some(t) = self.temperature {
                wire.insert("temperature".into(), json!(t));
            }
            if let Some(p) = self.top_p {
                wire.insert("topP".into(), json!(p));
            }
            if let Some(stop) = &self.stop {
                wire.insert("stopSequences".into(), json!(stop));
            }
            if let Some(max) = self.max_tokens {
                wire.insert(token_key.into(), json!(max));
            }
            if let Some(seed) = self.seed {
                wire.insert("seed".into(), json!(seed));
            }
            if self.json_mode {
                wire.insert("responseMimeType".into(), json!("application/json"));
            }
            if let Some(r) = self.reasoning {
                wire.insert("thinkingConfig".into(), gemini_thinking_config(&model.model, r.effort));
            }
            return wire;
        }

        if let Some(t) = self.temperature {
            wire.insert("temperature".into(), json!(t));
        }
        if let Some(p) = self.top_p {
            wire.insert("top_p".into(), json!(p));
        }
        if let Some(stop) = &self.stop {
            wire.insert("stop".into(), json!(stop));
        }
        if let Some(max) = self.max_tokens {
            wire.insert(token_key.into(), json!(max));
        }
        if let Some(seed) = self.seed {
            wire.insert("seed".into(), json!(seed));
        }
        if self.json_mode {
            wire.insert("response_format".into(), json!({ "type": "json_object" }));
        }
        if let Some(r) = self.reasoning {
            match (model.provider, model.api_type) {
                (ProviderKind::Azure, ApiType::ChatCompletions) => {
                    wire.insert("reasoning_effort".into(), json!(r.effort.as_str()));
                }
                _ => {
                    wire.insert("reasoning".into(), json!({ "effort": r.effort.as_str() }));
                }
            }
        }
        wire
    }
}
