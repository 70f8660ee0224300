use super::{network_error, timeout_from, InvocationRequest, ProviderClient};
use crate::completion::{FinishReason, ProviderResponse, TokenUsage};
use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{Error, Result};
use crate::message::MessageRole;
use crate::util::sanitize_api_error;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

/// Gemini API base URL
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    generation_config: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
    response_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UsageMetadata {
    prompt_token_count: u32,
    candidates_token_count: u32,
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
}

// ============================================================================
// Client
// ============================================================================

/// Gemini generateContent client
pub struct GeminiClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    /// Create a Gemini client
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_key: String, config: &ProviderConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout_from(config))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn build_request(request: &InvocationRequest<'_>) -> GeminiRequest {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();

        let contents = request
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| GeminiContent {
                role: Some(
                    match m.role {
                        MessageRole::Assistant => "model",
                        _ => "user",
                    }
                    .to_string(),
                ),
                parts: vec![GeminiPart {
                    text: Some(m.content.clone()),
                }],
            })
            .collect();

        GeminiRequest {
            contents,
            system_instruction: (!system.is_empty()).then(|| GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: Some(system.join("\n\n")),
                }],
            }),
            generation_config: request.params.to_wire(request.model),
        }
    }

    fn parse_response(text: &str, requested_model: &str) -> Result<ProviderResponse> {
        let response: GeminiResponse =
            serde_json::from_str(text).map_err(|e| Error::InvalidResponse(e.to_string()))?;

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse("No candidates in response".to_string()))?;

        let content: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        Ok(ProviderResponse {
            content,
            usage: response.usage_metadata.map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            }),
            finish_reason: candidate.finish_reason.map(FinishReason::from),
            request_id: response.response_id,
            model: response
                .model_version
                .unwrap_or_else(|| requested_model.to_string()),
        })
    }
}

#[async_trait::async_trait]
impl ProviderClient for GeminiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    #[instrument(skip(self, request), fields(model = %request.model.model))]
    async fn invoke(&self, request: &InvocationRequest<'_>) -> Result<ProviderResponse> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, request.model.model
        );
        let body = Self::build_request(request);

        debug!("Sending request to Gemini API");

        let response = self
            .http
            .post(&url)
            .timeout(request.timeout)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(e, request.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| network_error(e, request.timeout))?;

        if !status.is_success() {
            let message = serde_json::from_str::<GeminiErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(Error::Api {
                status: Some(status.as_u16()),
                message: sanitize_api_error(&message),
            });
        }

        Self::parse_response(&text, &request.model.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::message::Message;
    use crate::sanitize::ProviderParams;
    use std::time::Duration;

    #[test]
    fn test_system_messages_become_instruction() {
        let model = ModelConfig::new(ProviderKind::Gemini, "gemini-2.5-flash");
        let params = ProviderParams {
            max_tokens: Some(64),
            temperature: Some(0.1),
            ..ProviderParams::default()
        };
        let messages = vec![
            Message::system("rules"),
            Message::user("q"),
            Message::assistant("a"),
        ];
        let request = InvocationRequest {
            model_key: "g1",
            model: &model,
            messages: &messages,
            params: &params,
            timeout: Duration::from_secs(5),
        };

        let body = serde_json::to_value(GeminiClient::build_request(&request)).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "rules");
        assert_eq!(body["contents"].as_array().unwrap().len(), 2);
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 64);
    }

    #[test]
    fn test_parse_response_max_tokens_is_truncation() {
        let text = r#"{
            "candidates": [{"content": {"parts": [{"text": "half "}, {"text": "done"}]},
                            "finishReason": "MAX_TOKENS"}],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 2, "totalTokenCount": 7},
            "responseId": "abc"
        }"#;

        let response = GeminiClient::parse_response(text, "gemini-2.5-flash").unwrap();
        assert_eq!(response.content, "half done");
        assert!(response.is_truncated());
        assert_eq!(response.request_id.as_deref(), Some("abc"));
        assert_eq!(response.model, "gemini-2.5-flash");
    }
}
