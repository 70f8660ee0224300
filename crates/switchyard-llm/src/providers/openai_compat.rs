use super::{network_error, timeout_from, InvocationRequest, ProviderClient};
use crate::completion::{FinishReason, ProviderResponse, TokenUsage};
use crate::config::{ApiType, ProviderConfig, ProviderKind};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::util::sanitize_api_error;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

// ============================================================================
// Constants
// ============================================================================

/// OpenRouter API base URL
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Azure OpenAI API version used when the providers document sets none
pub const AZURE_DEFAULT_API_VERSION: &str = "2024-10-21";

/// Response headers that may carry a request id, checked in order
const REQUEST_ID_HEADERS: &[&str] = &["x-request-id", "apim-request-id", "x-ms-request-id"];

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    id: Option<String>,
    model: Option<String>,
    status: Option<String>,
    incomplete_details: Option<IncompleteDetails>,
    #[serde(default)]
    output: Vec<ResponsesOutputItem>,
    usage: Option<ResponsesUsage>,
}

#[derive(Debug, Deserialize)]
struct IncompleteDetails {
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutputItem {
    #[serde(default)]
    content: Vec<ResponsesContent>,
}

#[derive(Debug, Deserialize)]
struct ResponsesContent {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponsesUsage {
    input_tokens: u32,
    output_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// ============================================================================
// Client
// ============================================================================

#[derive(Debug, Clone)]
enum Endpoint {
    Azure { endpoint: String, api_version: String },
    OpenRouter { base_url: String },
}

/// Client for OpenAI-style APIs (Azure OpenAI deployments, OpenRouter)
pub struct OpenAiCompatClient {
    http: Client,
    kind: ProviderKind,
    api_key: String,
    endpoint: Endpoint,
}

impl OpenAiCompatClient {
    /// Azure OpenAI client for the resource at `endpoint`
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn azure(api_key: String, endpoint: String, config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            http: build_http(config)?,
            kind: ProviderKind::Azure,
            api_key,
            endpoint: Endpoint::Azure {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                api_version: config
                    .api_version
                    .clone()
                    .unwrap_or_else(|| AZURE_DEFAULT_API_VERSION.to_string()),
            },
        })
    }

    /// OpenRouter client
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn openrouter(api_key: String, config: &ProviderConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| OPENROUTER_BASE_URL.to_string());
        Ok(Self {
            http: build_http(config)?,
            kind: ProviderKind::OpenRouter,
            api_key,
            endpoint: Endpoint::OpenRouter {
                base_url: base_url.trim_end_matches('/').to_string(),
            },
        })
    }

    fn url(&self, deployment: &str, api_type: ApiType) -> String {
        match (&self.endpoint, api_type) {
            (Endpoint::Azure { endpoint, api_version }, ApiType::Responses) => {
                format!("{endpoint}/openai/responses?api-version={api_version}")
            }
            (Endpoint::Azure { endpoint, api_version }, _) => format!(
                "{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={api_version}"
            ),
            (Endpoint::OpenRouter { base_url }, ApiType::Responses) => format!("{base_url}/responses"),
            (Endpoint::OpenRouter { base_url }, _) => format!("{base_url}/chat/completions"),
        }
    }

    fn body(request: &InvocationRequest<'_>) -> Value {
        let messages: Vec<WireMessage<'_>> = request
            .messages
            .iter()
            .map(|m: &Message| WireMessage {
                role: m.role.as_str(),
                content: &m.content,
                name: m.name.as_deref(),
            })
            .collect();

        let mut body = Map::new();
        body.insert("model".into(), Value::String(request.model.model.clone()));
        let messages_key = match request.model.api_type {
            ApiType::Responses => "input",
            _ => "messages",
        };
        body.insert(
            messages_key.into(),
            serde_json::to_value(messages).unwrap_or(Value::Array(Vec::new())),
        );
        body.extend(request.params.to_wire(request.model));
        Value::Object(body)
    }

    fn parse_chat(text: &str, headers: &HeaderMap) -> Result<ProviderResponse> {
        let response: ChatResponse =
            serde_json::from_str(text).map_err(|e| Error::InvalidResponse(e.to_string()))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse("No choices in response".to_string()))?;

        Ok(ProviderResponse {
            content: choice.message.and_then(|m| m.content).unwrap_or_default(),
            usage: response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason: choice.finish_reason.map(FinishReason::from),
            request_id: request_id(headers).or(response.id),
            model: response.model.unwrap_or_default(),
        })
    }

    fn parse_responses(text: &str, headers: &HeaderMap) -> Result<ProviderResponse> {
        let response: ResponsesResponse =
            serde_json::from_str(text).map_err(|e| Error::InvalidResponse(e.to_string()))?;

        let content: String = response
            .output
            .iter()
            .flat_map(|item| item.content.iter())
            .filter_map(|c| c.text.as_deref())
            .collect();

        let finish_reason = match response.status.as_deref() {
            Some("incomplete") => response
                .incomplete_details
                .and_then(|d| d.reason)
                .map(FinishReason::from),
            Some(status) => Some(FinishReason::from(status)),
            None => None,
        };

        Ok(ProviderResponse {
            content,
            usage: response.usage.map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason,
            request_id: request_id(headers).or(response.id),
            model: response.model.unwrap_or_default(),
        })
    }
}

#[async_trait::async_trait]
impl ProviderClient for OpenAiCompatClient {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    #[instrument(skip(self, request), fields(provider = %self.kind, model = %request.model.model))]
    async fn invoke(&self, request: &InvocationRequest<'_>) -> Result<ProviderResponse> {
        let url = self.url(&request.model.model, request.model.api_type);
        let body = Self::body(request);

        let builder = self.http.post(&url).timeout(request.timeout).json(&body);
        let builder = match self.endpoint {
            Endpoint::Azure { .. } => builder.header("api-key", &self.api_key),
            Endpoint::OpenRouter { .. } => builder.bearer_auth(&self.api_key),
        };

        debug!("Sending completion request");

        let response = builder
            .send()
            .await
            .map_err(|e| network_error(e, request.timeout))?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response
            .text()
            .await
            .map_err(|e| network_error(e, request.timeout))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(Error::Api {
                status: Some(status.as_u16()),
                message: sanitize_api_error(&message),
            });
        }

        match request.model.api_type {
            ApiType::Responses => Self::parse_responses(&text, &headers),
            _ => Self::parse_chat(&text, &headers),
        }
    }
}

fn build_http(config: &ProviderConfig) -> Result<Client> {
    Client::builder()
        .timeout(timeout_from(config))
        .build()
        .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))
}

fn request_id(headers: &HeaderMap) -> Option<String> {
    REQUEST_ID_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}
