//! Mock provider client for testing
//!
//! Replies are scripted per model key and consumed in order. When a model's
//! script runs dry the client answers `"mock response"`.

use super::{InvocationRequest, ProviderClient};
use crate::completion::{FinishReason, ProviderResponse, TokenUsage};
use crate::config::ProviderKind;
use crate::error::{Error, Result};
use crate::sanitize::ProviderParams;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// A scripted reply
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Complete text
    Text(String),
    /// Text cut off at the token cap
    Truncated(String),
    /// Success with no text
    Empty,
    /// Provider error with an HTTP status
    Status(u16),
    /// Error without a status (connection reset and the like)
    Unclassified(String),
}

/// An invocation seen by the mock
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Candidate model key
    pub model_key: String,
    /// Parameters it was invoked with
    pub params: ProviderParams,
}

/// A mock provider client that returns queued replies
pub struct MockProvider {
    kind: ProviderKind,
    scripts: Mutex<HashMap<String, VecDeque<MockReply>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockProvider {
    /// Create a mock serving `kind`
    #[must_use]
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue replies for a model key
    #[must_use]
    pub fn with_replies(self, model_key: &str, replies: impl IntoIterator<Item = MockReply>) -> Self {
        self.push_replies(model_key, replies);
        self
    }

    /// Queue replies for a model key
    pub fn push_replies(&self, model_key: &str, replies: impl IntoIterator<Item = MockReply>) {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(model_key.to_string())
            .or_default()
            .extend(replies);
    }

    /// Every invocation so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of invocations of `model_key`
    #[must_use]
    pub fn call_count(&self, model_key: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| c.model_key == model_key)
            .count()
    }
}

#[async_trait::async_trait]
impl ProviderClient for MockProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn invoke(&self, request: &InvocationRequest<'_>) -> Result<ProviderResponse> {
        let sequence = {
            let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
            calls.push(RecordedCall {
                model_key: request.model_key.to_string(),
                params: request.params.clone(),
            });
            calls.len()
        };

        let reply = self
            .scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(request.model_key)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| MockReply::Text("mock response".to_string()));

        let (content, finish_reason) = match reply {
            MockReply::Text(text) => (text, FinishReason::Stop),
            MockReply::Truncated(text) => (text, FinishReason::Length),
            MockReply::Empty => (String::new(), FinishReason::Stop),
            MockReply::Status(status) => {
                return Err(Error::Api {
                    status: Some(status),
                    message: format!("mock status {status}"),
                })
            }
            MockReply::Unclassified(message) => return Err(Error::Network(message)),
        };

        let completion_tokens = content.split_whitespace().count() as u32;
        Ok(ProviderResponse {
            content,
            usage: Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens,
                total_tokens: 10 + completion_tokens,
            }),
            finish_reason: Some(finish_reason),
            request_id: Some(format!("mock-{sequence}")),
            model: request.model.model.clone(),
        })
    }
}
