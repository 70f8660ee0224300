//! Error types for switchyard-llm

use crate::config::ProviderKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// LLM routing error type
#[derive(Debug, Error)]
pub enum Error {
    /// Task or document could not be resolved
    #[error("configuration error: {0}")]
    Config(String),

    /// No live client for the candidate's provider
    #[error("credentials unavailable for provider {0}")]
    CredentialUnavailable(ProviderKind),

    /// Provider returned an error response
    #[error("api error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Api {
        /// HTTP status, when the provider reported one
        status: Option<u16>,
        /// Sanitized provider message
        message: String,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// Timeout
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Invalid response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Provider reported success with no text
    #[error("empty content from {0}")]
    EmptyContent(String),

    /// Output stayed truncated and the token cap could not be raised further
    #[error("truncated output from {model_key} at max_tokens={max_tokens}")]
    Truncated {
        /// Candidate model key
        model_key: String,
        /// Last cap tried
        max_tokens: u32,
    },

    /// Every candidate failed
    #[error(
        "all candidates failed for task '{task}' (tried: {}){}",
        .tried.join(", "),
        .last_error.as_ref().map(|e| format!("; last error: {e}")).unwrap_or_default()
    )]
    ChainExhausted {
        /// Task name
        task: String,
        /// Model keys attempted, in order
        tried: Vec<String>,
        /// Last error message
        last_error: Option<String>,
        /// Last HTTP status seen
        last_status: Option<u16>,
    },

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification used by the failover engine and telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Unresolvable task or empty chain
    Config,
    /// Provider client missing
    CredentialUnavailable,
    /// Retryable provider failure
    Transient,
    /// Non-retryable provider failure
    Fatal,
    /// Output cut off by the token cap
    Truncated,
    /// Provider returned no text
    EmptyContent,
    /// No candidate succeeded
    ChainExhausted,
}

impl Error {
    /// HTTP-like status carried by the error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => *status,
            Self::ChainExhausted { last_status, .. } => *last_status,
            _ => None,
        }
    }

    /// Whether the error carries no status that could classify it
    #[must_use]
    pub fn is_unclassified(&self) -> bool {
        matches!(
            self,
            Self::Api { status: None, .. }
                | Self::Network(_)
                | Self::Timeout(_)
                | Self::InvalidResponse(_)
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
