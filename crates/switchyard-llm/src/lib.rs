//! Switchyard LLM - Task-based completion routing
//!
//! This crate routes named tasks to an ordered chain of candidate models:
//! - Config: Routing documents, task resolution and process settings
//! - Sanitize: Capability-aware parameter filtering per candidate
//! - Providers: Azure OpenAI, OpenRouter and Gemini clients
//! - Router: Failover engine with truncation and transient retries
//! - Cache: Content-addressed on-disk response cache
//! - Telemetry: JSON-lines usage log

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod completion;
pub mod config;
pub mod error;
pub mod message;
pub mod providers;
pub mod router;
pub mod sanitize;
pub mod telemetry;
pub mod util;

pub use cache::{CacheEntry, CacheStats, ContentCache, TaskId};
pub use completion::{
    CacheInfo, CallResult, FinishReason, Options, ProviderResponse, ReasoningEffort,
    ResponseFormat, RetryInfo, TokenUsage, TruncationRetry,
};
pub use config::{
    ModelConfig, ProviderConfig, ProviderKind, ResolvedTask, RouterSettings, RoutingConfig,
};
pub use error::{Error, ErrorClass, Result};
pub use message::{Message, MessageRole};
pub use providers::{ProviderClient, ProviderRegistry};
pub use router::{FailoverHook, FailureSummary, Router, RoutingDecision};
pub use sanitize::{sanitize, ProviderParams};
pub use telemetry::{UsageLog, UsageRecord, UsageStatus};
