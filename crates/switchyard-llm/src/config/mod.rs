//! Configuration - routing documents, task resolution and settings
//!
//! # Module Structure
//!
//! - `types`: Provider, model, task and fallback document types
//! - `documents`: Loading and validating the routing documents
//! - `resolver`: Task → candidate chain resolution
//! - `settings`: Process-level controls from file and environment

mod documents;
mod resolver;
mod settings;
mod types;

pub use documents::{
    parse_document, RoutingConfig, FALLBACK_DOC, MODELS_DOC, PROVIDERS_DOC, TASKS_DOC,
    TASK_OVERRIDES_DOC, TIERS_DOC, TIER_OVERRIDES_DOC,
};
pub use resolver::{ResolutionSource, ResolvedTask, DEFAULT_TIER, FORCED_TIER};
pub use settings::{
    env_source, CacheSettings, ForceOverrides, RouterSettings, SplitSettings,
    TruncationSettings, UsageLogSettings, DEFAULT_SETTINGS_FILE, ENV_PREFIX,
};
pub use types::{
    ApiType, Capabilities, FallbackPolicy, ModelConfig, ProviderConfig, ProviderKind,
    TaskConfig, TaskOverride,
};
