use super::key::TaskId;
use crate::completion::{CallResult, FinishReason, RetryInfo, TokenUsage};
use crate::config::ProviderKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current on-disk format
pub const SCHEMA_VERSION: u32 = 1;

/// Where a cached response came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Provider that produced the content
    pub provider: ProviderKind,
    /// Model key of the winning candidate
    pub model_key: String,
    /// Concrete model id
    pub model: String,
    /// Finish reason of the final attempt
    pub finish_reason: Option<FinishReason>,
    /// Retry metadata of the winning candidate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryInfo>,
}

/// A cached response, never mutated once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Format version
    pub schema_version: u32,
    /// Key of the entry, must match the file name
    pub task_id: TaskId,
    /// Task name
    pub task: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Generated content
    pub content: String,
    /// Token usage of the original call
    pub usage: Option<TokenUsage>,
    /// Origin
    pub provenance: Provenance,
}

impl CacheEntry {
    /// Build an entry from a successful call
    #[must_use]
    pub fn from_result(task_id: TaskId, task: &str, result: &CallResult) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            task_id,
            task: task.to_string(),
            created_at: Utc::now(),
            content: result.content.clone(),
            usage: result.usage,
            provenance: Provenance {
                provider: result.provider,
                model_key: result.model_key.clone(),
                model: result.model.clone(),
                finish_reason: result.finish_reason.clone(),
                retry: result.retry.clone(),
            },
        }
    }

    /// Whether the entry is older than `ttl_secs` at `now`; 0 never expires
    #[must_use]
    pub fn is_expired(&self, ttl_secs: u64, now: DateTime<Utc>) -> bool {
        if ttl_secs == 0 {
            return false;
        }
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        now.signed_duration_since(self.created_at).num_seconds() >= ttl
    }
}
