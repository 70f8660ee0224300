//! Usage log
//!
//! One JSON object per line, appended once per routed call. The log is
//! best effort: a failed write is reported through `tracing` and dropped.

use crate::completion::{CacheInfo, CallResult, FinishReason, RetryInfo, TokenUsage};
use crate::config::{ProviderKind, UsageLogSettings};
use crate::error::ErrorClass;
use crate::router::RoutingDecision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Outcome of a routed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    /// Content was returned
    Success,
    /// Every candidate failed
    Fail,
}

/// A single usage record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Task name
    pub task: String,
    /// Outcome
    pub status: UsageStatus,
    /// Provider of the winning candidate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    /// Model key of the winning candidate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_key: Option<String>,
    /// Concrete model id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Candidates tried, in order
    pub chain: Vec<String>,
    /// Wall time in milliseconds
    pub latency_ms: u64,
    /// Token usage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// Provider request id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Finish reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Retry metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryInfo>,
    /// Traffic-split decision
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingDecision>,
    /// Cache metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheInfo>,
    /// Last error text (failures only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Last error class (failures only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<ErrorClass>,
    /// Last HTTP status seen (failures only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status: Option<u16>,
}

impl UsageRecord {
    /// Record for a call that returned content
    #[must_use]
    pub fn success(task: &str, result: &CallResult) -> Self {
        Self {
            timestamp: Utc::now(),
            task: task.to_string(),
            status: UsageStatus::Success,
            provider: Some(result.provider),
            model_key: Some(result.model_key.clone()),
            model: Some(result.model.clone()),
            chain: result.chain.clone(),
            latency_ms: result.latency_ms,
            usage: result.usage,
            request_id: result.request_id.clone(),
            finish_reason: result.finish_reason.clone(),
            retry: result.retry.clone(),
            routing: result.routing.clone(),
            cache: result.cache.clone(),
            error: None,
            error_class: None,
            last_status: None,
        }
    }

    /// Record for a call whose chain was exhausted
    #[must_use]
    pub fn failure(task: &str, chain: Vec<String>, latency_ms: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            task: task.to_string(),
            status: UsageStatus::Fail,
            provider: None,
            model_key: None,
            model: None,
            chain,
            latency_ms,
            usage: None,
            request_id: None,
            finish_reason: None,
            retry: None,
            routing: None,
            cache: None,
            error: None,
            error_class: None,
            last_status: None,
        }
    }

    /// Attach error details
    #[must_use]
    pub fn with_error(
        mut self,
        error: Option<String>,
        error_class: ErrorClass,
        last_status: Option<u16>,
    ) -> Self {
        self.error = error;
        self.error_class = Some(error_class);
        self.last_status = last_status;
        self
    }

    /// Attach the split decision
    #[must_use]
    pub fn with_routing(mut self, routing: Option<RoutingDecision>) -> Self {
        self.routing = routing;
        self
    }

    /// Attach cache metadata
    #[must_use]
    pub fn with_cache(mut self, cache: Option<CacheInfo>) -> Self {
        self.cache = cache;
        self
    }
}

/// Append-only JSON-lines sink
#[derive(Debug, Clone)]
pub struct UsageLog {
    path: Option<PathBuf>,
}

impl UsageLog {
    /// Create a sink from settings
    #[must_use]
    pub fn new(settings: &UsageLogSettings) -> Self {
        Self {
            path: settings.enabled.then(|| settings.resolved_path()),
        }
    }

    /// Create a sink writing to `path`
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A sink that drops every record
    #[must_use]
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Log path, when enabled
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append a record; failures are logged and swallowed
    pub fn record(&self, record: &UsageRecord) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = append_line(path, record) {
            warn!(path = %path.display(), error = %e, "Failed to write usage record");
        }
    }

    /// Read every decodable record back
    pub fn read_all(&self) -> std::io::Result<Vec<UsageRecord>> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        if !path.exists() {
            return Ok(Vec::new());
        }
        Ok(fs::read_to_string(path)?
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

fn append_line(path: &Path, record: &UsageRecord) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_records_append_as_json_lines() {
        let dir = TempDir::new().unwrap();
        let log = UsageLog::at(dir.path().join("logs").join("usage.jsonl"));

        log.record(&UsageRecord::failure("t1", vec!["m1".into(), "m2".into()], 12).with_error(
            Some("api error (503): overloaded".into()),
            ErrorClass::Transient,
            Some(503),
        ));
        log.record(&UsageRecord::failure("t2", vec![], 1));

        let text = fs::read_to_string(log.path().unwrap()).unwrap();
        assert_eq!(text.lines().count(), 2);

        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first["status"], "fail");
        assert_eq!(first["error_class"], "transient");
        assert_eq!(first["last_status"], 503);
        assert!(first.get("provider").is_none());

        let records = log.read_all().unwrap();
        assert_eq!(records[1].task, "t2");
    }

    #[test]
    fn test_unwritable_path_is_swallowed() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be opened for append
        let log = UsageLog::at(dir.path());
        log.record(&UsageRecord::failure("t1", vec![], 0));
    }

    #[test]
    fn test_disabled_log_writes_nothing() {
        let settings = UsageLogSettings {
            enabled: false,
            path: None,
        };
        let log = UsageLog::new(&settings);
        assert!(log.path().is_none());
        log.record(&UsageRecord::failure("t1", vec![], 0));
        assert!(log.read_all().unwrap().is_empty());
    }
}
