use crate::completion::Options;
use crate::error::Result;
use crate::message::Message;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fmt;

/// Content-addressed cache key (lowercase hex SHA-256)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Hash the canonical form of a call
    ///
    /// `serde_json` maps are ordered by key, so equal inputs always
    /// serialize to the same bytes.
    pub fn compute(task: &str, messages: &[Message], options: &Options) -> Result<Self> {
        let canonical = json!({
            "task": task,
            "messages": messages,
            "options": options.semantic_value()?,
        });
        let bytes = serde_json::to_vec(&canonical)?;
        let digest = Sha256::digest(&bytes);
        Ok(Self(format!("{digest:x}")))
    }

    /// Hex digest
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-character shard directory name
    #[must_use]
    pub fn shard(&self) -> &str {
        &self.0[..2]
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
