use crate::completion::{CallResult, Options};
use crate::error::ErrorClass;
use crate::message::Message;
use serde::{Deserialize, Serialize};

/// Diagnostics handed to the failover hook when every candidate failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureSummary {
    /// Task name
    pub task: String,
    /// Candidates invoked, in order
    pub tried: Vec<String>,
    /// Last error text
    pub last_error: Option<String>,
    /// Class of the last error
    pub error_class: ErrorClass,
    /// Last HTTP status seen during the call
    pub last_status: Option<u16>,
}

/// Last-resort handler for exhausted chains
///
/// A returned result is passed to the caller as is; `None` lets the router
/// surface `Error::ChainExhausted`.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait FailoverHook: Send + Sync {
    /// Called once per exhausted call
    async fn on_exhausted(
        &self,
        task: &str,
        messages: &[Message],
        options: &Options,
        summary: &FailureSummary,
    ) -> Option<CallResult>;
}
