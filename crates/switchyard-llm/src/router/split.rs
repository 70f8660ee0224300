//! Deterministic traffic split
//!
//! A routing key hashes to a bucket in `[0, 1)`. Calls whose bucket falls
//! below the configured ratio try the preferred provider class first; the
//! rest try it last. Relative order inside each class is preserved.

use crate::cache::TaskId;
use crate::config::ProviderKind;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Where the routing key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingKeySource {
    /// `routing_key` call option
    Options,
    /// `split.key` setting
    Settings,
    /// Cache key of the call
    TaskId,
    /// `task:message_count` fallback
    TaskShape,
}

/// Key hashed to choose the split bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingKey {
    /// Key text
    pub value: String,
    /// Origin
    pub source: RoutingKeySource,
}

impl RoutingKey {
    /// Pick the first available key: call option, setting, TaskID, task shape
    #[must_use]
    pub fn choose(
        option_key: Option<&str>,
        settings_key: Option<&str>,
        task_id: Option<&TaskId>,
        task: &str,
        message_count: usize,
    ) -> Self {
        fn non_empty(key: Option<&str>) -> Option<String> {
            key.filter(|k| !k.trim().is_empty()).map(String::from)
        }

        if let Some(value) = non_empty(option_key) {
            return Self {
                value,
                source: RoutingKeySource::Options,
            };
        }
        if let Some(value) = non_empty(settings_key) {
            return Self {
                value,
                source: RoutingKeySource::Settings,
            };
        }
        match task_id {
            Some(id) => Self {
                value: id.as_str().to_string(),
                source: RoutingKeySource::TaskId,
            },
            None => Self {
                value: format!("{task}:{message_count}"),
                source: RoutingKeySource::TaskShape,
            },
        }
    }
}

/// Split decision attached to results and usage records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Bucket of the routing key, in `[0, 1)`
    pub bucket: f64,
    /// Configured ratio after clamping
    pub ratio: f64,
    /// Preferred provider class
    pub preferred: ProviderKind,
    /// Whether the preferred class went first
    pub preferred_first: bool,
    /// Origin of the routing key
    pub key_source: RoutingKeySource,
}

/// Bucket of `key` in `[0, 1)`
///
/// Uses the top 53 bits of the SHA-256 digest so the value is exact in an
/// `f64`.
#[must_use]
pub fn bucket_for(key: &str) -> f64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let bits = u64::from_be_bytes(prefix) >> 11;
    bits as f64 / (1u64 << 53) as f64
}

/// Reorder `candidates` for the split
///
/// `provider_of` maps a model key to its provider; keys it does not know
/// count as non-preferred.
pub fn apply_split<F>(
    candidates: &[String],
    provider_of: F,
    ratio: f64,
    preferred: ProviderKind,
    key: &RoutingKey,
) -> (Vec<String>, RoutingDecision)
where
    F: Fn(&str) -> Option<ProviderKind>,
{
    let ratio = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
    let bucket = bucket_for(&key.value);
    let preferred_first = bucket < ratio;

    let (matching, others): (Vec<String>, Vec<String>) = candidates
        .iter()
        .cloned()
        .partition(|k| provider_of(k.as_str()) == Some(preferred));

    let ordered = if preferred_first {
        matching.into_iter().chain(others).collect()
    } else {
        others.into_iter().chain(matching).collect()
    };

    (
        ordered,
        RoutingDecision {
            bucket,
            ratio,
            preferred,
            preferred_first,
            key_source: key.source,
        },
    )
}
