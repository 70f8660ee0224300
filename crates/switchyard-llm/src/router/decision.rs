//! Retry decisions
//!
//! The failover engine reports what happened to an invocation as an
//! [`Outcome`] and asks [`decide`] what to do next. `decide` is pure: all
//! bookkeeping lives in [`AttemptState`], owned by the engine.

use crate::completion::ProviderResponse;
use crate::config::{FallbackPolicy, TruncationSettings};
use crate::error::{Error, ErrorClass, Result};
use std::time::Duration;

/// Cap assumed for escalation when neither the call nor the model sets one
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// What one invocation produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Non-empty, complete content
    Success,
    /// Content cut off by the token cap
    Truncated,
    /// Success without text
    Empty,
    /// Provider error
    Failed {
        /// HTTP status, if the error carried one
        status: Option<u16>,
    },
}

impl Outcome {
    /// Classify an invocation result
    #[must_use]
    pub fn of(result: &Result<ProviderResponse>) -> Self {
        match result {
            Ok(response) if response.content.trim().is_empty() => Self::Empty,
            Ok(response) if response.is_truncated() => Self::Truncated,
            Ok(_) => Self::Success,
            Err(e) => Self::Failed { status: e.status() },
        }
    }
}

/// What the engine does next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Return the response
    Accept,
    /// Return the truncated response without caching it
    AcceptTruncated,
    /// Invoke the same candidate again after `delay`
    RetrySame {
        /// Backoff before the retry
        delay: Duration,
    },
    /// Invoke the same candidate again with a larger cap
    Escalate {
        /// New cap
        max_tokens: u32,
    },
    /// Move to the next candidate
    Advance,
    /// Give up on the whole chain
    StopChain,
}

/// Counters for the current call and candidate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptState {
    /// Invocations made in this call, including the one being decided
    pub total_attempts: u32,
    /// Backoff slept in this call
    pub total_wait: Duration,
    /// Transient retries spent on the current candidate
    pub candidate_retries: u32,
    /// Whether the current candidate was already escalated
    pub escalated: bool,
    /// Cap of the invocation being decided
    pub max_tokens: Option<u32>,
    /// Hard cap of the current candidate's model
    pub model_cap: Option<u32>,
}

impl AttemptState {
    /// Reset per-candidate counters for a new candidate
    pub fn start_candidate(&mut self, max_tokens: Option<u32>, model_cap: Option<u32>) {
        self.candidate_retries = 0;
        self.escalated = false;
        self.max_tokens = max_tokens;
        self.model_cap = model_cap;
    }
}

/// Next cap after a truncation, or `None` when it cannot grow
///
/// `max(current + 1, round(current * multiplier))`, clamped to the smaller
/// of the model cap and the configured ceiling.
#[must_use]
pub fn escalate_cap(
    current: u32,
    multiplier: f64,
    model_cap: Option<u32>,
    ceiling: Option<u32>,
) -> Option<u32> {
    let scaled = (f64::from(current) * multiplier).round();
    let scaled = if scaled.is_finite() && scaled > 0.0 {
        scaled.min(f64::from(u32::MAX)) as u32
    } else {
        0
    };

    let mut next = scaled.max(current.saturating_add(1));
    if let Some(limit) = [model_cap, ceiling].into_iter().flatten().min() {
        next = next.min(limit);
    }
    (next > current).then_some(next)
}

/// Map an outcome to the next action
#[must_use]
pub fn decide(
    outcome: Outcome,
    policy: &FallbackPolicy,
    truncation: &TruncationSettings,
    state: &AttemptState,
) -> NextAction {
    let action = match outcome {
        Outcome::Success => return NextAction::Accept,
        Outcome::Truncated if !truncation.enabled => return NextAction::AcceptTruncated,
        Outcome::Truncated if state.escalated => NextAction::Advance,
        Outcome::Truncated => {
            let current = state
                .max_tokens
                .or(state.model_cap)
                .unwrap_or(DEFAULT_MAX_TOKENS);
            match escalate_cap(
                current,
                truncation.multiplier,
                state.model_cap,
                truncation.max_tokens,
            ) {
                Some(max_tokens) => NextAction::Escalate { max_tokens },
                None => NextAction::Advance,
            }
        }
        Outcome::Empty => NextAction::Advance,
        Outcome::Failed { status } if !policy.is_transient(status) => return NextAction::StopChain,
        Outcome::Failed { status } if state.candidate_retries < policy.retry_limit_for(status) => {
            let delay = policy.backoff_for(status);
            if policy
                .max_total_wait()
                .is_some_and(|limit| state.total_wait.saturating_add(delay) > limit)
            {
                return NextAction::StopChain;
            }
            NextAction::RetrySame { delay }
        }
        Outcome::Failed { .. } => NextAction::Advance,
    };

    if policy
        .max_total_attempts
        .is_some_and(|limit| state.total_attempts >= limit)
    {
        return NextAction::StopChain;
    }
    action
}

/// Error class reported to telemetry and the failover hook
#[must_use]
pub fn classify(error: &Error, policy: &FallbackPolicy) -> ErrorClass {
    match error {
        Error::Config(_) => ErrorClass::Config,
        Error::CredentialUnavailable(_) => ErrorClass::CredentialUnavailable,
        Error::Truncated { .. } => ErrorClass::Truncated,
        Error::EmptyContent(_) => ErrorClass::EmptyContent,
        Error::ChainExhausted { .. } => ErrorClass::ChainExhausted,
        Error::Api {
            status: Some(code), ..
        } if policy.is_transient(Some(*code)) => ErrorClass::Transient,
        other if other.is_unclassified() && policy.unclassified_is_transient => {
            ErrorClass::Transient
        }
        _ => ErrorClass::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::FinishReason;

    fn state() -> AttemptState {
        AttemptState {
            total_attempts: 1,
            ..AttemptState::default()
        }
    }

    #[test]
    fn test_escalate_cap_clamps_to_model_cap() {
        assert_eq!(escalate_cap(100, 2.0, Some(150), None), Some(150));
        assert_eq!(escalate_cap(100, 2.0, None, Some(120)), Some(120));
        assert_eq!(escalate_cap(100, 2.0, Some(500), Some(300)), Some(200));
    }

    #[test]
    fn test_escalate_cap_always_grows_or_refuses() {
        assert_eq!(escalate_cap(100, 1.0, None, None), Some(101));
        assert_eq!(escalate_cap(100, 0.5, None, None), Some(101));
        assert_eq!(escalate_cap(150, 2.0, Some(150), None), None);
        assert_eq!(escalate_cap(u32::MAX, 2.0, None, None), None);

        for current in [1, 7, 100, 4096, 30_000] {
            for multiplier in [0.0, 1.0, 1.3, 2.0, 10.0] {
                if let Some(next) = escalate_cap(current, multiplier, Some(32_000), Some(16_000)) {
                    assert!(next > current);
                    assert!(next <= 16_000);
                }
            }
        }
    }

    #[test]
    fn test_outcome_of_response() {
        let ok = |content: &str, finish: FinishReason| -> Result<ProviderResponse> {
            Ok(ProviderResponse {
                content: content.to_string(),
                usage: None,
                finish_reason: Some(finish),
                request_id: None,
                model: "m".to_string(),
            })
        };

        assert_eq!(Outcome::of(&ok("hi", FinishReason::Stop)), Outcome::Success);
        assert_eq!(Outcome::of(&ok("hi", FinishReason::Length)), Outcome::Truncated);
        assert_eq!(Outcome::of(&ok("  ", FinishReason::Stop)), Outcome::Empty);
        assert_eq!(
            Outcome::of(&Err(Error::Api {
                status: Some(429),
                message: "slow down".into()
            })),
            Outcome::Failed { status: Some(429) }
        );
    }

    #[test]
    fn test_transient_retry_then_advance() {
        let policy = FallbackPolicy::default();
        let truncation = TruncationSettings::default();
        let failed = Outcome::Failed { status: Some(503) };

        let mut s = state();
        assert_eq!(
            decide(failed, &policy, &truncation, &s),
            NextAction::RetrySame {
                delay: Duration::from_secs(1)
            }
        );
        s.candidate_retries = 2;
        assert_eq!(decide(failed, &policy, &truncation, &s), NextAction::Advance);
    }

    #[test]
    fn test_non_transient_stops_chain() {
        let policy = FallbackPolicy::default();
        let action = decide(
            Outcome::Failed { status: Some(401) },
            &policy,
            &TruncationSettings::default(),
            &state(),
        );
        assert_eq!(action, NextAction::StopChain);
    }

    #[test]
    fn test_unclassified_follows_policy() {
        let truncation = TruncationSettings::default();
        let unclassified = Outcome::Failed { status: None };

        let policy = FallbackPolicy::default();
        assert!(matches!(
            decide(unclassified, &policy, &truncation, &state()),
            NextAction::RetrySame { .. }
        ));

        let strict = FallbackPolicy {
            unclassified_is_transient: false,
            ..FallbackPolicy::default()
        };
        assert_eq!(
            decide(unclassified, &strict, &truncation, &state()),
            NextAction::StopChain
        );
    }

    #[test]
    fn test_per_status_overrides() {
        let mut policy = FallbackPolicy::default();
        policy.per_status_retry.insert(429, 0);
        policy.per_status_backoff.insert(503, 5.0);
        let truncation = TruncationSettings::default();

        assert_eq!(
            decide(Outcome::Failed { status: Some(429) }, &policy, &truncation, &state()),
            NextAction::Advance
        );
        assert_eq!(
            decide(Outcome::Failed { status: Some(503) }, &policy, &truncation, &state()),
            NextAction::RetrySame {
                delay: Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn test_global_limits_stop_chain() {
        let truncation = TruncationSettings::default();
        let failed = Outcome::Failed { status: Some(503) };

        let attempts = FallbackPolicy {
            max_total_attempts: Some(3),
            ..FallbackPolicy::default()
        };
        let s = AttemptState {
            total_attempts: 3,
            ..AttemptState::default()
        };
        assert_eq!(decide(failed, &attempts, &truncation, &s), NextAction::StopChain);
        assert_eq!(decide(Outcome::Empty, &attempts, &truncation, &s), NextAction::StopChain);
        assert_eq!(decide(Outcome::Success, &attempts, &truncation, &s), NextAction::Accept);

        let wait = FallbackPolicy {
            max_total_wait_sec: Some(1.5),
            ..FallbackPolicy::default()
        };
        let s = AttemptState {
            total_attempts: 2,
            total_wait: Duration::from_secs(1),
            candidate_retries: 1,
            ..AttemptState::default()
        };
        assert_eq!(decide(failed, &wait, &truncation, &s), NextAction::StopChain);
    }

    #[test]
    fn test_truncation_escalates_once() {
        let policy = FallbackPolicy::default();
        let truncation = TruncationSettings::default();

        let mut s = state();
        s.start_candidate(Some(100), Some(150));
        assert_eq!(
            decide(Outcome::Truncated, &policy, &truncation, &s),
            NextAction::Escalate { max_tokens: 150 }
        );

        s.escalated = true;
        s.max_tokens = Some(150);
        assert_eq!(
            decide(Outcome::Truncated, &policy, &truncation, &s),
            NextAction::Advance
        );
    }

    #[test]
    fn test_truncation_without_cap_uses_default() {
        let s = state();
        assert_eq!(
            decide(
                Outcome::Truncated,
                &FallbackPolicy::default(),
                &TruncationSettings::default(),
                &s
            ),
            NextAction::Escalate {
                max_tokens: DEFAULT_MAX_TOKENS * 2
            }
        );
    }

    #[test]
    fn test_truncation_disabled_accepts() {
        let truncation = TruncationSettings {
            enabled: false,
            ..TruncationSettings::default()
        };
        assert_eq!(
            decide(
                Outcome::Truncated,
                &FallbackPolicy::default(),
                &truncation,
                &state()
            ),
            NextAction::AcceptTruncated
        );
    }

    #[test]
    fn test_classify() {
        let policy = FallbackPolicy::default();
        assert_eq!(
            classify(&Error::Network("reset".into()), &policy),
            ErrorClass::Transient
        );
        assert_eq!(
            classify(
                &Error::Api {
                    status: Some(400),
                    message: "bad".into()
                },
                &policy
            ),
            ErrorClass::Fatal
        );
        assert_eq!(
            classify(&Error::EmptyContent("m1".into()), &policy),
            ErrorClass::EmptyContent
        );
    }

    #[test]
    fn test_classify_statusless_errors() {
        let policy = FallbackPolicy::default();
        let io = Error::Io(std::io::Error::other("disk full"));
        assert_eq!(classify(&io, &policy), ErrorClass::Fatal);
        assert_eq!(classify(&Error::Timeout(500), &policy), ErrorClass::Transient);

        let strict = FallbackPolicy {
            unclassified_is_transient: false,
            ..FallbackPolicy::default()
        };
        assert_eq!(classify(&Error::Timeout(500), &strict), ErrorClass::Fatal);
    }

    #[test]
    fn test_unbounded_wait_values_do_not_panic() {
        let truncation = TruncationSettings::default();
        let failed = Outcome::Failed { status: Some(503) };

        let no_cap = FallbackPolicy {
            max_total_wait_sec: Some(f64::INFINITY),
            ..FallbackPolicy::default()
        };
        assert_eq!(
            decide(failed, &no_cap, &truncation, &state()),
            NextAction::RetrySame {
                delay: Duration::from_secs(1)
            }
        );

        let huge_backoff = FallbackPolicy {
            backoff_sec: 1e300,
            max_total_wait_sec: Some(30.0),
            ..FallbackPolicy::default()
        };
        let s = AttemptState {
            total_attempts: 1,
            total_wait: Duration::from_secs(5),
            ..AttemptState::default()
        };
        assert_eq!(
            decide(failed, &huge_backoff, &truncation, &s),
            NextAction::StopChain
        );
    }
}
