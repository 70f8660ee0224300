//! Router - candidate chains, failover and traffic split
//!
//! A call resolves its task to an ordered candidate chain, optionally
//! reorders it for the traffic split, checks the response cache, then walks
//! the chain. Each invocation's [`Outcome`] is fed to the pure [`decide`]
//! function, which picks the [`NextAction`]: accept, retry the same
//! candidate after a backoff, escalate the token cap once, advance, or stop.
//!
//! # Module Structure
//!
//! - `split`: Routing keys, buckets and candidate reordering
//! - `decision`: Outcome classification and retry decisions
//! - `failover`: Hook for exhausted chains
//! - `router_impl`: `Router` implementation

mod decision;
mod failover;
mod router_impl;
mod split;


pub use decision::{
    classify, decide, escalate_cap, AttemptState, NextAction, Outcome, DEFAULT_MAX_TOKENS,
};
#[cfg(test)]
pub use failover::MockFailoverHook;
pub use failover::{FailoverHook, FailureSummary};
pub use router_impl::Router;
pub use split::{apply_split, bucket_for, RoutingDecision, RoutingKey, RoutingKeySource};
