//! Content-addressed response cache
//!
//! Entries are keyed by [`TaskId`], the SHA-256 of the canonical JSON of the
//! task name, the messages and the semantic options. Transport options
//! (`max_tokens`, routing key, timeout) never reach the key, so a replay with
//! a different token cap still hits.
//!
//! # Module Structure
//!
//! - `key`: TaskID computation
//! - `entry`: On-disk entry format
//! - `store`: Sharded directory store with atomic writes

mod entry;
mod key;
mod store;


pub use entry::{CacheEntry, Provenance, SCHEMA_VERSION};
pub use key::TaskId;
pub use store::{CacheStats, ContentCache, BUILTIN_EXCLUDED_TASKS};
