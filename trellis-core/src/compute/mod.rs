//! Hashing, Caching and Evaluation
//!
//! Computed plug values are addressed by content: a [`PlugHash`] digests
//! everything an output depends on, and the [`ValueCache`] maps hashes to
//! shared immutable values. Evaluation (`Graph::hash`, `Graph::value`) lives
//! in the engine module as inherent methods on the graph.

mod cache;
mod context;
mod engine;
mod hash;

pub use cache::{CacheStats, ValueCache};
pub use context::Context;
pub use hash::{PlugHash, PlugHasher};
