//! Keyed query cache with staleness tracking and optimistic writes.
//!
//! This module provides the coordination machinery for client-side data
//! synchronization:
//! - Structural query keys with prefix-based invalidation
//! - Per-entry state machine (idle/loading/success/error) with stale and
//!   eviction windows
//! - Deduplicated fetching: concurrent callers attach to one in-flight
//!   request
//! - Generation-tracked completions so superseded fetches never clobber
//!   newer results

mod client;
mod entry;
mod key;

pub use client::{QueryClient, QueryHandle};
pub use entry::{QueryOptions, QuerySnapshot, QueryStatus};
pub use key::{QueryKey, Segment};
