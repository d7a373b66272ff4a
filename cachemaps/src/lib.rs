//! Associative containers for caching and ordered indexing.
//!
//! - [`LruHashMap`]: single-threaded, holds at most a fixed number of
//!   entries and evicts the least recently used one on overflow.
//! - [`ConcurrentBoundedMap`]: shared between threads without external
//!   locking. Reads never lock; writes combine compare-and-swap with short
//!   per-bucket critical sections.
//! - [`SplayMap`]: single-threaded ordered map with full navigation, kept
//!   in shape by splaying every accessed node to the root.
//!
//! The single-threaded containers do no synchronisation of their own.

mod arena;
pub mod error;
pub mod map;
#[cfg(test)]
mod test_util;
pub mod tree;

pub use error::{Error, Result};
pub use map::{ConcurrentBoundedMap, LruHashMap, Map};
pub use tree::{Comparator, SplayMap};
