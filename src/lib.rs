//! # `bslack`
//!
//! A lock-free concurrent ordered map based on the B-slack tree.
//!
//! A B-slack tree is a B-tree variant that tolerates a bounded amount of
//! unused space ("slack") among the children of each node. Every leaf sits
//! at the same depth, leaves hold up to `b` keys, and rebalancing only has
//! to repack a node's grandchildren when their combined slack grows too
//! large. This keeps nodes densely packed (average degree close to `b`)
//! while each rebalancing step touches only a handful of nodes.
//!
//! ## Concurrency
//!
//! Nodes are immutable once published. Every update builds new nodes off to
//! the side and installs them with one SCX (store-conditional over several
//! nodes) built from LLX (load-link) snapshots and single-word CAS:
//!
//! | Operation | Progress |
//! |-----------|----------|
//! | `get`, `contains_key` | Wait-free descent, no writes to shared memory |
//! | `put`, `put_if_absent`, `remove` | Lock-free: retry on conflict, helping in-flight SCXs |
//! | Rebalancing | Performed by the updater that created the violation |
//!
//! Unlinked nodes and finished descriptors are reclaimed with epoch-based
//! reclamation ([`seize`]).
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//!
//! use bslack::{BSlackTree, Config};
//!
//! let tree = Arc::new(BSlackTree::<u64, u64>::with_config(Config::new(8).unwrap()));
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|t| {
//!         let tree = Arc::clone(&tree);
//!         thread::spawn(move || {
//!             for k in (t..400).step_by(4) {
//!                 tree.put(k, k * 2);
//!             }
//!         })
//!     })
//!     .collect();
//! for h in handles {
//!     h.join().unwrap();
//! }
//!
//! assert_eq!(tree.sequential_size(), 400);
//! assert_eq!(tree.get(&21).as_deref(), Some(&42));
//! tree.validate().unwrap();
//! ```
//!
//! ## Values
//!
//! Values are stored as `Arc<V>`: replacing or removing a key never has to
//! clone the value, and readers keep the value they got alive on their own.
//!
//! ## Features
//!
//! - `tracing`: structured logging of retries and rebalancing steps.
//! - `mimalloc`: use mimalloc as the global allocator of the stress binary.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::inline_always)]

pub mod compare;
pub mod config;
pub mod error;
mod ksearch;
mod node;
pub mod ordering;
mod reclaim;
mod scx;
mod tracing_helpers;
pub mod tree;

pub use compare::{KeyComparator, Natural};
pub use config::Config;
pub use error::{ConfigError, InvariantViolation};
pub use tree::{BSlackTree, NodeSnapshot, TreeStats};

/// Install a console `tracing` subscriber filtered by `RUST_LOG`
/// (default `info`).
///
/// Does nothing if a global subscriber is already set.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .compact()
        .try_init();
}

/// Without the `tracing` feature there is nothing to install.
#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}
