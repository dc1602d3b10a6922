//! Error types.
//!
//! Conflicts between concurrent operations never surface here: they are
//! retried internally. What remains is configuration rejection and the
//! structural checker's findings.

use thiserror::Error as ThisError;

/// A rejected [`Config`](crate::Config).
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ConfigError {
    /// Node capacity below what the rebalancer can keep balanced.
    #[error("node capacity {capacity} is below the minimum of {minimum}")]
    CapacityTooSmall {
        /// Requested capacity.
        capacity: usize,
        /// Smallest capacity accepted with the requested slack policy.
        minimum: usize,
    },

    /// An environment variable held a value that could not be parsed.
    #[error("environment variable {var} has invalid value {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value found.
        value: String,
    },
}

/// A structural invariant that does not hold.
///
/// Produced by [`BSlackTree::validate`](crate::BSlackTree::validate). Outside
/// of a bug this is never observed at a quiescent state.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum InvariantViolation {
    /// Two leaves sit at different depths.
    #[error("leaves at depths {first} and {other}")]
    UnbalancedLeaves {
        /// Depth of the first leaf found.
        first: usize,
        /// Depth of a leaf that disagrees.
        other: usize,
    },

    /// An internal node below the sentinel has fewer than two children.
    #[error("internal node at depth {depth} has {children} child(ren)")]
    TooFewChildren {
        /// Depth of the node.
        depth: usize,
        /// Number of children.
        children: usize,
    },

    /// An internal node's key count is not its child count minus one.
    #[error("internal node at depth {depth} has {keys} keys for {children} children")]
    KeyCountMismatch {
        /// Depth of the node.
        depth: usize,
        /// Number of keys.
        keys: usize,
        /// Number of children.
        children: usize,
    },

    /// A leaf holds more keys than the node capacity.
    #[error("leaf at depth {depth} holds {keys} keys, capacity is {capacity}")]
    LeafOverCapacity {
        /// Depth of the leaf.
        depth: usize,
        /// Number of keys.
        keys: usize,
        /// Configured capacity.
        capacity: usize,
    },

    /// A leaf's value array does not parallel its key array.
    #[error("leaf at depth {depth} has {keys} keys and {values} values")]
    LeafValueMismatch {
        /// Depth of the leaf.
        depth: usize,
        /// Number of keys.
        keys: usize,
        /// Number of values.
        values: usize,
    },

    /// A reachable node still carries `weight == false`.
    #[error("node at depth {depth} has a weight violation")]
    WeightViolation {
        /// Depth of the node.
        depth: usize,
    },

    /// An internal node has both leaf and internal children.
    #[error("internal node at depth {depth} mixes leaf and internal children")]
    MixedChildren {
        /// Depth of the node.
        depth: usize,
    },

    /// The children of an internal node carry too much spare capacity.
    #[error("internal node at depth {depth} has slack {slack}, limit is {limit}")]
    SlackViolation {
        /// Depth of the node.
        depth: usize,
        /// Total spare capacity across its children.
        slack: usize,
        /// First slack value that counts as a violation.
        limit: usize,
    },

    /// Keys inside a node are not strictly increasing.
    #[error("node at depth {depth} has unsorted or duplicate keys")]
    UnsortedKeys {
        /// Depth of the node.
        depth: usize,
    },

    /// A key lies outside the range its ancestors route to it.
    #[error("node at depth {depth} holds a key outside its separator range")]
    KeyOutOfRange {
        /// Depth of the node.
        depth: usize,
    },
}
