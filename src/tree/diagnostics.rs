//! Sequential diagnostics: statistics, structural validation and snapshots.
//!
//! Everything here walks the tree under a single guard without any
//! coordination with writers. Results are exact only at a quiescent state;
//! during concurrent updates they describe some mix of old and new nodes.

use std::cmp::Ordering;
use std::fmt as StdFmt;
use std::fmt::Write as _;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::AtomicPtr;

use seize::LocalGuard;

use super::{BSlackTree, node_ref};
use crate::compare::KeyComparator;
use crate::error::InvariantViolation;
use crate::node::Node;

// ============================================================================
//  TreeStats
// ============================================================================

/// Shape statistics gathered by [`BSlackTree::stats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeStats {
    /// Number of keys.
    pub size: usize,
    /// Number of node levels below the sentinel (1 for a lone leaf).
    pub height: usize,
    /// Number of leaves.
    pub leaves: usize,
    /// Number of internal nodes, excluding the sentinel.
    pub internals: usize,
    /// Sum over all keys of the depth of the leaf holding them.
    pub key_depth_sum: usize,
    /// `key_depth_sum / size`, or 0 for an empty tree.
    pub average_key_depth: f64,
    /// Mean occupancy: keys per leaf and children per internal node.
    pub average_degree: f64,
    /// Approximate heap bytes spent per key, or 0 for an empty tree.
    pub space_per_key: f64,
}

impl TreeStats {
    /// Total number of nodes, excluding the sentinel.
    #[must_use]
    pub const fn nodes(&self) -> usize {
        self.leaves + self.internals
    }
}

impl StdFmt::Display for TreeStats {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(
            f,
            "size={} height={} leaves={} internals={} avg_depth={:.2} avg_degree={:.2} bytes_per_key={:.1}",
            self.size,
            self.height,
            self.leaves,
            self.internals,
            self.average_key_depth,
            self.average_degree,
            self.space_per_key,
        )
    }
}

#[derive(Default)]
struct Tally {
    size: usize,
    height: usize,
    leaves: usize,
    internals: usize,
    key_depth_sum: usize,
    degree_sum: usize,
    bytes: usize,
}

// ============================================================================
//  NodeSnapshot
// ============================================================================

/// An owned copy of a subtree's shape and keys, taken by
/// [`BSlackTree::snapshot`].
///
/// `Display` prints a compact one-line form: each node is
/// `w<weight><L|I>[keys]`, with an internal node's children following in
/// parentheses, e.g. `w1I[3](w1L[1,2],w1L[3,4])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot<K> {
    weight: bool,
    keys: Vec<K>,
    /// `None` for a leaf.
    children: Option<Vec<NodeSnapshot<K>>>,
}

impl<K> NodeSnapshot<K> {
    /// Whether this node is a leaf.
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Weight bit of the node.
    #[must_use]
    pub const fn weight(&self) -> bool {
        self.weight
    }

    /// Keys of the node (separators for an internal node).
    #[must_use]
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Children of an internal node; empty for a leaf.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Largest key count over all leaves.
    #[must_use]
    pub fn max_leaf_keys(&self) -> usize {
        match &self.children {
            None => self.keys.len(),
            Some(children) => children.iter().map(Self::max_leaf_keys).max().unwrap_or(0),
        }
    }

    /// All leaf keys, left to right.
    #[must_use]
    pub fn leaf_keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        let mut out = Vec::new();
        self.collect_leaf_keys(&mut out);
        out
    }

    fn collect_leaf_keys(&self, out: &mut Vec<K>)
    where
        K: Clone,
    {
        match &self.children {
            None => out.extend_from_slice(&self.keys),
            Some(children) => {
                for child in children {
                    child.collect_leaf_keys(out);
                }
            }
        }
    }

    /// Render the subtree in Graphviz `dot` syntax.
    ///
    /// Leaves are boxes, internal nodes ellipses, and nodes with a weight
    /// violation are drawn red.
    #[must_use]
    pub fn to_dot(&self) -> String
    where
        K: StdFmt::Display,
    {
        let mut out = String::from("digraph bslack {\n    node [fontname=\"monospace\"];\n");
        let mut next_id = 0;
        self.write_dot(&mut out, &mut next_id);
        out.push_str("}\n");
        out
    }

    fn write_dot(&self, out: &mut String, next_id: &mut usize) -> usize
    where
        K: StdFmt::Display,
    {
        let id = *next_id;
        *next_id += 1;

        let shape = if self.is_leaf() { "box" } else { "ellipse" };
        let color = if self.weight { "black" } else { "red" };
        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            "    n{id} [label=\"{}\", shape={shape}, color={color}];",
            KeyList(&self.keys)
        );
        for child in self.children() {
            let child_id = child.write_dot(out, next_id);
            let _ = writeln!(out, "    n{id} -> n{child_id};");
        }
        id
    }
}

impl<K: StdFmt::Display> StdFmt::Display for NodeSnapshot<K> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        let kind = if self.is_leaf() { 'L' } else { 'I' };
        write!(f, "w{}{kind}[{}]", u8::from(self.weight), KeyList(&self.keys))?;
        if let Some(children) = &self.children {
            f.write_str("(")?;
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{child}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// Comma-separated keys.
struct KeyList<'a, K>(&'a [K]);

impl<K: StdFmt::Display> StdFmt::Display for KeyList<'_, K> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}

// ============================================================================
//  BSlackTree Diagnostics
// ============================================================================

impl<K, V, C> BSlackTree<K, V, C>
where
    K: Clone,
    C: KeyComparator<K>,
{
    /// First real node: the sentinel's only child.
    fn top<'g>(&self, guard: &'g LocalGuard<'_>) -> &'g Node<K, V> {
        // SAFETY: the sentinel lives as long as the tree, and its child was
        // loaded under `guard`.
        unsafe {
            let sentinel = node_ref(self.root_ptr(), guard);
            node_ref(sentinel.child(0), guard)
        }
    }

    /// Number of keys, counted by a full traversal.
    ///
    /// Exact only while no update is running.
    #[must_use]
    pub fn sequential_size(&self) -> usize {
        self.stats().size
    }

    /// Number of node levels below the sentinel. A tree that is a single
    /// leaf has height 1.
    #[must_use]
    pub fn height(&self) -> usize {
        self.stats().height
    }

    /// Number of leaves.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.stats().leaves
    }

    /// Number of internal nodes, excluding the sentinel.
    #[must_use]
    pub fn internal_count(&self) -> usize {
        self.stats().internals
    }

    /// Number of nodes, excluding the sentinel.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.stats().nodes()
    }

    /// Sum of the depths of all keys (the root is at depth 0).
    #[must_use]
    pub fn key_depth_sum(&self) -> usize {
        self.stats().key_depth_sum
    }

    /// Mean depth of a key, or 0 for an empty tree.
    #[must_use]
    pub fn average_key_depth(&self) -> f64 {
        self.stats().average_key_depth
    }

    /// Mean node occupancy.
    #[must_use]
    pub fn average_degree(&self) -> f64 {
        self.stats().average_degree
    }

    /// Approximate heap bytes per key.
    #[must_use]
    pub fn space_per_key(&self) -> f64 {
        self.stats().space_per_key
    }

    /// Gather all shape statistics in one traversal.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> TreeStats {
        let guard = self.guard();
        let mut tally = Tally::default();
        Self::tally(self.top(&guard), 0, &mut tally, &guard);

        let nodes = tally.leaves + tally.internals;
        let per_key = |total: usize| {
            if tally.size == 0 {
                0.0
            } else {
                total as f64 / tally.size as f64
            }
        };
        TreeStats {
            size: tally.size,
            height: tally.height,
            leaves: tally.leaves,
            internals: tally.internals,
            key_depth_sum: tally.key_depth_sum,
            average_key_depth: per_key(tally.key_depth_sum),
            average_degree: tally.degree_sum as f64 / nodes as f64,
            space_per_key: per_key(tally.bytes),
        }
    }

    fn tally(node: &Node<K, V>, depth: usize, tally: &mut Tally, guard: &LocalGuard<'_>) {
        let keys = node.keys().len();
        tally.height = tally.height.max(depth + 1);
        tally.degree_sum += node.degree();
        tally.bytes += mem::size_of::<Node<K, V>>()
            + keys * mem::size_of::<K>()
            + node.values().len() * mem::size_of::<Arc<V>>()
            + node.child_count() * mem::size_of::<AtomicPtr<Node<K, V>>>();

        if node.is_leaf() {
            tally.leaves += 1;
            tally.size += keys;
            tally.key_depth_sum += keys * depth;
            return;
        }

        tally.internals += 1;
        for slot in 0..node.child_count() {
            // SAFETY: loaded from a reachable node under `guard`.
            let child = unsafe { node_ref(node.child(slot), guard) };
            Self::tally(child, depth + 1, tally, guard);
        }
    }

    // ========================================================================
    //  Validation
    // ========================================================================

    /// Check every structural invariant of a quiescent tree.
    ///
    /// # Errors
    ///
    /// The first violation found, in a left-to-right depth-first walk.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        let guard = self.guard();
        let mut leaf_depth = None;
        self.validate_node(self.top(&guard), 0, None, None, &mut leaf_depth, &guard)
    }

    fn validate_node(
        &self,
        node: &Node<K, V>,
        depth: usize,
        low: Option<&K>,
        high: Option<&K>,
        leaf_depth: &mut Option<usize>,
        guard: &LocalGuard<'_>,
    ) -> Result<(), InvariantViolation> {
        let cmp = self.comparator();
        let keys = node.keys();

        if !node.weight() {
            return Err(InvariantViolation::WeightViolation { depth });
        }
        if keys.windows(2).any(|w| cmp.compare(&w[0], &w[1]) != Ordering::Less) {
            return Err(InvariantViolation::UnsortedKeys { depth });
        }
        let in_range = |key: &K| {
            low.is_none_or(|lo| cmp.compare(lo, key) != Ordering::Greater)
                && high.is_none_or(|hi| cmp.compare(key, hi) == Ordering::Less)
        };
        if !keys.iter().all(in_range) {
            return Err(InvariantViolation::KeyOutOfRange { depth });
        }

        if node.is_leaf() {
            let capacity = self.config().capacity();
            if keys.len() > capacity {
                return Err(InvariantViolation::LeafOverCapacity {
                    depth,
                    keys: keys.len(),
                    capacity,
                });
            }
            if node.values().len() != keys.len() {
                return Err(InvariantViolation::LeafValueMismatch {
                    depth,
                    keys: keys.len(),
                    values: node.values().len(),
                });
            }
            return match *leaf_depth {
                None => {
                    *leaf_depth = Some(depth);
                    Ok(())
                }
                Some(first) if first != depth => Err(InvariantViolation::UnbalancedLeaves {
                    first,
                    other: depth,
                }),
                Some(_) => Ok(()),
            };
        }

        let children = node.child_count();
        if children < 2 {
            return Err(InvariantViolation::TooFewChildren { depth, children });
        }
        if keys.len() + 1 != children {
            return Err(InvariantViolation::KeyCountMismatch {
                depth,
                keys: keys.len(),
                children,
            });
        }

        let mut leaf_children = 0;
        let mut occupancy = 0;
        for slot in 0..children {
            // SAFETY: loaded from a reachable node under `guard`.
            let child = unsafe { node_ref(node.child(slot), guard) };
            if child.is_leaf() {
                leaf_children += 1;
            }
            occupancy += child.degree();
        }
        if leaf_children != 0 && leaf_children != children {
            return Err(InvariantViolation::MixedChildren { depth });
        }
        let slack = (children * self.config().capacity()).saturating_sub(occupancy);
        let limit = self.config().slack_limit(children);
        if slack >= limit {
            return Err(InvariantViolation::SlackViolation { depth, slack, limit });
        }

        for slot in 0..children {
            // SAFETY: as above.
            let child = unsafe { node_ref(node.child(slot), guard) };
            let child_low = if slot == 0 { low } else { Some(&keys[slot - 1]) };
            let child_high = keys.get(slot).or(high);
            self.validate_node(child, depth + 1, child_low, child_high, leaf_depth, guard)?;
        }
        Ok(())
    }

    // ========================================================================
    //  Snapshot
    // ========================================================================

    /// Copy the current shape and keys of the tree, sentinel excluded.
    #[must_use]
    pub fn snapshot(&self) -> NodeSnapshot<K> {
        let guard = self.guard();
        Self::snapshot_node(self.top(&guard), &guard)
    }

    fn snapshot_node(node: &Node<K, V>, guard: &LocalGuard<'_>) -> NodeSnapshot<K> {
        let children = (!node.is_leaf()).then(|| {
            (0..node.child_count())
                .map(|slot| {
                    // SAFETY: loaded from a reachable node under `guard`.
                    let child = unsafe { node_ref(node.child(slot), guard) };
                    Self::snapshot_node(child, guard)
                })
                .collect()
        });
        NodeSnapshot {
            weight: node.weight(),
            keys: node.keys().to_vec(),
            children,
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Fail fast in tests")]
mod tests {
    use super::*;
    use crate::config::Config;

    fn tree_with(keys: impl IntoIterator<Item = u32>) -> BSlackTree<u32, u32> {
        let tree = BSlackTree::with_config(Config::new(4).unwrap());
        for k in keys {
            tree.put(k, k);
        }
        tree
    }

    #[test]
    fn test_empty_stats() {
        let tree: BSlackTree<u32, u32> = BSlackTree::new();
        let stats = tree.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.height, 1);
        assert_eq!(stats.leaves, 1);
        assert_eq!(stats.internals, 0);
        assert!(stats.average_key_depth.abs() < f64::EPSILON);
        assert!(stats.space_per_key.abs() < f64::EPSILON);
    }

    #[test]
    fn test_single_leaf_display() {
        let tree = tree_with([3, 1, 2]);
        assert_eq!(tree.snapshot().to_string(), "w1L[1,2,3]");
    }

    #[test]
    fn test_split_display() {
        let tree = tree_with(1..=5);
        assert_eq!(tree.snapshot().to_string(), "w1I[3](w1L[1,2],w1L[3,4,5])");
        assert_eq!(tree.leaf_count(), 2);
        assert_eq!(tree.internal_count(), 1);
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.key_depth_sum(), 5);
    }

    #[test]
    fn test_stats_agree_with_accessors() {
        let tree = tree_with(0..100);
        let stats = tree.stats();
        assert_eq!(stats.size, tree.sequential_size());
        assert_eq!(stats.height, tree.height());
        assert!(stats.average_degree > 1.0);
        assert!(stats.space_per_key > 0.0);
        assert!(stats.to_string().starts_with("size=100 "));
    }

    #[test]
    fn test_leaf_keys_sorted() {
        let tree = tree_with((0..60).rev());
        let keys = tree.snapshot().leaf_keys();
        assert_eq!(keys, (0..60).collect::<Vec<_>>());
        assert!(tree.snapshot().max_leaf_keys() <= 4);
    }

    #[test]
    fn test_to_dot_shape() {
        let tree = tree_with(1..=5);
        let dot = tree.snapshot().to_dot();
        assert!(dot.starts_with("digraph bslack {"));
        assert!(dot.contains("n0 -> n1;"));
        assert!(dot.contains("n0 -> n2;"));
        assert!(dot.contains("label=\"3,4,5\", shape=box"));
    }

    #[test]
    fn test_snapshot_accessors() {
        let tree = tree_with(1..=5);
        let snap = tree.snapshot();
        assert!(!snap.is_leaf());
        assert!(snap.weight());
        assert_eq!(snap.keys(), &[3]);
        assert_eq!(snap.children().len(), 2);
        assert!(snap.children()[0].children().is_empty());
    }
}
