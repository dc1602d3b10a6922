//! Tree nodes.
//!
//! A node's payload (keys, values, children pointers, weight, search key) is
//! fixed when it is built. Only the coordination fields change after the node
//! is published:
//!
//! - `op`: the descriptor of the last SCX that froze (or tried to freeze) it.
//! - `finalized`: set once, by the SCX that unlinks it.
//! - `children[i]`: swapped by a committing SCX whose `nodes[0]` is this node.
//! - `refs`: lifetime accounting (see below).
//!
//! # Reference counts
//!
//! A node carries one *link* reference while it is reachable from the tree,
//! plus one *pin* for every descriptor that names it and has not completed.
//! The thread that drops the count to zero releases the node's reference to
//! its current descriptor and retires the node through the guard.

#![allow(clippy::redundant_pub_crate)]

use std::fmt as StdFmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, fence};

use crate::compare::KeyComparator;
use crate::ksearch;
use crate::ordering::{READ_ORD, REF_ACQUIRE, REF_RELEASE, RELAXED, SCX_ORD};
use crate::scx::ScxRecord;

// ============================================================================
//  NodeKind
// ============================================================================

/// Payload of a node. A node is a leaf iff it has no children array.
pub(crate) enum NodeKind<K, V> {
    /// Sorted keys with a parallel value array.
    Leaf {
        keys: Box<[K]>,
        values: Box<[Arc<V>]>,
    },

    /// `children.len() - 1` sorted separator keys.
    ///
    /// Keys `< keys[0]` route to `children[0]`, keys in
    /// `[keys[i - 1], keys[i])` to `children[i]`.
    Internal {
        keys: Box<[K]>,
        children: Box<[AtomicPtr<Node<K, V>>]>,
    },
}

// ============================================================================
//  Node
// ============================================================================

/// A B-slack tree node.
pub(crate) struct Node<K, V> {
    op: AtomicPtr<ScxRecord<K, V>>,
    finalized: AtomicBool,
    refs: AtomicUsize,

    /// `false` only for nodes created by Overflow or Split that still wait
    /// for an Absorb or Split above them.
    weight: bool,

    /// A key that routes a search to this node for as long as it is
    /// reachable. `None` only for the empty leaf a tree starts with.
    search_key: Option<K>,

    kind: NodeKind<K, V>,
}

impl<K, V> Node<K, V> {
    /// Build a leaf. Leaves always carry `weight == true`.
    pub(crate) fn leaf(
        keys: Vec<K>,
        values: Vec<Arc<V>>,
        search_key: Option<K>,
        op: *mut ScxRecord<K, V>,
    ) -> Box<Self> {
        debug_assert_eq!(keys.len(), values.len());
        Box::new(Self {
            op: AtomicPtr::new(op),
            finalized: AtomicBool::new(false),
            refs: AtomicUsize::new(1),
            weight: true,
            search_key,
            kind: NodeKind::Leaf {
                keys: keys.into_boxed_slice(),
                values: values.into_boxed_slice(),
            },
        })
    }

    /// Build an internal node over existing children.
    pub(crate) fn internal(
        keys: Vec<K>,
        children: Vec<*mut Self>,
        weight: bool,
        search_key: Option<K>,
        op: *mut ScxRecord<K, V>,
    ) -> Box<Self> {
        debug_assert_eq!(keys.len() + 1, children.len());
        Box::new(Self {
            op: AtomicPtr::new(op),
            finalized: AtomicBool::new(false),
            refs: AtomicUsize::new(1),
            weight,
            search_key,
            kind: NodeKind::Internal {
                keys: keys.into_boxed_slice(),
                children: children.into_iter().map(AtomicPtr::new).collect(),
            },
        })
    }

    // ========================================================================
    //  Payload
    // ========================================================================

    #[inline(always)]
    pub(crate) const fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    #[inline(always)]
    pub(crate) const fn weight(&self) -> bool {
        self.weight
    }

    #[inline(always)]
    pub(crate) const fn search_key(&self) -> Option<&K> {
        self.search_key.as_ref()
    }

    /// Keys of a leaf or separators of an internal node.
    #[inline(always)]
    pub(crate) fn keys(&self) -> &[K] {
        match &self.kind {
            NodeKind::Leaf { keys, .. } | NodeKind::Internal { keys, .. } => keys,
        }
    }

    /// Leaf values; empty for internal nodes.
    #[inline(always)]
    pub(crate) fn values(&self) -> &[Arc<V>] {
        match &self.kind {
            NodeKind::Leaf { values, .. } => values,
            NodeKind::Internal { .. } => &[],
        }
    }

    /// Child slots; empty for leaves.
    #[inline(always)]
    pub(crate) fn children(&self) -> &[AtomicPtr<Self>] {
        match &self.kind {
            NodeKind::Leaf { .. } => &[],
            NodeKind::Internal { children, .. } => children,
        }
    }

    /// Number of children of an internal node.
    #[inline(always)]
    pub(crate) fn child_count(&self) -> usize {
        self.children().len()
    }

    /// Occupancy: key count for a leaf, child count for an internal node.
    #[inline]
    pub(crate) fn degree(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf { keys, .. } => keys.len(),
            NodeKind::Internal { children, .. } => children.len(),
        }
    }

    /// Load child `i`.
    ///
    /// # Panics
    ///
    /// If `i` is out of range (internal bug: callers index with
    /// [`Self::child_index`] or a recorded index of the same node).
    #[inline(always)]
    pub(crate) fn child(&self, i: usize) -> *mut Self {
        self.children()[i].load(READ_ORD)
    }

    /// Child slot whose range contains `key`.
    #[inline]
    pub(crate) fn child_index<C>(&self, key: &K, cmp: &C) -> usize
    where
        C: KeyComparator<K> + ?Sized,
    {
        ksearch::upper_bound(self.keys(), key, cmp)
    }

    /// Copy the current child pointers into `out`.
    pub(crate) fn snapshot_children(&self, out: &mut Vec<*mut Self>) {
        out.clear();
        out.extend(self.children().iter().map(|slot| slot.load(SCX_ORD)));
    }

    // ========================================================================
    //  Coordination Fields
    // ========================================================================

    #[inline(always)]
    pub(crate) fn op(&self) -> *mut ScxRecord<K, V> {
        self.op.load(SCX_ORD)
    }

    /// Freeze CAS on the descriptor slot.
    #[inline]
    pub(crate) fn cas_op(
        &self,
        expected: *mut ScxRecord<K, V>,
        new: *mut ScxRecord<K, V>,
    ) -> bool {
        self.op
            .compare_exchange(expected, new, SCX_ORD, SCX_ORD)
            .is_ok()
    }

    #[inline(always)]
    pub(crate) fn is_finalized(&self) -> bool {
        self.finalized.load(SCX_ORD)
    }

    #[inline]
    pub(crate) fn mark_finalized(&self) {
        self.finalized.store(true, SCX_ORD);
    }

    /// Swap child `index` from `expected` to `new`.
    #[inline]
    pub(crate) fn cas_child(&self, index: usize, expected: *mut Self, new: *mut Self) -> bool {
        self.children()
            .get(index)
            .is_some_and(|slot| slot.compare_exchange(expected, new, SCX_ORD, SCX_ORD).is_ok())
    }

    // ========================================================================
    //  Reference Counting
    // ========================================================================

    /// Take a reference unless the count already reached zero.
    #[inline]
    pub(crate) fn try_acquire(&self) -> bool {
        let mut current = self.refs.load(RELAXED);
        loop {
            if current == 0 {
                return false;
            }
            match self
                .refs
                .compare_exchange_weak(current, current + 1, REF_ACQUIRE, RELAXED)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Drop a reference. Returns `true` for the caller that dropped the last one.
    #[inline]
    #[must_use]
    pub(crate) fn release(&self) -> bool {
        if self.refs.fetch_sub(1, REF_RELEASE) == 1 {
            fence(REF_ACQUIRE);
            return true;
        }
        false
    }

    #[cfg(test)]
    pub(crate) fn ref_count(&self) -> usize {
        self.refs.load(RELAXED)
    }
}

impl<K: StdFmt::Debug, V> StdFmt::Debug for Node<K, V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Node")
            .field("leaf", &self.is_leaf())
            .field("weight", &self.weight)
            .field("keys", &self.keys())
            .field("search_key", &self.search_key)
            .field("finalized", &self.is_finalized())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::Natural;
    use std::ptr;

    fn leaf(keys: &[u64]) -> Box<Node<u64, u64>> {
        Node::leaf(
            keys.to_vec(),
            keys.iter().map(|k| Arc::new(k * 10)).collect(),
            keys.first().copied(),
            ptr::null_mut(),
        )
    }

    #[test]
    fn test_leaf_accessors() {
        let node = leaf(&[1, 2, 3]);
        assert!(node.is_leaf());
        assert!(node.weight());
        assert_eq!(node.keys(), &[1, 2, 3]);
        assert_eq!(*node.values()[2], 30);
        assert_eq!(node.degree(), 3);
        assert_eq!(node.child_count(), 0);
        assert_eq!(node.search_key(), Some(&1));
    }

    #[test]
    fn test_internal_routing() {
        let left = Box::into_raw(leaf(&[1, 2]));
        let right = Box::into_raw(leaf(&[5, 6]));
        let node: Box<Node<u64, u64>> =
            Node::internal(vec![5], vec![left, right], false, Some(5), ptr::null_mut());

        assert!(!node.is_leaf());
        assert!(!node.weight());
        assert_eq!(node.degree(), 2);
        assert_eq!(node.child_index(&4, &Natural), 0);
        assert_eq!(node.child_index(&5, &Natural), 1);
        assert_eq!(node.child(1), right);

        let mut snapshot = Vec::new();
        node.snapshot_children(&mut snapshot);
        assert_eq!(snapshot, vec![left, right]);

        assert!(node.cas_child(0, left, right));
        assert!(!node.cas_child(0, left, right));
        assert!(!node.cas_child(7, right, left));

        // SAFETY: both were created with Box::into_raw above and are unshared.
        unsafe {
            drop(Box::from_raw(left));
            drop(Box::from_raw(right));
        }
    }

    #[test]
    fn test_ref_count() {
        let node = leaf(&[]);
        assert_eq!(node.ref_count(), 1);
        assert!(node.try_acquire());
        assert!(!node.release());
        assert!(node.release());
        assert!(!node.try_acquire());
    }

    #[test]
    fn test_finalize_is_sticky() {
        let node = leaf(&[1]);
        assert!(!node.is_finalized());
        node.mark_finalized();
        node.mark_finalized();
        assert!(node.is_finalized());
    }
}
