//! Descents from the sentinel.
//!
//! Searches read child pointers with plain atomic loads and never validate:
//! nodes are immutable, so every path a search follows is one that existed
//! at some point, and the LLX that follows in an update catches staleness.

#![allow(clippy::redundant_pub_crate)]

use std::ptr;

use seize::LocalGuard;

use super::{BSlackTree, node_ref};
use crate::compare::KeyComparator;
use crate::node::Node;

/// Where a descent stopped: leaf (or target) `l`, its parent `p` and
/// grandparent `gp`, with the child slots that lead to them.
pub(crate) struct Cursor<K, V> {
    /// Null when `p` is the sentinel.
    pub(crate) gp: *mut Node<K, V>,
    pub(crate) p: *mut Node<K, V>,
    pub(crate) l: *mut Node<K, V>,
    /// Slot of `gp` holding `p`. Meaningless when `gp` is null.
    pub(crate) ix_to_p: usize,
    /// Slot of `p` holding `l`.
    pub(crate) ix_to_l: usize,
}

impl<K, V> Cursor<K, V> {
    /// Move one level down, towards `key`. `l` must be internal.
    pub(crate) fn step<C>(&mut self, key: &K, cmp: &C, guard: &LocalGuard<'_>)
    where
        C: KeyComparator<K>,
    {
        // SAFETY: `l` was loaded from the tree under `guard`.
        let l = unsafe { node_ref(self.l, guard) };
        self.ix_to_p = self.ix_to_l;
        self.ix_to_l = l.child_index(key, cmp);
        self.gp = self.p;
        self.p = self.l;
        self.l = l.child(self.ix_to_l);
    }
}

impl<K, V, C> BSlackTree<K, V, C>
where
    K: Clone,
    C: KeyComparator<K>,
{
    /// Leaf whose range contains `key`.
    #[inline]
    pub(crate) fn find_leaf<'g>(&self, key: &K, guard: &'g LocalGuard<'_>) -> &'g Node<K, V> {
        // SAFETY: the sentinel lives as long as the tree.
        let mut node = unsafe { node_ref(self.root_ptr(), guard) }.child(0);
        loop {
            // SAFETY: loaded from a reachable node under `guard`.
            let n = unsafe { node_ref(node, guard) };
            if n.is_leaf() {
                return n;
            }
            node = n.child(n.child_index(key, self.comparator()));
        }
    }

    /// Descend to the leaf for `key`, remembering the last two ancestors.
    #[inline]
    pub(crate) fn search(&self, key: &K, guard: &LocalGuard<'_>) -> Cursor<K, V> {
        self.descend(key, ptr::null_mut(), guard)
    }

    /// Descend towards `key`, stopping early at `target`. Returns `None` if
    /// the search reached a leaf without meeting `target`, which means
    /// `target` is no longer in the tree.
    #[inline]
    pub(crate) fn locate(
        &self,
        target: *mut Node<K, V>,
        key: &K,
        guard: &LocalGuard<'_>,
    ) -> Option<Cursor<K, V>> {
        let cursor = self.descend(key, target, guard);
        (cursor.l == target).then_some(cursor)
    }

    fn descend(&self, key: &K, stop_at: *mut Node<K, V>, guard: &LocalGuard<'_>) -> Cursor<K, V> {
        let root = self.root_ptr();
        // SAFETY: the sentinel lives as long as the tree.
        let first = unsafe { node_ref(root, guard) }.child(0);
        let mut cursor = Cursor {
            gp: ptr::null_mut(),
            p: root,
            l: first,
            ix_to_p: 0,
            ix_to_l: 0,
        };

        // SAFETY: every `l` is loaded from a reachable node under `guard`.
        while cursor.l != stop_at && !unsafe { node_ref(cursor.l, guard) }.is_leaf() {
            cursor.step(key, self.comparator(), guard);
        }
        cursor
    }
}
