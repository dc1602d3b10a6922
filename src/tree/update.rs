//! Insert, replace, overflow and delete.
//!
//! Each update follows the same template: search to the leaf `l`, LLX its
//! parent `p`, build a replacement for `l` and SCX it into `p`. On conflict
//! the whole attempt restarts from the sentinel.

#![allow(clippy::redundant_pub_crate)]

use std::sync::Arc;

use seize::{Guard, LocalGuard};

use super::{BSlackTree, node_ref};
use crate::compare::KeyComparator;
use crate::ksearch;
use crate::node::Node;
use crate::reclaim::reclaim_node_boxed;
use crate::scx::{Llx, ScxRequest, llx, scx};
use crate::tracing_helpers::{debug_log, trace_log};

// ============================================================================
//  Fresh
// ============================================================================

/// Nodes allocated for one SCX attempt.
///
/// If the attempt fails they were never reachable and are retired again.
pub(crate) struct Fresh<K, V> {
    nodes: Vec<*mut Node<K, V>>,
}

impl<K, V> Fresh<K, V> {
    pub(crate) const fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Take ownership of `node` until the attempt resolves.
    pub(crate) fn add(&mut self, node: Box<Node<K, V>>) -> *mut Node<K, V> {
        let ptr = Box::into_raw(node);
        self.nodes.push(ptr);
        ptr
    }

    /// Retire every node of a failed attempt.
    ///
    /// # Safety
    ///
    /// The attempt must have failed, so none of the nodes were published.
    pub(crate) unsafe fn discard(self, guard: &LocalGuard<'_>) {
        for node in self.nodes {
            // SAFETY: never published; a helper of the aborted SCX may still
            // hold the pointer, so go through the guard.
            unsafe { guard.defer_retire(node, reclaim_node_boxed) };
        }
    }
}

impl<K, V, C> BSlackTree<K, V, C>
where
    K: Clone,
    C: KeyComparator<K>,
{
    /// Run one SCX over `request`, discarding `fresh` if it fails.
    pub(crate) fn try_scx(
        &self,
        request: ScxRequest<K, V>,
        fresh: Fresh<K, V>,
        guard: &LocalGuard<'_>,
    ) -> bool {
        // SAFETY: callers pass nodes read under `guard` and priors from LLXs
        // taken under it.
        if unsafe { scx(self.next_seq(), request, guard) } {
            return true;
        }
        // SAFETY: the attempt failed.
        unsafe { fresh.discard(guard) };
        false
    }

    // ========================================================================
    //  Put
    // ========================================================================

    /// Insert `key`, or replace its value when `replace` is set.
    ///
    /// Returns the value that was present before, if any. Without `replace`
    /// a present key is left untouched and its value returned.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(replace = replace)))]
    pub(crate) fn put_impl(
        &self,
        key: K,
        value: Arc<V>,
        replace: bool,
        guard: &LocalGuard<'_>,
    ) -> Option<Arc<V>> {
        let capacity = self.config().capacity();

        loop {
            let cursor = self.search(&key, guard);
            // SAFETY: both were loaded from the tree under `guard`.
            let (p, l) = unsafe { (node_ref(cursor.p, guard), node_ref(cursor.l, guard)) };

            let keys = l.keys();
            let values = l.values();
            let found = ksearch::lower_bound(keys, &key, self.comparator());

            if let (false, Ok(i)) = (replace, found) {
                return Some(Arc::clone(&values[i]));
            }

            // SAFETY: `p` is reachable under `guard`.
            let Llx::Linked(p_op) = (unsafe { llx(cursor.p, None, guard) }) else {
                trace_log!("put: LLX(p) failed, retrying");
                continue;
            };
            if p.child(cursor.ix_to_l) != cursor.l {
                trace_log!("put: leaf moved, retrying");
                continue;
            }

            let mut fresh = Fresh::new();

            match found {
                Ok(i) => {
                    // Replace: same keys, one value swapped.
                    let mut new_values = values.to_vec();
                    let old = std::mem::replace(&mut new_values[i], Arc::clone(&value));
                    let new_leaf = fresh.add(Node::leaf(
                        keys.to_vec(),
                        new_values,
                        l.search_key().cloned(),
                        self.dummy_ptr(),
                    ));

                    let request = ScxRequest {
                        nodes: vec![cursor.p, cursor.l],
                        priors: vec![p_op],
                        replacement: new_leaf,
                        child_index: cursor.ix_to_l,
                    };
                    if self.try_scx(request, fresh, guard) {
                        return Some(old);
                    }
                }

                Err(pos) => {
                    let mut new_keys = Vec::with_capacity(keys.len() + 1);
                    new_keys.extend_from_slice(&keys[..pos]);
                    new_keys.push(key.clone());
                    new_keys.extend_from_slice(&keys[pos..]);

                    let mut new_values = Vec::with_capacity(values.len() + 1);
                    new_values.extend_from_slice(&values[..pos]);
                    new_values.push(Arc::clone(&value));
                    new_values.extend_from_slice(&values[pos..]);

                    if new_keys.len() <= capacity {
                        let search_key = l.search_key().cloned().or_else(|| new_keys.first().cloned());
                        let new_leaf = fresh.add(Node::leaf(
                            new_keys,
                            new_values,
                            search_key,
                            self.dummy_ptr(),
                        ));
                        let request = ScxRequest {
                            nodes: vec![cursor.p, cursor.l],
                            priors: vec![p_op],
                            replacement: new_leaf,
                            child_index: cursor.ix_to_l,
                        };
                        if self.try_scx(request, fresh, guard) {
                            return None;
                        }
                        continue;
                    }

                    // Overflow: split into two leaves under a new parent.
                    let left_len = new_keys.len() / 2;
                    let right_keys = new_keys.split_off(left_len);
                    let right_values = new_values.split_off(left_len);
                    let separator = right_keys[0].clone();

                    let left_search = new_keys.first().cloned();
                    let left = fresh.add(Node::leaf(
                        new_keys,
                        new_values,
                        left_search,
                        self.dummy_ptr(),
                    ));
                    let right = fresh.add(Node::leaf(
                        right_keys,
                        right_values,
                        Some(separator.clone()),
                        self.dummy_ptr(),
                    ));
                    // Directly under the sentinel the new node is the root,
                    // which never carries a weight violation.
                    let new_parent = fresh.add(Node::internal(
                        vec![separator.clone()],
                        vec![left, right],
                        cursor.p == self.root_ptr(),
                        Some(separator),
                        self.dummy_ptr(),
                    ));

                    let request = ScxRequest {
                        nodes: vec![cursor.p, cursor.l],
                        priors: vec![p_op],
                        replacement: new_parent,
                        child_index: cursor.ix_to_l,
                    };
                    if self.try_scx(request, fresh, guard) {
                        debug_log!(left_len, "overflow: leaf split");
                        self.fix_weight_violation(new_parent, guard);
                        self.fix_degree_or_slack_violation(cursor.p, guard);
                        return None;
                    }
                }
            }
        }
    }

    // ========================================================================
    //  Remove
    // ========================================================================

    /// Delete `key`, returning its value if it was present.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub(crate) fn remove_impl(&self, key: &K, guard: &LocalGuard<'_>) -> Option<Arc<V>> {
        loop {
            let cursor = self.search(key, guard);
            // SAFETY: both were loaded from the tree under `guard`.
            let (p, l) = unsafe { (node_ref(cursor.p, guard), node_ref(cursor.l, guard)) };

            let keys = l.keys();
            let values = l.values();
            let Ok(i) = ksearch::lower_bound(keys, key, self.comparator()) else {
                return None;
            };

            // SAFETY: `p` is reachable under `guard`.
            let Llx::Linked(p_op) = (unsafe { llx(cursor.p, None, guard) }) else {
                trace_log!("remove: LLX(p) failed, retrying");
                continue;
            };
            if p.child(cursor.ix_to_l) != cursor.l {
                trace_log!("remove: leaf moved, retrying");
                continue;
            }

            let mut new_keys = Vec::with_capacity(keys.len() - 1);
            new_keys.extend_from_slice(&keys[..i]);
            new_keys.extend_from_slice(&keys[i + 1..]);
            let mut new_values = Vec::with_capacity(values.len() - 1);
            new_values.extend_from_slice(&values[..i]);
            new_values.extend_from_slice(&values[i + 1..]);

            // The old first key still routes here even if it was the one removed.
            let mut fresh = Fresh::new();
            let new_leaf = fresh.add(Node::leaf(
                new_keys,
                new_values,
                keys.first().cloned(),
                self.dummy_ptr(),
            ));

            let request = ScxRequest {
                nodes: vec![cursor.p, cursor.l],
                priors: vec![p_op],
                replacement: new_leaf,
                child_index: cursor.ix_to_l,
            };
            if self.try_scx(request, fresh, guard) {
                let old = Arc::clone(&values[i]);
                self.fix_degree_or_slack_violation(cursor.p, guard);
                return Some(old);
            }
        }
    }
}
