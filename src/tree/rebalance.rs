//! Rebalancing steps.
//!
//! Violations are created by updates and repaired before the update
//! returns:
//!
//! - **Weight** (`weight == false`): a node made by Overflow or Split sits
//!   one level too deep. Absorb merges it into its parent; Split does the
//!   same but the merged node is too large, so it is cut in two under a new
//!   parent, which may itself carry a weight violation one level up.
//! - **Degree** (one child) and **slack** (children too empty): Compress
//!   repacks the grandchildren of the top node evenly into as few nodes as
//!   possible. One-Child is the same step seen from the single child, and
//!   Root-Replace elides the top node when it is the root and one node
//!   remains.
//!
//! A fixup that finds its target finalized, or no longer reachable by its
//! search key, returns: whoever removed the node took over its violation.

#![allow(clippy::redundant_pub_crate)]

use std::sync::Arc;

use seize::LocalGuard;

use super::update::Fresh;
use super::{BSlackTree, node_ref};
use crate::compare::KeyComparator;
use crate::node::Node;
use crate::scx::{Llx, OpHandle, ScxRequest, llx};
use crate::tracing_helpers::{debug_log, trace_log, warn_log};

/// Sizes of `parts` chunks sharing `total` items as evenly as possible,
/// larger chunks first.
fn chunk_sizes(total: usize, parts: usize) -> impl Iterator<Item = usize> {
    let ceil = total.div_ceil(parts);
    let floor = total / parts;
    let with_ceil = total % parts;
    (0..parts).map(move |i| if i < with_ceil { ceil } else { floor })
}

impl<K, V, C> BSlackTree<K, V, C>
where
    K: Clone,
    C: KeyComparator<K>,
{
    // ========================================================================
    //  Weight Violations: Absorb / Split
    // ========================================================================

    /// Repair the weight violation at `viol`, if it is still in the tree.
    ///
    /// Returns `true` if this call performed a rebalancing step at `viol`.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub(crate) fn fix_weight_violation(&self, viol: *mut Node<K, V>, guard: &LocalGuard<'_>) -> bool {
        // SAFETY: `viol` was reachable (or just published) under `guard`.
        let v = unsafe { node_ref(viol, guard) };
        if v.weight() {
            return false;
        }
        // SAFETY: as above.
        if matches!(unsafe { llx(viol, None, guard) }, Llx::Finalized) {
            trace_log!("weight: target finalized, handing off");
            return false;
        }
        let Some(search_key) = v.search_key() else {
            return false;
        };

        let capacity = self.config().capacity();
        let mut p_children = Vec::new();
        let mut l_children = Vec::new();

        loop {
            let Some(cursor) = self.locate(viol, search_key, guard) else {
                trace_log!("weight: target gone, handing off");
                return false;
            };

            // SAFETY: loaded from the tree under `guard`.
            let p = unsafe { node_ref(cursor.p, guard) };
            if !p.weight() {
                self.fix_weight_violation(cursor.p, guard);
                continue;
            }
            if cursor.gp.is_null() {
                warn_log!("weight violation directly below the sentinel");
                return false;
            }
            // SAFETY: as above.
            let gp = unsafe { node_ref(cursor.gp, guard) };

            // SAFETY: all three nodes are reachable under `guard`.
            let Llx::Linked(gp_op) = (unsafe { llx(cursor.gp, None, guard) }) else {
                continue;
            };
            if gp.child(cursor.ix_to_p) != cursor.p {
                continue;
            }
            // SAFETY: as above.
            let Llx::Linked(p_op) = (unsafe { llx(cursor.p, Some(&mut p_children), guard) }) else {
                continue;
            };
            if p_children.get(cursor.ix_to_l) != Some(&viol) {
                continue;
            }
            // SAFETY: as above.
            let Llx::Linked(l_op) = (unsafe { llx(viol, Some(&mut l_children), guard) }) else {
                continue;
            };

            // Merge `viol` into `p`: its separators and children take the
            // place of the slot that pointed at it.
            let ix = cursor.ix_to_l;
            let size = p_children.len() + l_children.len() - 1;

            let mut keys = Vec::with_capacity(size - 1);
            keys.extend_from_slice(&p.keys()[..ix]);
            keys.extend_from_slice(v.keys());
            keys.extend_from_slice(&p.keys()[ix..]);

            let mut children = Vec::with_capacity(size);
            children.extend_from_slice(&p_children[..ix]);
            children.extend_from_slice(&l_children);
            children.extend_from_slice(&p_children[ix + 1..]);

            let mut fresh = Fresh::new();

            if size <= capacity {
                // Absorb
                let search = keys.first().cloned();
                let new_p = fresh.add(Node::internal(keys, children, true, search, self.dummy_ptr()));
                let request = ScxRequest {
                    nodes: vec![cursor.gp, cursor.p, viol],
                    priors: vec![gp_op, p_op, l_op],
                    replacement: new_p,
                    child_index: cursor.ix_to_p,
                };
                if self.try_scx(request, fresh, guard) {
                    debug_log!(size, "absorb");
                    self.fix_degree_or_slack_violation(new_p, guard);
                    return true;
                }
                continue;
            }

            // Split
            let left_len = size / 2;
            let right_keys = keys.split_off(left_len);
            let separator = keys[left_len - 1].clone();
            keys.truncate(left_len - 1);
            let right_children = children.split_off(left_len);

            let left_search = keys.first().cloned();
            let right_search = right_keys.first().cloned();
            let left = fresh.add(Node::internal(keys, children, true, left_search, self.dummy_ptr()));
            let right = fresh.add(Node::internal(
                right_keys,
                right_children,
                true,
                right_search,
                self.dummy_ptr(),
            ));
            let new_p = fresh.add(Node::internal(
                vec![separator.clone()],
                vec![left, right],
                cursor.gp == self.root_ptr(),
                Some(separator),
                self.dummy_ptr(),
            ));

            let request = ScxRequest {
                nodes: vec![cursor.gp, cursor.p, viol],
                priors: vec![gp_op, p_op, l_op],
                replacement: new_p,
                child_index: cursor.ix_to_p,
            };
            if self.try_scx(request, fresh, guard) {
                debug_log!(size, "split");
                self.fix_weight_violation(new_p, guard);
                self.fix_degree_or_slack_violation(new_p, guard);
                self.fix_degree_or_slack_violation(left, guard);
                self.fix_degree_or_slack_violation(right, guard);
                self.fix_degree_or_slack_violation(cursor.gp, guard);
                return true;
            }
        }
    }

    // ========================================================================
    //  Degree / Slack Violations: Compress / One-Child / Root-Replace
    // ========================================================================

    /// Repair a degree or slack violation at `viol`, if there is one and
    /// `viol` is still in the tree.
    ///
    /// Returns `true` if this call performed a rebalancing step.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub(crate) fn fix_degree_or_slack_violation(
        &self,
        viol: *mut Node<K, V>,
        guard: &LocalGuard<'_>,
    ) -> bool {
        // The sentinel always has exactly one child.
        if viol == self.root_ptr() {
            return false;
        }
        // SAFETY: `viol` was reachable (or just published) under `guard`.
        let v = unsafe { node_ref(viol, guard) };
        if v.is_leaf() {
            return false;
        }

        // Cheap check before paying for a full search.
        let mut children = Vec::new();
        // SAFETY: as above.
        match unsafe { llx(viol, Some(&mut children), guard) } {
            Llx::Finalized => return false,
            Llx::Failed => {}
            Llx::Linked(_) => {
                if children.len() > 1 && !self.slack_violated(&children, guard) {
                    return false;
                }
            }
        }

        let Some(search_key) = v.search_key() else {
            return false;
        };
        let degree_violation = v.child_count() == 1;
        let mut p_children = Vec::new();
        let mut snapshot = Vec::new();

        loop {
            let Some(mut cursor) = self.locate(viol, search_key, guard) else {
                trace_log!("degree/slack: target gone, handing off");
                return false;
            };

            // The node being replaced ("top") is `viol` itself for a slack
            // violation and its parent for a degree violation.
            if !degree_violation {
                cursor.step(search_key, self.comparator(), guard);
            }
            if cursor.gp.is_null() {
                warn_log!("degree violation directly below the sentinel");
                return false;
            }

            // SAFETY: loaded from the tree under `guard`.
            let (gp, p) = unsafe { (node_ref(cursor.gp, guard), node_ref(cursor.p, guard)) };

            // SAFETY: reachable under `guard`.
            let Llx::Linked(gp_op) = (unsafe { llx(cursor.gp, None, guard) }) else {
                continue;
            };
            if gp.child(cursor.ix_to_p) != cursor.p {
                continue;
            }
            // SAFETY: as above.
            let Llx::Linked(p_op) = (unsafe { llx(cursor.p, Some(&mut p_children), guard) }) else {
                continue;
            };
            if p_children.get(cursor.ix_to_l) != Some(&cursor.l) {
                continue;
            }

            // Weight must be clean everywhere the step touches.
            let mut fixed_weight = false;
            for &child in &p_children {
                // SAFETY: snapshot of a node reachable under `guard`.
                if !unsafe { node_ref(child, guard) }.weight() {
                    fixed_weight = true;
                    self.fix_weight_violation(child, guard);
                }
            }
            if !p.weight() {
                fixed_weight = true;
                self.fix_weight_violation(cursor.p, guard);
            }
            if fixed_weight {
                continue;
            }

            // SAFETY: as above.
            let first = unsafe { node_ref(p_children[0], guard) };
            let leaf_children = first.is_leaf();
            // SAFETY: as above.
            if p_children.iter().any(|&c| unsafe { node_ref(c, guard) }.is_leaf() != leaf_children) {
                return false;
            }

            let mut nodes = Vec::with_capacity(2 + p_children.len());
            nodes.push(cursor.gp);
            nodes.push(cursor.p);
            let mut priors: Vec<OpHandle<K, V>> = vec![gp_op, p_op];
            let inherited = first.search_key().cloned();
            let mut fresh = Fresh::new();
            let mut new_children = Vec::new();
            let mut parent_keys = Vec::new();

            if leaf_children {
                let mut conflict = false;
                for &child in &p_children {
                    // SAFETY: as above.
                    if matches!(unsafe { llx(child, None, guard) }, Llx::Linked(_)) {
                        nodes.push(child);
                    } else {
                        conflict = true;
                        break;
                    }
                }
                if conflict {
                    continue;
                }

                let mut keys = Vec::new();
                let mut values: Vec<Arc<V>> = Vec::new();
                for &child in &p_children {
                    // SAFETY: as above.
                    let c = unsafe { node_ref(child, guard) };
                    keys.extend_from_slice(c.keys());
                    values.extend_from_slice(c.values());
                }
                let total = keys.len();
                if !degree_violation && !self.over_slack(p_children.len(), total) {
                    return false;
                }

                let n = self.config().nodes_needed(total);
                let mut keys = keys.into_iter();
                let mut values = values.into_iter();
                for size in chunk_sizes(total, n) {
                    let node_keys: Vec<K> = keys.by_ref().take(size).collect();
                    let node_values: Vec<Arc<V>> = values.by_ref().take(size).collect();
                    let search = if n == 1 {
                        inherited.clone()
                    } else {
                        node_keys.first().cloned()
                    };
                    if !new_children.is_empty() {
                        parent_keys.extend(node_keys.first().cloned());
                    }
                    new_children.push(fresh.add(Node::leaf(
                        node_keys,
                        node_values,
                        search,
                        self.dummy_ptr(),
                    )));
                }
            } else {
                let mut conflict = false;
                let mut keys = Vec::new();
                let mut grandchildren = Vec::new();
                for (i, &child) in p_children.iter().enumerate() {
                    // SAFETY: as above.
                    let Llx::Linked(op) = (unsafe { llx(child, Some(&mut snapshot), guard) }) else {
                        conflict = true;
                        break;
                    };
                    nodes.push(child);
                    priors.push(op);
                    // SAFETY: as above.
                    keys.extend_from_slice(unsafe { node_ref(child, guard) }.keys());
                    grandchildren.extend_from_slice(&snapshot);
                    if let Some(separator) = p.keys().get(i) {
                        keys.push(separator.clone());
                    }
                }
                if conflict {
                    continue;
                }

                let total = grandchildren.len();
                if !degree_violation && !self.over_slack(p_children.len(), total) {
                    return false;
                }

                let n = self.config().nodes_needed(total);
                let mut offset = 0;
                for (j, size) in chunk_sizes(total, n).enumerate() {
                    let node_keys = keys[offset..offset + size - 1].to_vec();
                    let node_children = grandchildren[offset..offset + size].to_vec();
                    if j + 1 < n {
                        parent_keys.push(keys[offset + size - 1].clone());
                    }
                    let search = if n == 1 {
                        inherited.clone()
                    } else {
                        node_keys.first().cloned()
                    };
                    new_children.push(fresh.add(Node::internal(
                        node_keys,
                        node_children,
                        true,
                        search,
                        self.dummy_ptr(),
                    )));
                    offset += size;
                }
            }

            if cursor.gp == self.root_ptr() && new_children.len() == 1 {
                // Root-Replace: the sole new node becomes the root.
                let only = new_children[0];
                let request = ScxRequest {
                    nodes,
                    priors,
                    replacement: only,
                    child_index: cursor.ix_to_p,
                };
                if self.try_scx(request, fresh, guard) {
                    debug_log!("root replace");
                    self.fix_degree_or_slack_violation(only, guard);
                    return true;
                }
                continue;
            }

            let new_p = fresh.add(Node::internal(
                parent_keys,
                new_children.clone(),
                true,
                p.search_key().cloned(),
                self.dummy_ptr(),
            ));
            let request = ScxRequest {
                nodes,
                priors,
                replacement: new_p,
                child_index: cursor.ix_to_p,
            };
            if self.try_scx(request, fresh, guard) {
                debug_log!(from = p_children.len(), to = new_children.len(), "compress");
                for &child in &new_children {
                    self.fix_degree_or_slack_violation(child, guard);
                }
                self.fix_degree_or_slack_violation(new_p, guard);
                self.fix_degree_or_slack_violation(cursor.gp, guard);
                return true;
            }
        }
    }

    // ========================================================================
    //  Slack Accounting
    // ========================================================================

    /// Do `children` siblings holding `occupancy` entries carry too much slack?
    #[inline]
    fn over_slack(&self, children: usize, occupancy: usize) -> bool {
        let capacity = self.config().capacity();
        (children * capacity).saturating_sub(occupancy) >= self.config().slack_limit(children)
    }

    /// Slack check over a child snapshot. Mixed leaf/internal siblings never
    /// count as a violation.
    fn slack_violated(&self, children: &[*mut Node<K, V>], guard: &LocalGuard<'_>) -> bool {
        let mut leaves = 0;
        let mut occupancy = 0;
        for &child in children {
            // SAFETY: snapshot of a node reachable under `guard`.
            let c = unsafe { node_ref(child, guard) };
            if c.is_leaf() {
                leaves += 1;
            }
            occupancy += c.degree();
        }
        if leaves > 0 && leaves < children.len() {
            return false;
        }
        self.over_slack(children.len(), occupancy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_sizes_even() {
        assert_eq!(chunk_sizes(9, 3).collect::<Vec<_>>(), vec![3, 3, 3]);
    }

    #[test]
    fn test_chunk_sizes_ceil_first() {
        assert_eq!(chunk_sizes(11, 3).collect::<Vec<_>>(), vec![4, 4, 3]);
        assert_eq!(chunk_sizes(5, 2).collect::<Vec<_>>(), vec![3, 2]);
    }

    #[test]
    fn test_chunk_sizes_empty_single() {
        assert_eq!(chunk_sizes(0, 1).collect::<Vec<_>>(), vec![0]);
        assert_eq!(chunk_sizes(7, 1).collect::<Vec<_>>(), vec![7]);
    }
}
