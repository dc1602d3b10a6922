//! Reclaim helpers for seize-based memory reclamation.
//!
//! - Single-object reclaimers for `guard.defer_retire()`. They only drop the
//!   box: children and descriptors are accounted for by reference counts
//!   before an object is retired.
//! - Whole-tree teardown for `Drop`.

#![allow(clippy::redundant_pub_crate)]

use std::collections::HashSet;

use seize::Collector;

use crate::node::Node;
use crate::scx::ScxRecord;

// ============================================================================
//  Single-Object Reclaimers (seize callback signatures)
// ============================================================================

/// Reclaim a boxed node (seize callback).
///
/// # Safety
///
/// - `ptr` must come from `Box::into_raw` and be unreachable.
/// - Must only be called after seize determines no reader remains.
pub(crate) unsafe fn reclaim_node_boxed<K, V>(ptr: *mut Node<K, V>, _collector: &Collector) {
    // SAFETY: caller guarantees ptr is valid and from Box::into_raw.
    unsafe { drop(Box::from_raw(ptr)) };
}

/// Reclaim a boxed SCX record (seize callback).
///
/// # Safety
///
/// - `ptr` must come from `Box::into_raw` with its reference count at zero.
/// - Must only be called after seize determines no reader remains.
pub(crate) unsafe fn reclaim_record_boxed<K, V>(ptr: *mut ScxRecord<K, V>, _collector: &Collector) {
    // SAFETY: caller guarantees ptr is valid and from Box::into_raw.
    unsafe { drop(Box::from_raw(ptr)) };
}

// ============================================================================
//  Tree Teardown
// ============================================================================

/// Free every node reachable from `root`, dropping each node's reference to
/// its descriptor and freeing descriptors whose count reaches zero.
///
/// The tree's dummy record is left alone.
///
/// # Safety
///
/// - No other thread may access the tree.
/// - `root` must be the tree's sentinel (or any node owned by the caller).
pub(crate) unsafe fn teardown<K, V>(root: *mut Node<K, V>) {
    if root.is_null() {
        return;
    }

    let mut stack: Vec<*mut Node<K, V>> = Vec::with_capacity(64);
    stack.push(root);

    // Identity only; never turned back into a pointer.
    let mut visited: HashSet<usize> = HashSet::new();

    while let Some(node_ptr) = stack.pop() {
        if node_ptr.is_null() || !visited.insert(node_ptr.addr()) {
            continue;
        }

        // SAFETY: reachable nodes are live until freed below.
        let node = unsafe { &*node_ptr };
        stack.extend(node.children().iter().map(|slot| slot.load(crate::ordering::RELAXED)));

        let op = node.op();
        // SAFETY: a reachable node's slot holds a counted reference (or the dummy).
        let free_op = unsafe { !(*op).is_dummy() && (*op).release_owned() };
        if free_op {
            // SAFETY: the last reference is gone and no thread is running.
            unsafe { drop(Box::from_raw(op)) };
        }

        // SAFETY: node came from Box::into_raw and is visited once.
        unsafe { drop(Box::from_raw(node_ptr)) };
    }
}
