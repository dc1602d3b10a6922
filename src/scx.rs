//! LLX/SCX: multi-node load-link / store-conditional over single-word CAS.
//!
//! An update first LLXs the nodes it depends on, recording the descriptor
//! each one held ([`OpHandle`]). It then builds a replacement subtree and
//! issues an SCX: a new [`ScxRecord`] naming those nodes is created, every
//! node in the freeze prefix has its descriptor slot CASed from the recorded
//! handle to the new record, and finally one child pointer of `nodes[0]` is
//! swapped to the replacement. Any thread that runs into an in-progress
//! record helps it to completion, so a stalled thread never blocks others.
//!
//! # Descriptor identity
//!
//! A handle is `(pointer, seq)`. The freeze step compares both, so a
//! descriptor allocation that was reclaimed and reused at the same address
//! is never mistaken for the one an LLX observed.
//!
//! # Lifetimes
//!
//! Records are reference counted: one reference for the creator plus one
//! for each node slot that points at the record. Nodes named by an
//! in-progress record are pinned (see [`Node`]), so helpers can always
//! dereference them. Whoever drops a count to zero retires the object
//! through the caller's guard; nothing is freed while a guard that might
//! still see it is active.

#![allow(clippy::redundant_pub_crate)]

use std::fmt as StdFmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, fence};

use seize::{Guard, LocalGuard};

use crate::node::Node;
use crate::ordering::{REF_ACQUIRE, REF_RELEASE, RELAXED, SCX_ORD};
use crate::reclaim::{reclaim_node_boxed, reclaim_record_boxed};
use crate::tracing_helpers::trace_log;

#[cfg(all(test, loom))]
mod loom_tests;

// ============================================================================
//  ScxState
// ============================================================================

/// Lifecycle of an SCX record. Moves out of `InProgress` exactly once.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScxState {
    InProgress = 0,
    Committed = 1,
    Aborted = 2,
}

impl ScxState {
    #[inline(always)]
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::InProgress,
            1 => Self::Committed,
            _ => Self::Aborted,
        }
    }
}

// ============================================================================
//  OpHandle
// ============================================================================

/// Identity of a descriptor as observed by an LLX.
pub(crate) struct OpHandle<K, V> {
    ptr: *mut ScxRecord<K, V>,
    seq: u64,
}

impl<K, V> OpHandle<K, V> {
    /// Does the descriptor currently at `current` match this handle?
    ///
    /// # Safety
    ///
    /// `current` must be a descriptor loaded under a still-active guard.
    #[inline]
    unsafe fn matches(&self, current: *mut ScxRecord<K, V>) -> bool {
        // SAFETY: caller loaded `current` from a node slot under a guard.
        current == self.ptr && unsafe { (*current).seq } == self.seq
    }
}

impl<K, V> Clone for OpHandle<K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for OpHandle<K, V> {}

impl<K, V> PartialEq for OpHandle<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr && self.seq == other.seq
    }
}

impl<K, V> Eq for OpHandle<K, V> {}

impl<K, V> StdFmt::Debug for OpHandle<K, V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("OpHandle")
            .field("ptr", &self.ptr)
            .field("seq", &self.seq)
            .finish()
    }
}

// ============================================================================
//  Llx
// ============================================================================

/// Outcome of an LLX.
#[derive(Debug)]
pub(crate) enum Llx<K, V> {
    /// The node was quiescent; the handle can be used as an SCX prior.
    Linked(OpHandle<K, V>),
    /// A concurrent SCX touched the node. Retry from the top.
    Failed,
    /// The node has been unlinked for good.
    Finalized,
}

// ============================================================================
//  ScxRecord
// ============================================================================

/// One multi-node replacement.
pub(crate) struct ScxRecord<K, V> {
    /// Unique per tree; 0 marks the tree's permanently aborted dummy.
    seq: u64,
    state: AtomicU8,
    all_frozen: AtomicBool,
    refs: AtomicUsize,

    /// `nodes[0]` is the parent whose child slot changes, `nodes[1]` the
    /// child being replaced, the rest are removed descendants.
    nodes: Box<[*mut Node<K, V>]>,

    /// Expected descriptor of `nodes[i]` for `i < priors.len()`. Nodes
    /// beyond the prefix are leaves, which never need freezing.
    priors: Box<[OpHandle<K, V>]>,

    replacement: *mut Node<K, V>,
    child_index: usize,
}

impl<K, V> ScxRecord<K, V> {
    /// The record every new node starts with. Reads as aborted, so a
    /// freshly built node is immediately LLX-able.
    pub(crate) fn dummy() -> Box<Self> {
        Box::new(Self {
            seq: 0,
            state: AtomicU8::new(ScxState::Aborted as u8),
            all_frozen: AtomicBool::new(false),
            refs: AtomicUsize::new(0),
            nodes: Box::new([]),
            priors: Box::new([]),
            replacement: std::ptr::null_mut(),
            child_index: 0,
        })
    }

    #[inline(always)]
    pub(crate) const fn is_dummy(&self) -> bool {
        self.seq == 0
    }

    #[inline(always)]
    pub(crate) fn state(&self) -> ScxState {
        ScxState::from_u8(self.state.load(SCX_ORD))
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        if self.is_dummy() {
            return true;
        }
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

    #[inline]
    fn release(&self) -> bool {
        if self.is_dummy() {
            return false;
        }
        if self.refs.fetch_sub(1, REF_RELEASE) == 1 {
            fence(REF_ACQUIRE);
            return true;
        }
        false
    }

    /// Drop a reference held outside the guard protocol (tree teardown).
    /// Returns `true` when the caller must free the record.
    pub(crate) fn release_owned(&self) -> bool {
        self.release()
    }
}

// ============================================================================
//  Reference Helpers
// ============================================================================

/// Drop one reference to a record, retiring it if it was the last.
///
/// # Safety
///
/// `record` must be live under `guard` and the caller must own the reference.
pub(crate) unsafe fn release_record<K, V>(record: *mut ScxRecord<K, V>, guard: &LocalGuard<'_>) {
    // SAFETY: caller guarantees `record` is live under `guard`.
    if unsafe { (*record).release() } {
        // SAFETY: the count reached zero, so no slot and no creator refers to
        // the record any more. Readers that loaded it earlier are covered by
        // their guards.
        unsafe { guard.defer_retire(record, reclaim_record_boxed) };
    }
}

/// Drop one reference to a node. The last reference releases the node's
/// descriptor and retires the node.
///
/// # Safety
///
/// `node` must be live under `guard` and the caller must own the reference.
pub(crate) unsafe fn release_node<K, V>(node: *mut Node<K, V>, guard: &LocalGuard<'_>) {
    // SAFETY: caller guarantees `node` is live under `guard`.
    let n = unsafe { &*node };
    if n.release() {
        // No pin and no link remain, so nobody can CAS the slot any more.
        // SAFETY: the slot's reference is ours to drop.
        unsafe { release_record(n.op(), guard) };
        // SAFETY: the node is unreachable and unpinned.
        unsafe { guard.defer_retire(node, reclaim_node_boxed) };
    }
}

// ============================================================================
//  LLX
// ============================================================================

/// Load-link `node`, optionally copying its children into `snapshot`.
///
/// # Safety
///
/// `node` must be live under `guard`.
pub(crate) unsafe fn llx<K, V>(
    node_ptr: *mut Node<K, V>,
    snapshot: Option<&mut Vec<*mut Node<K, V>>>,
    guard: &LocalGuard<'_>,
) -> Llx<K, V> {
    // SAFETY: caller guarantees `node_ptr` is live under `guard`.
    let node = unsafe { &*node_ptr };

    let marked = node.is_finalized();
    let op_ptr = node.op();
    // SAFETY: a slot always holds a live record (or the tree's dummy).
    let op = unsafe { &*op_ptr };
    let state = op.state();

    if state == ScxState::Aborted || (state == ScxState::Committed && !node.is_finalized()) {
        if let Some(out) = snapshot {
            node.snapshot_children(out);
        }
        if node.op() == op_ptr {
            return Llx::Linked(OpHandle {
                ptr: op_ptr,
                seq: op.seq,
            });
        }
    }

    if marked {
        let finished = match op.state() {
            ScxState::Committed => true,
            // SAFETY: `op_ptr` is live under `guard`.
            ScxState::InProgress => (unsafe { help(op_ptr, guard) }) == ScxState::Committed,
            ScxState::Aborted => false,
        };
        if finished {
            return Llx::Finalized;
        }
    }

    let current = node.op();
    // SAFETY: loaded from the slot under `guard`.
    if unsafe { (*current).state() } == ScxState::InProgress {
        // SAFETY: as above.
        unsafe { help(current, guard) };
    }
    Llx::Failed
}

// ============================================================================
//  SCX
// ============================================================================

/// Freeze `node` for `record`, expecting `prior` in its slot.
///
/// # Safety
///
/// `node_ptr` and `record_ptr` must be live under `guard`.
unsafe fn freeze<K, V>(
    node_ptr: *mut Node<K, V>,
    prior: &OpHandle<K, V>,
    record_ptr: *mut ScxRecord<K, V>,
    guard: &LocalGuard<'_>,
) -> bool {
    // SAFETY: caller guarantees liveness under `guard`.
    let node = unsafe { &*node_ptr };
    // SAFETY: as above.
    let record = unsafe { &*record_ptr };

    let current = node.op();
    if current == record_ptr {
        return true;
    }
    // SAFETY: `current` was loaded from the slot under `guard`.
    if !unsafe { prior.matches(current) } {
        return false;
    }

    // The pin keeps the node's final release from racing this CAS, and the
    // record reference is the one the slot will hold.
    if !node.try_acquire() {
        return false;
    }
    if !record.try_acquire() {
        // SAFETY: the pin taken above is ours.
        unsafe { release_node(node_ptr, guard) };
        return false;
    }

    let frozen = node.cas_op(current, record_ptr);
    // SAFETY: on success the slot's reference to `current` is ours to drop;
    // on failure the reference taken for the slot is unused.
    unsafe { release_record(if frozen { current } else { record_ptr }, guard) };
    // SAFETY: the pin taken above is ours.
    unsafe { release_node(node_ptr, guard) };

    frozen || node.op() == record_ptr
}

/// Move `record` out of `InProgress`. The winner releases the pins and, on
/// commit, the link references of the unlinked nodes.
///
/// # Safety
///
/// `record_ptr` must be live under `guard`.
unsafe fn complete<K, V>(
    record_ptr: *mut ScxRecord<K, V>,
    outcome: ScxState,
    guard: &LocalGuard<'_>,
) -> ScxState {
    // SAFETY: caller guarantees liveness under `guard`.
    let record = unsafe { &*record_ptr };
    match record.state.compare_exchange(
        ScxState::InProgress as u8,
        outcome as u8,
        SCX_ORD,
        SCX_ORD,
    ) {
        Ok(_) => {
            if outcome == ScxState::Committed {
                for &node in record.nodes.iter().skip(1) {
                    // SAFETY: the link reference of an unlinked node was
                    // owned by its old parent, which is unlinked too.
                    unsafe { release_node(node, guard) };
                }
            }
            for &node in record.nodes.iter() {
                // SAFETY: pins taken in `scx` belong to the record.
                unsafe { release_node(node, guard) };
            }
            outcome
        }
        Err(actual) => ScxState::from_u8(actual),
    }
}

/// Drive `record` to completion. Safe to call from any number of threads.
///
/// # Safety
///
/// `record_ptr` must be live under `guard`.
pub(crate) unsafe fn help<K, V>(
    record_ptr: *mut ScxRecord<K, V>,
    guard: &LocalGuard<'_>,
) -> ScxState {
    // SAFETY: caller guarantees liveness under `guard`.
    let record = unsafe { &*record_ptr };
    let state = record.state();
    if state != ScxState::InProgress {
        return state;
    }

    for (i, prior) in record.priors.iter().enumerate() {
        // SAFETY: nodes are pinned while the record is in progress, and the
        // record was in progress when this guard was already active.
        if unsafe { freeze(record.nodes[i], prior, record_ptr, guard) } {
            continue;
        }
        if record.all_frozen.load(SCX_ORD) {
            // Someone else froze everything; this slot moved on after commit.
            break;
        }
        trace_log!(seq = record.seq, slot = i, "scx freeze failed, aborting");
        // SAFETY: as above.
        return unsafe { complete(record_ptr, ScxState::Aborted, guard) };
    }

    record.all_frozen.store(true, SCX_ORD);
    for &node in record.nodes.iter().take(record.priors.len()).skip(1) {
        // SAFETY: pinned as above.
        unsafe { (*node).mark_finalized() };
    }

    // SAFETY: `nodes[0]` is pinned as above.
    let parent = unsafe { &*record.nodes[0] };
    let _ = parent.cas_child(record.child_index, record.nodes[1], record.replacement);

    // SAFETY: as above.
    unsafe { complete(record_ptr, ScxState::Committed, guard) }
}

/// Inputs of one SCX attempt.
pub(crate) struct ScxRequest<K, V> {
    /// `[parent, replaced child, removed descendants...]`.
    pub(crate) nodes: Vec<*mut Node<K, V>>,
    /// Handles from the LLXs of the freeze prefix of `nodes`.
    pub(crate) priors: Vec<OpHandle<K, V>>,
    /// Root of the new subtree.
    pub(crate) replacement: *mut Node<K, V>,
    /// Slot of `nodes[0]` that holds `nodes[1]`.
    pub(crate) child_index: usize,
}

/// Run one SCX. Returns `true` if it committed.
///
/// On failure the caller still owns every node it built for `request`.
///
/// # Safety
///
/// Every node in `request` must be live under `guard`, and each prior must
/// come from an LLX taken under `guard`.
pub(crate) unsafe fn scx<K, V>(seq: u64, request: ScxRequest<K, V>, guard: &LocalGuard<'_>) -> bool {
    debug_assert!(request.nodes.len() >= 2);
    debug_assert!(request.priors.len() <= request.nodes.len());
    debug_assert_ne!(seq, 0);

    for (pinned, &node) in request.nodes.iter().enumerate() {
        // SAFETY: caller guarantees liveness.
        if !unsafe { (*node).try_acquire() } {
            // Already dead: some other SCX unlinked it after our LLX.
            for &undo in &request.nodes[..pinned] {
                // SAFETY: pins just taken are ours.
                unsafe { release_node(undo, guard) };
            }
            return false;
        }
    }

    let record = Box::into_raw(Box::new(ScxRecord {
        seq,
        state: AtomicU8::new(ScxState::InProgress as u8),
        all_frozen: AtomicBool::new(false),
        refs: AtomicUsize::new(1),
        nodes: request.nodes.into_boxed_slice(),
        priors: request.priors.into_boxed_slice(),
        replacement: request.replacement,
        child_index: request.child_index,
    }));

    // SAFETY: `record` is fresh and owned by us.
    let outcome = unsafe { help(record, guard) };
    // SAFETY: the creator reference is ours.
    unsafe { release_record(record, guard) };
    outcome == ScxState::Committed
}
