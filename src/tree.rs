//! `BSlackTree` - a lock-free concurrent ordered map.
//!
//! This module holds the tree handle, its constructors and the public map
//! operations. The algorithms live in submodules:
//!
//! - [`search`]: descents and relocation by search key.
//! - [`update`]: insert, replace, overflow and delete.
//! - [`rebalance`]: weight, degree and slack violation fixups.
//! - [`diagnostics`]: sequential statistics, validation and snapshots.

use std::fmt as StdFmt;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use seize::{Collector, LocalGuard};

use crate::compare::{KeyComparator, Natural};
use crate::config::Config;
use crate::ksearch;
use crate::node::Node;
use crate::ordering::RELAXED;
use crate::reclaim::teardown;
use crate::scx::ScxRecord;

mod diagnostics;
mod rebalance;
mod search;
mod update;


pub use diagnostics::{NodeSnapshot, TreeStats};

/// Borrow a node for the lifetime of `guard`.
///
/// # Safety
///
/// `ptr` must have been loaded from the tree (or be pinned, or be freshly
/// published) while `guard` was active.
#[inline(always)]
pub(crate) unsafe fn node_ref<'g, K, V>(
    ptr: *mut Node<K, V>,
    _guard: &'g LocalGuard<'_>,
) -> &'g Node<K, V> {
    // SAFETY: caller guarantees the node cannot be reclaimed before `guard` exits.
    unsafe { &*ptr }
}

// ============================================================================
//  BSlackTree
// ============================================================================

/// A lock-free concurrent ordered map built on a B-slack tree.
///
/// Every node is immutable once published. Updates build replacement nodes
/// off to the side and swap them in with a single SCX, then repair any
/// weight, degree or slack violation they created before returning.
///
/// # Example
///
/// ```rust
/// use bslack::BSlackTree;
///
/// let tree: BSlackTree<u64, &str> = BSlackTree::new();
/// assert_eq!(tree.put(1, "one"), None);
/// assert!(!tree.put_if_absent(1, "uno"));
/// assert_eq!(tree.get(&1).as_deref(), Some(&"one"));
/// assert_eq!(tree.remove(&1).as_deref(), Some(&"one"));
/// assert!(!tree.contains_key(&1));
/// ```
///
/// # Thread Safety
///
/// `BSlackTree` is `Send + Sync` when keys, values and the comparator are.
/// Share it with `Arc` and call any operation from any thread. Each
/// operation enters its own guard; the `*_with_guard` variants let callers
/// amortize that over a batch.
pub struct BSlackTree<K, V, C = Natural> {
    /// Epoch-based reclamation for unlinked nodes and retired descriptors.
    collector: Collector,

    /// Sentinel: an internal node with no keys and exactly one child, the
    /// real root. Never replaced.
    root: *mut Node<K, V>,

    /// Permanently aborted descriptor every new node starts with.
    dummy: *mut ScxRecord<K, V>,

    /// Source of descriptor sequence numbers. Starts at 1; 0 is the dummy.
    next_seq: AtomicU64,

    config: Config,
    comparator: C,
}

// SAFETY: the raw pointers are owned by the tree. Nodes hold `K` and
// `Arc<V>` and are shared across threads; the comparator is called
// concurrently.
unsafe impl<K: Send + Sync, V: Send + Sync, C: Send> Send for BSlackTree<K, V, C> {}

// SAFETY: all shared mutation goes through atomics and the SCX protocol.
unsafe impl<K: Send + Sync, V: Send + Sync, C: Sync> Sync for BSlackTree<K, V, C> {}

impl<K, V> BSlackTree<K, V, Natural>
where
    K: Ord + Clone,
{
    /// Create an empty tree with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_comparator(Config::default(), Natural)
    }

    /// Create an empty tree with `config`.
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self::with_comparator(config, Natural)
    }
}

impl<K, V> Default for BSlackTree<K, V, Natural>
where
    K: Ord + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C> BSlackTree<K, V, C>
where
    K: Clone,
    C: KeyComparator<K>,
{
    /// Create an empty tree ordered by `comparator`.
    ///
    /// ```rust
    /// use bslack::{BSlackTree, Config};
    ///
    /// let reverse = |a: &u32, b: &u32| b.cmp(a);
    /// let tree: BSlackTree<u32, u32, _> = BSlackTree::with_comparator(Config::default(), reverse);
    /// tree.put(1, 10);
    /// tree.put(2, 20);
    /// assert_eq!(tree.snapshot().leaf_keys(), vec![2, 1]);
    /// ```
    #[must_use]
    pub fn with_comparator(config: Config, comparator: C) -> Self {
        let dummy = Box::into_raw(ScxRecord::dummy());
        let leaf = Box::into_raw(Node::leaf(Vec::new(), Vec::new(), None, dummy));
        let root = Box::into_raw(Node::internal(Vec::new(), vec![leaf], true, None, dummy));

        Self {
            collector: Collector::new(),
            root,
            dummy,
            next_seq: AtomicU64::new(1),
            config,
            comparator,
        }
    }

    /// Enter a reclamation guard for the `*_with_guard` operations.
    ///
    /// Nodes unlinked while any guard is active stay allocated until it is
    /// dropped, so keep guards short-lived.
    #[inline]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    /// Configuration the tree was built with.
    #[must_use]
    #[inline]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Comparator ordering the keys.
    #[must_use]
    #[inline]
    pub const fn comparator(&self) -> &C {
        &self.comparator
    }

    // ========================================================================
    //  Reads
    // ========================================================================

    /// Look up `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let guard = self.guard();
        self.get_with_guard(key, &guard)
    }

    /// Look up `key` under a guard obtained from [`Self::guard`].
    #[must_use]
    pub fn get_with_guard(&self, key: &K, guard: &LocalGuard<'_>) -> Option<Arc<V>> {
        let leaf = self.find_leaf(key, guard);
        ksearch::lower_bound(leaf.keys(), key, &self.comparator)
            .ok()
            .map(|i| Arc::clone(&leaf.values()[i]))
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        let guard = self.guard();
        self.contains_key_with_guard(key, &guard)
    }

    /// Whether `key` is present, under a caller-provided guard.
    #[must_use]
    pub fn contains_key_with_guard(&self, key: &K, guard: &LocalGuard<'_>) -> bool {
        let leaf = self.find_leaf(key, guard);
        ksearch::lower_bound(leaf.keys(), key, &self.comparator).is_ok()
    }

    // ========================================================================
    //  Writes
    // ========================================================================

    /// Insert or replace. Returns the previous value.
    pub fn put(&self, key: K, value: V) -> Option<Arc<V>> {
        let guard = self.guard();
        self.put_with_guard(key, value, &guard)
    }

    /// Insert or replace under a caller-provided guard.
    pub fn put_with_guard(&self, key: K, value: V, guard: &LocalGuard<'_>) -> Option<Arc<V>> {
        self.put_impl(key, Arc::new(value), true, guard)
    }

    /// Insert only if `key` is absent. Returns `true` iff the value was inserted.
    pub fn put_if_absent(&self, key: K, value: V) -> bool {
        let guard = self.guard();
        self.put_if_absent_with_guard(key, value, &guard)
    }

    /// Insert-if-absent under a caller-provided guard.
    pub fn put_if_absent_with_guard(&self, key: K, value: V, guard: &LocalGuard<'_>) -> bool {
        self.put_impl(key, Arc::new(value), false, guard).is_none()
    }

    /// Remove `key`. Returns its value if it was present.
    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        let guard = self.guard();
        self.remove_with_guard(key, &guard)
    }

    /// Remove under a caller-provided guard.
    pub fn remove_with_guard(&self, key: &K, guard: &LocalGuard<'_>) -> Option<Arc<V>> {
        self.remove_impl(key, guard)
    }

    // ========================================================================
    //  Internal Helpers
    // ========================================================================

    #[inline]
    pub(crate) fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, RELAXED)
    }

    #[inline(always)]
    pub(crate) const fn root_ptr(&self) -> *mut Node<K, V> {
        self.root
    }

    #[inline(always)]
    pub(crate) const fn dummy_ptr(&self) -> *mut ScxRecord<K, V> {
        self.dummy
    }
}

impl<K, V, C> Drop for BSlackTree<K, V, C> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no operation is running. Retired objects
        // are freed by the collector when it drops after this.
        unsafe {
            teardown(self.root);
            drop(Box::from_raw(self.dummy));
        }
        self.root = ptr::null_mut();
        self.dummy = ptr::null_mut();
    }
}

impl<K, V, C> StdFmt::Debug for BSlackTree<K, V, C> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("BSlackTree")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
