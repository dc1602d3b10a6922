//! Property-based tests for `BSlackTree`.
//!
//! Sequential semantics are checked differentially against `BTreeMap`, and
//! every structural invariant is re-checked after each operation sequence
//! for a range of node capacities and both slack policies.

#![expect(clippy::unwrap_used, reason = "fail fast in tests")]

use bslack::{BSlackTree, Config};
use proptest::prelude::*;
use std::collections::BTreeMap;

// ============================================================================
//  Strategies
// ============================================================================

/// Small key space so puts and removes collide often.
fn small_key() -> impl Strategy<Value = u16> {
    0u16..512
}

/// A valid configuration: capacity 3..=32 (4..=32 with extra slack).
fn config() -> impl Strategy<Value = Config> {
    (3usize..=32, any::<bool>()).prop_map(|(capacity, extra)| {
        let capacity = if extra { capacity.max(4) } else { capacity };
        Config::with_policy(capacity, extra).unwrap()
    })
}

/// Operations for random testing.
#[derive(Debug, Clone)]
enum Op {
    Put(u16, u32),
    PutIfAbsent(u16, u32),
    Remove(u16),
    Get(u16),
}

fn operations(max_ops: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            4 => (small_key(), any::<u32>()).prop_map(|(k, v)| Op::Put(k, v)),
            1 => (small_key(), any::<u32>()).prop_map(|(k, v)| Op::PutIfAbsent(k, v)),
            3 => small_key().prop_map(Op::Remove),
            2 => small_key().prop_map(Op::Get),
        ],
        0..=max_ops,
    )
}

fn apply(tree: &BSlackTree<u16, u32>, model: &mut BTreeMap<u16, u32>, op: &Op) {
    match *op {
        Op::Put(k, v) => {
            assert_eq!(tree.put(k, v).map(|old| *old), model.insert(k, v));
        }
        Op::PutIfAbsent(k, v) => {
            let absent = !model.contains_key(&k);
            if absent {
                model.insert(k, v);
            }
            assert_eq!(tree.put_if_absent(k, v), absent);
        }
        Op::Remove(k) => {
            assert_eq!(tree.remove(&k).map(|old| *old), model.remove(&k));
        }
        Op::Get(k) => {
            assert_eq!(tree.get(&k).map(|v| *v), model.get(&k).copied());
            assert_eq!(tree.contains_key(&k), model.contains_key(&k));
        }
    }
}

// ============================================================================
//  Map Semantics
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// After `put(k, v)`, `get(k)` returns `v`.
    #[test]
    fn put_then_get_returns_value(key in small_key(), value: u32) {
        let tree: BSlackTree<u16, u32> = BSlackTree::new();
        prop_assert!(tree.put(key, value).is_none());
        let got = tree.get(&key);
        prop_assert_eq!(got.as_deref(), Some(&value));
    }

    /// After `remove(k)`, `get(k)` is absent.
    #[test]
    fn remove_then_get_is_absent(key in small_key(), value: u32) {
        let tree: BSlackTree<u16, u32> = BSlackTree::new();
        tree.put(key, value);
        let removed = tree.remove(&key);
        prop_assert_eq!(removed.as_deref(), Some(&value));
        prop_assert!(tree.get(&key).is_none());
        prop_assert!(tree.remove(&key).is_none());
    }

    /// `put_if_absent` never overwrites.
    #[test]
    fn put_if_absent_keeps_first(key in small_key(), v1: u32, v2: u32) {
        let tree: BSlackTree<u16, u32> = BSlackTree::new();
        prop_assert!(tree.put_if_absent(key, v1));
        prop_assert!(!tree.put_if_absent(key, v2));
        let got = tree.get(&key);
        prop_assert_eq!(got.as_deref(), Some(&v1));
    }
}

// ============================================================================
//  Differential Testing
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(150))]

    /// Random operation sequences agree with `BTreeMap` step by step, and the
    /// final tree holds exactly the model's contents in order.
    #[test]
    fn differential_random_ops(config in config(), ops in operations(400)) {
        let tree = BSlackTree::with_config(config);
        let mut model = BTreeMap::new();

        for op in &ops {
            apply(&tree, &mut model, op);
        }

        prop_assert_eq!(tree.sequential_size(), model.len());
        let keys: Vec<u16> = model.keys().copied().collect();
        prop_assert_eq!(tree.snapshot().leaf_keys(), keys);
    }
}

// ============================================================================
//  Structural Invariants
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every invariant holds after every single operation.
    #[test]
    fn invariants_hold_after_each_op(config in config(), ops in operations(200)) {
        let tree = BSlackTree::with_config(config);
        let mut model = BTreeMap::new();

        for op in &ops {
            apply(&tree, &mut model, op);
            if let Err(violation) = tree.validate() {
                return Err(TestCaseError::fail(format!("{violation} after {op:?}")));
            }
        }
    }

    /// Filling and then draining the tree returns it to a single empty leaf.
    #[test]
    fn drain_returns_to_single_leaf(config in config(), keys in prop::collection::hash_set(small_key(), 0..300)) {
        let tree = BSlackTree::with_config(config);
        for &k in &keys {
            tree.put(k, u32::from(k));
        }
        tree.validate().unwrap();
        prop_assert_eq!(tree.sequential_size(), keys.len());

        for &k in &keys {
            prop_assert_eq!(tree.remove(&k).map(|v| *v), Some(u32::from(k)));
        }
        tree.validate().unwrap();
        prop_assert_eq!(tree.sequential_size(), 0);
        prop_assert_eq!(tree.height(), 1);
    }

    /// Leaves never hold more than `b` keys, and height stays logarithmic.
    #[test]
    fn ascending_inserts_stay_shallow(capacity in 4usize..=16, count in 1u16..500) {
        let tree: BSlackTree<u16, u32> = BSlackTree::with_config(Config::new(capacity).unwrap());
        for k in 0..count {
            tree.put(k, 0);
        }
        tree.validate().unwrap();

        let snapshot = tree.snapshot();
        prop_assert!(snapshot.max_leaf_keys() <= capacity);

        // Each internal node has at least two children.
        let bound = (f64::from(count).log2().ceil() as usize) + 1;
        prop_assert!(tree.height() <= bound, "height {} > {}", tree.height(), bound);
    }
}

// ============================================================================
//  Custom Comparators
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// A reversing comparator stores keys in descending order.
    #[test]
    fn reverse_comparator_orders_descending(keys in prop::collection::btree_set(small_key(), 0..200)) {
        let reverse = |a: &u16, b: &u16| b.cmp(a);
        let tree = BSlackTree::with_comparator(Config::new(5).unwrap(), reverse);
        for &k in &keys {
            tree.put(k, ());
        }
        tree.validate().unwrap();

        let expected: Vec<u16> = keys.iter().rev().copied().collect();
        prop_assert_eq!(tree.snapshot().leaf_keys(), expected);
    }
}
