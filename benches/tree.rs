//! Benchmarks for `BSlackTree` using Divan.
//!
//! Run with: `cargo bench --bench tree`
//! With mimalloc: `cargo bench --bench tree --features mimalloc`

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;


use bench_utils::{ascending, keys, populated, uniform_indices, zipfian_indices};
use bslack::{BSlackTree, Config};
use divan::{Bencher, black_box};

const N: usize = 100_000;
const OPS: usize = 10_000;

fn main() {
    divan::main();
}

// =============================================================================
// Construction
// =============================================================================

#[divan::bench_group]
mod construction {
    use super::{BSlackTree, Config};

    #[divan::bench]
    fn new_tree() -> BSlackTree<u64, u64> {
        BSlackTree::new()
    }

    #[divan::bench]
    fn with_config() -> BSlackTree<u64, u64> {
        BSlackTree::with_config(Config::default())
    }
}

// =============================================================================
// Single-Threaded Writes
// =============================================================================

#[divan::bench_group]
mod insert {
    use super::{BSlackTree, Bencher, Config, ascending, black_box, keys};

    /// Fill an empty tree. Capacity trades height for repacking cost.
    #[divan::bench(args = [4, 8, 16, 32, 64])]
    fn fill_random(bencher: Bencher, capacity: usize) {
        let keys = keys(10_000);
        bencher
            .with_inputs(|| BSlackTree::<u64, u64>::with_config(Config::new(capacity).unwrap_or_default()))
            .bench_local_values(|tree| {
                for &k in &keys {
                    black_box(tree.put(k, k));
                }
                tree
            });
    }

    /// Ascending fill always splits the rightmost leaf.
    #[divan::bench(args = [4, 16, 64])]
    fn fill_ascending(bencher: Bencher, capacity: usize) {
        let keys = ascending(10_000);
        bencher
            .with_inputs(|| BSlackTree::<u64, u64>::with_config(Config::new(capacity).unwrap_or_default()))
            .bench_local_values(|tree| {
                for &k in &keys {
                    black_box(tree.put(k, k));
                }
                tree
            });
    }

    #[divan::bench(args = [true, false])]
    fn fill_slack_policy(bencher: Bencher, extra_slack: bool) {
        let keys = keys(10_000);
        let config = Config::default().with_extra_slack(extra_slack).unwrap_or_default();
        bencher
            .with_inputs(|| BSlackTree::<u64, u64>::with_config(config))
            .bench_local_values(|tree| {
                for &k in &keys {
                    black_box(tree.put(k, k));
                }
                tree
            });
    }
}

#[divan::bench_group]
mod remove {
    use super::{Bencher, black_box, keys, populated};

    /// Drain a full tree; exercises Compress and Root-Replace.
    #[divan::bench(args = [4, 16, 64])]
    fn drain(bencher: Bencher, capacity: usize) {
        let keys = keys(10_000);
        bencher
            .with_inputs(|| populated(&keys, capacity))
            .bench_local_values(|tree| {
                for k in &keys {
                    black_box(tree.remove(k));
                }
                tree
            });
    }
}

// =============================================================================
// Single-Threaded Reads
// =============================================================================

#[divan::bench_group]
mod get {
    use super::{Bencher, N, OPS, black_box, keys, populated, uniform_indices, zipfian_indices};

    #[divan::bench(args = [8, 16, 32])]
    fn uniform(bencher: Bencher, capacity: usize) {
        let keys = keys(N);
        let tree = populated(&keys, capacity);
        let idx = uniform_indices(N, OPS, 7);
        bencher.bench_local(|| {
            let guard = tree.guard();
            for &i in &idx {
                black_box(tree.get_with_guard(&keys[i], &guard));
            }
        });
    }

    #[divan::bench]
    fn zipfian(bencher: Bencher) {
        let keys = keys(N);
        let tree = populated(&keys, 16);
        let idx = zipfian_indices(N, OPS, 7);
        bencher.bench_local(|| {
            let guard = tree.guard();
            for &i in &idx {
                black_box(tree.get_with_guard(&keys[i], &guard));
            }
        });
    }

    #[divan::bench]
    fn miss(bencher: Bencher) {
        let keys = keys(N);
        let tree = populated(&keys, 16);
        bencher.bench_local(|| {
            let guard = tree.guard();
            for k in 0..OPS as u64 {
                black_box(tree.contains_key_with_guard(&(k * 2 + 1), &guard));
            }
        });
    }
}

// =============================================================================
// Multi-Threaded
// =============================================================================

#[divan::bench(threads = [1, 2, 4, 8])]
fn mt_read(bencher: Bencher<'_, '_>) {
    let keys = keys(N);
    let tree = populated(&keys, 16);

    bencher.bench(|| {
        let guard = tree.guard();
        for i in 0..OPS {
            black_box(tree.get_with_guard(&keys[i % keys.len()], &guard));
        }
    });
}

#[divan::bench(threads = [1, 2, 4, 8])]
fn mt_mixed(bencher: Bencher<'_, '_>) {
    let keys = keys(N);
    let tree = populated(&keys, 16);
    let idx = uniform_indices(N, OPS, 11);

    bencher.bench(|| {
        for (n, &i) in idx.iter().enumerate() {
            let key = keys[i];
            match n % 10 {
                0 => {
                    black_box(tree.remove(&key));
                }
                1 | 2 => {
                    black_box(tree.put(key, key));
                }
                _ => {
                    black_box(tree.get(&key));
                }
            }
        }
    });
}
