//! Stress binary: mixed concurrent workload with a progress watchdog.
//!
//! Each round runs a put/remove/get mix from several threads over a shared
//! key space, then prints tree statistics and validates the structure.
//!
//! Run with:
//! ```bash
//! BSLACK_NODE_CAPACITY=8 RUST_LOG=bslack=debug cargo run --release --features tracing
//! ```
//!
//! Positional arguments: `[threads] [ops_per_thread] [key_space] [rounds]`.

#![allow(clippy::unwrap_used)]
#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use bslack::{BSlackTree, Config};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

// =============================================================================
// Workload
// =============================================================================

/// xorshift64*, one stream per thread.
struct Rng(u64);

impl Rng {
    const fn new(seed: u64) -> Self {
        Self(seed | 1)
    }

    fn next(&mut self) -> u64 {
        self.0 ^= self.0 >> 12;
        self.0 ^= self.0 << 25;
        self.0 ^= self.0 >> 27;
        self.0.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }
}

struct Args {
    threads: usize,
    ops_per_thread: usize,
    key_space: u64,
    rounds: usize,
}

impl Args {
    fn parse() -> Self {
        let mut it = env::args().skip(1).map(|a| a.parse::<u64>().ok());
        let mut next = |default: u64| it.next().flatten().unwrap_or(default);
        Self {
            threads: next(8) as usize,
            ops_per_thread: next(200_000) as usize,
            key_space: next(10_000).max(1),
            rounds: next(3) as usize,
        }
    }
}

// =============================================================================
// Progress Tracking
// =============================================================================

struct Progress {
    ops: Vec<AtomicUsize>,
    last_progress_ms: Vec<AtomicU64>,
    done: Vec<AtomicBool>,
    start: Instant,
}

impl Progress {
    fn new(threads: usize) -> Self {
        Self {
            ops: (0..threads).map(|_| AtomicUsize::new(0)).collect(),
            last_progress_ms: (0..threads).map(|_| AtomicU64::new(0)).collect(),
            done: (0..threads).map(|_| AtomicBool::new(false)).collect(),
            start: Instant::now(),
        }
    }

    fn update(&self, thread_id: usize, op: usize) {
        self.ops[thread_id].store(op, Ordering::Relaxed);
        self.last_progress_ms[thread_id].store(self.elapsed_ms(), Ordering::Relaxed);
    }

    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// `(thread, op, stalled_ms)` for every unfinished thread idle longer
    /// than `timeout_ms`.
    fn stalled(&self, timeout_ms: u64) -> Vec<(usize, usize, u64)> {
        let now = self.elapsed_ms();
        (0..self.done.len())
            .filter(|&t| !self.done[t].load(Ordering::Relaxed))
            .filter_map(|t| {
                let idle = now.saturating_sub(self.last_progress_ms[t].load(Ordering::Relaxed));
                (idle > timeout_ms).then(|| (t, self.ops[t].load(Ordering::Relaxed), idle))
            })
            .collect()
    }

    fn all_done(&self) -> bool {
        self.done.iter().all(|d| d.load(Ordering::Relaxed))
    }
}

// =============================================================================
// Rounds
// =============================================================================

fn run_round(round: usize, config: Config, args: &Args) -> bool {
    println!("\n{}", "=".repeat(80));
    println!(
        "round {round}: {} threads x {} ops, {} keys, {config:?}",
        args.threads, args.ops_per_thread, args.key_space
    );
    println!("{}", "=".repeat(80));

    let tree = Arc::new(BSlackTree::<u64, u64>::with_config(config));
    let progress = Arc::new(Progress::new(args.threads));

    let watchdog = {
        let progress = Arc::clone(&progress);
        thread::spawn(move || {
            while !progress.all_done() {
                thread::sleep(Duration::from_millis(500));
                for (t, op, idle) in progress.stalled(2_000) {
                    eprintln!("[T{t:02}] no progress for {idle}ms at op {op}");
                }
            }
        })
    };

    let start = Instant::now();
    let workers: Vec<_> = (0..args.threads)
        .map(|t| {
            let tree = Arc::clone(&tree);
            let progress = Arc::clone(&progress);
            let ops = args.ops_per_thread;
            let key_space = args.key_space;
            thread::spawn(move || {
                let mut rng = Rng::new(0x9e37_79b9_7f4a_7c15 ^ ((t as u64 + 1) << 17) ^ round as u64);
                for op in 0..ops {
                    let r = rng.next();
                    let key = r % key_space;
                    match (r >> 32) % 10 {
                        0..=3 => {
                            tree.put(key, r);
                        }
                        4..=6 => {
                            tree.remove(&key);
                        }
                        _ => {
                            let _ = tree.get(&key);
                        }
                    }
                    if op % 1024 == 0 {
                        progress.update(t, op);
                    }
                }
                progress.done[t].store(true, Ordering::Relaxed);
            })
        })
        .collect();

    for w in workers {
        w.join().unwrap();
    }
    let elapsed = start.elapsed();
    watchdog.join().unwrap();

    let total_ops = args.threads * args.ops_per_thread;
    println!(
        "{total_ops} ops in {elapsed:?} ({:.2} Mops/s)",
        total_ops as f64 / elapsed.as_secs_f64() / 1e6
    );
    println!("{}", tree.stats());

    match tree.validate() {
        Ok(()) => {
            println!("structure OK");
            true
        }
        Err(violation) => {
            eprintln!("INVALID: {violation}");
            false
        }
    }
}

fn main() -> ExitCode {
    bslack::init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let args = Args::parse();

    let mut ok = true;
    for round in 1..=args.rounds {
        ok &= run_round(round, config, &args);
    }

    if ok {
        println!("\nall rounds passed");
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
