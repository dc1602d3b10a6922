//! Loom tests for the node / descriptor reference-count protocol.
//!
//! The model mirrors `Node::try_acquire` and `Node::release`: a count that
//! can be raised only while it is non-zero, where the thread that drops it
//! to zero owns the teardown.
//!
//! Run with: `RUSTFLAGS="--cfg loom" cargo test --lib scx::loom_tests`

use loom::sync::Arc;
use loom::sync::atomic::{AtomicUsize, Ordering, fence};
use loom::thread;

/// A reference-counted cell that records how often it was torn down.
struct Counted {
    refs: AtomicUsize,
    frees: AtomicUsize,
}

impl Counted {
    fn new(refs: usize) -> Self {
        Self {
            refs: AtomicUsize::new(refs),
            frees: AtomicUsize::new(0),
        }
    }

    fn try_acquire(&self) -> bool {
        let mut current = self.refs.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return false;
            }
            match self
                .refs
                .compare_exchange_weak(current, current + 1, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self) {
        if self.refs.fetch_sub(1, Ordering::Release) == 1 {
            fence(Ordering::Acquire);
            self.frees.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Unlinking (dropping the link reference) races with a pin. The cell is
/// torn down exactly once, and a pin never revives a dead cell.
#[test]
fn test_loom_pin_vs_unlink() {
    loom::model(|| {
        let cell = Arc::new(Counted::new(1));

        let c1 = Arc::clone(&cell);
        let unlinker = thread::spawn(move || c1.release());

        let c2 = Arc::clone(&cell);
        let pinner = thread::spawn(move || {
            if c2.try_acquire() {
                c2.release();
            }
        });

        unlinker.join().unwrap();
        pinner.join().unwrap();

        assert_eq!(cell.frees.load(Ordering::Relaxed), 1);
        assert_eq!(cell.refs.load(Ordering::Relaxed), 0);
    });
}

/// Two pins released concurrently with the link: still exactly one teardown.
#[test]
fn test_loom_two_pins_one_free() {
    loom::model(|| {
        // Link reference plus two pins already taken.
        let cell = Arc::new(Counted::new(3));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let c = Arc::clone(&cell);
                thread::spawn(move || c.release())
            })
            .collect();
        cell.release();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(cell.frees.load(Ordering::Relaxed), 1);
    });
}

/// Once the count is zero no thread can take a reference.
#[test]
fn test_loom_dead_cell_stays_dead() {
    loom::model(|| {
        let cell = Arc::new(Counted::new(1));
        cell.release();

        let c = Arc::clone(&cell);
        let late = thread::spawn(move || c.try_acquire());

        assert!(!late.join().unwrap());
        assert_eq!(cell.frees.load(Ordering::Relaxed), 1);
    });
}
