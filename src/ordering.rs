//! Memory orderings for node and descriptor coordination.
//!
//! Every atomic access in the crate names one of these constants so the
//! intent is visible at the call site.

use std::sync::atomic::Ordering;

/// Ordering for following child pointers during a descent.
/// Pairs with the `SCX_ORD` child CAS that published the node.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Ordering for every LLX/SCX coordination access: descriptor slots,
/// descriptor state, `all_frozen`, `finalized`, and the child CAS.
///
/// LLX reads `finalized`, then the descriptor slot, then the descriptor
/// state, and the freeze/mark/commit steps write them in the opposite
/// order. The protocol needs a single total order across those locations.
pub const SCX_ORD: Ordering = Ordering::SeqCst;

/// Ordering for taking a reference (increment-if-nonzero CAS success).
pub const REF_ACQUIRE: Ordering = Ordering::Acquire;

/// Ordering for dropping a reference.
/// The thread that drops the last one issues an `Acquire` fence before retiring.
pub const REF_RELEASE: Ordering = Ordering::Release;

/// Ordering for plain counters and failed reference CAS attempts.
pub const RELAXED: Ordering = Ordering::Relaxed;
