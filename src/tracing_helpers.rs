//! Zero-cost tracing helpers.
//!
//! With the `tracing` feature these macros forward to the `tracing` crate.
//! Without it (the default) they expand to nothing.
//!
//! # Usage
//!
//! ```bash
//! # Normal build, no tracing overhead
//! cargo build --release
//!
//! # Watch the rebalancer work
//! RUST_LOG=bslack::tree::rebalance=debug cargo test --features tracing stress
//! ```
//!
//! Spans on whole operations use
//! `#[cfg_attr(feature = "tracing", tracing::instrument(...))]`, which is also
//! a no-op when the feature is off.

#![allow(unused_macros, unused_imports)]

/// Trace-level logging (retries, hand-offs). No-op without `tracing`.
#[cfg(feature = "tracing")]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

/// Debug-level logging (structural steps). No-op without `tracing`.
#[cfg(feature = "tracing")]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

/// Warn-level logging. No-op without `tracing`.
#[cfg(feature = "tracing")]
macro_rules! warn_log {
    ($($arg:tt)*) => {
        tracing::warn!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! warn_log {
    ($($arg:tt)*) => {};
}

pub(crate) use debug_log;
pub(crate) use trace_log;
pub(crate) use warn_log;
