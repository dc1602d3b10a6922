//! Shared test setup.
//!
//! The console shows whatever `RUST_LOG` selects (default `warn`). The
//! NDJSON file at `$BSLACK_LOG_DIR/rebalance.jsonl` (default `logs/`) keeps
//! only the rebalancer: the `fix_weight_violation` and
//! `fix_degree_or_slack_violation` spans with their close timings, and the
//! structural events logged inside them. Both need `--features tracing` to
//! see anything from the crate.
//!
//! ```bash
//! # Split and compress steps of a failing stress test
//! jq 'select(.fields.message | test("split|compress|root replace"))' logs/rebalance.jsonl
//! ```

#![allow(dead_code)]

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Mutex, Once};

use tracing::Metadata;
use tracing_subscriber::filter::{EnvFilter, filter_fn};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry};

static INIT: Once = Once::new();

const REBALANCE_SPANS: [&str; 2] = ["fix_weight_violation", "fix_degree_or_slack_violation"];

/// Install the console and rebalance-file layers once per process.
pub fn init_tracing() {
    INIT.call_once(install);
}

/// Whether `meta` belongs to a rebalancing step.
fn is_rebalance(meta: &Metadata<'_>) -> bool {
    if meta.is_span() {
        REBALANCE_SPANS.contains(&meta.name())
    } else {
        meta.target().starts_with("bslack::tree::rebalance")
    }
}

fn log_dir() -> PathBuf {
    std::env::var_os("BSLACK_LOG_DIR").map_or_else(|| PathBuf::from("logs"), PathBuf::from)
}

fn install() {
    let console = tracing_subscriber::fmt::layer()
        .with_thread_ids(true)
        .compact()
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")));

    // A read-only checkout still gets console output.
    let dir = log_dir();
    let file = std::fs::create_dir_all(&dir).ok().and_then(|()| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("rebalance.jsonl"))
            .ok()
    });
    let rebalance = file.map(|file| {
        tracing_subscriber::fmt::layer()
            .with_writer(Mutex::new(file))
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .with_filter(filter_fn(is_rebalance))
    });

    let _ = Registry::default().with(console).with(rebalance).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
        tracing::warn!(target: "bslack::tree::rebalance", "split");
    }
}
