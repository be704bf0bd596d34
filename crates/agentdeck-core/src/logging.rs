//! Structured logging bootstrap (§1.1).
//!
//! A thin wrapper around `tracing_subscriber`, in the same spirit as the rest
//! of the workspace's per-binary `setup_logging()` helpers: a formatter layer
//! plus an `EnvFilter` driven by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the global tracing subscriber. Safe to call once per process;
/// panics if a subscriber is already installed (mirrors `tracing`'s own
/// `set_global_default` contract).
pub fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
