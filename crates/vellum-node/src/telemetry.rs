//! Structured logging setup.
//!
//! One subscriber for the whole process, filterable through `RUST_LOG`.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber; safe to call more than once.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
