//! Utility modules

pub mod memory_store;
pub mod validation;

pub use memory_store::*;
pub use validation::*;

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initializes the global tracing subscriber with sensible defaults.
///
/// Honors `RUST_LOG`; defaults this crate to `info`. Safe to call more
/// than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter =
            EnvFilter::from_default_env().add_directive("reconcile_core=info".parse().unwrap());

        fmt().with_env_filter(filter).init();
    });
}
