//! Observability: tracing setup, anomaly hooks, and in-process metrics.
//!
//! Anomalies absorbed by the dispatcher (bad envelopes, unknown methods,
//! failing handlers) are logged, counted, and handed to any registered hook so
//! hosts can surface them.

pub mod hook;
pub mod metrics;

use tracing_subscriber::{fmt, EnvFilter};

pub use hook::{Anomaly, AnomalyHooks};
pub use metrics::LinkMetrics;

/// Install a fmt subscriber filtered by `RUST_LOG`. Safe to call more than once.
pub fn init_tracing() {
    let _ = fmt().with_env_filter(EnvFilter::from_default_env()).try_init();
}
