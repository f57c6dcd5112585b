//! Observability (routing counters, tracing setup)

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Routing counters, shareable between nested routers
#[derive(Debug, Default)]
pub struct Metrics {
    requests_routed: AtomicU64,
    subrequests_answered: AtomicU64,
    targets_not_found: AtomicU64,
    handler_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_routed(&self) {
        self.requests_routed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "requests_routed", "Metric incremented");
    }

    pub fn subrequest_answered(&self) {
        self.subrequests_answered.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "subrequests_answered", "Metric incremented");
    }

    pub fn target_not_found(&self) {
        self.targets_not_found.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "targets_not_found", "Metric incremented");
    }

    pub fn handler_failed(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "handler_failures", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_routed: self.requests_routed.load(Ordering::Relaxed),
            subrequests_answered: self.subrequests_answered.load(Ordering::Relaxed),
            targets_not_found: self.targets_not_found.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_routed: u64,
    pub subrequests_answered: u64,
    pub targets_not_found: u64,
    pub handler_failures: u64,
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the
/// configured filter. Output goes to stderr so command output stays clean.
pub fn init_tracing(config: &LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_writer(std::io::stderr)
        .try_init()
}
