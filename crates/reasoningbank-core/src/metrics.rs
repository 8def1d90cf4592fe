//! Counters.
//!
//! [`METRICS`] holds process-wide atomic counters that are flushed as a single
//! `info!` event at natural boundaries. [`LeakageMetrics`] is the per-run
//! instrumentation attached to every [`crate::runner::RunResult`]; a fresh one
//! is created for each run.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    runs: AtomicU64,
    tool_calls: AtomicU64,
    large_returns: AtomicU64,
    items_stored: AtomicU64,
    duplicates_rejected: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs: AtomicU64::new(0),
            tool_calls: AtomicU64::new(0),
            large_returns: AtomicU64::new(0),
            items_stored: AtomicU64::new(0),
            duplicates_rejected: AtomicU64::new(0),
        }
    }

    pub fn inc_runs(&self) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs", "counter incremented");
    }

    pub fn inc_tool_calls(&self) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tool_calls", "counter incremented");
    }

    pub fn inc_large_returns(&self) {
        self.large_returns.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "large_returns", "counter incremented");
    }

    pub fn add_items_stored(&self, n: u64) {
        self.items_stored.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_duplicates_rejected(&self, n: u64) {
        self.duplicates_rejected.fetch_add(n, Ordering::Relaxed);
    }

    /// Emit all counters as one `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            runs = self.runs(),
            tool_calls = self.tool_calls(),
            large_returns = self.large_returns(),
            items_stored = self.items_stored(),
            duplicates_rejected = self.duplicates_rejected(),
        );
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn tool_calls(&self) -> u64 {
        self.tool_calls.load(Ordering::Relaxed)
    }

    pub fn large_returns(&self) -> u64 {
        self.large_returns.load(Ordering::Relaxed)
    }

    pub fn items_stored(&self) -> u64 {
        self.items_stored.load(Ordering::Relaxed)
    }

    pub fn duplicates_rejected(&self) -> u64 {
        self.duplicates_rejected.load(Ordering::Relaxed)
    }
}

/// Per-run leakage instrumentation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakageMetrics {
    /// Characters of tool output fed back into the transcript.
    pub stdout_chars: usize,
    /// Tool returns longer than the large-return threshold.
    pub large_returns: usize,
    /// Tool invocations, including failed ones.
    pub tool_calls: usize,
    /// Language-model invocations.
    pub subcalls: usize,
    /// Names of the tools that produced large returns, in call order.
    #[serde(default)]
    pub large_return_tools: Vec<String>,
}

impl LeakageMetrics {
    /// Record one tool return of `chars` characters.
    pub fn record_return(&mut self, tool: &str, chars: usize, threshold: usize) -> bool {
        self.tool_calls += 1;
        self.stdout_chars += chars;
        let large = chars > threshold;
        if large {
            self.large_returns += 1;
            self.large_return_tools.push(tool.to_string());
        }
        large
    }

    pub fn record_subcall(&mut self) {
        self.subcalls += 1;
    }

    /// Whether any tool broke the handle discipline during the run.
    pub fn leaked(&self) -> bool {
        self.large_returns > 0
    }
}
