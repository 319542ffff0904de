//! Telemetry for the optimization loop (§4.9, ambient addition).
//!
//! Every iteration step emits a `tracing::info_span!("iteration", ...)`
//! wrapping its LLM and simulator calls; this module additionally keeps a
//! small set of atomic counters so the CLI's `info`/`results` subcommands
//! and tests can read a point-in-time [`TelemetrySnapshot`] without
//! depending on a tracing subscriber being installed. No external exporter
//! is wired up by default — this is a metrics-tracking placeholder, the
//! same role OpenTelemetry integration would eventually fill.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Atomic counters accumulated over the lifetime of one `OptimizationLoop`.
pub struct Telemetry {
    iterations_run: AtomicU64,
    proposals_accepted: AtomicU64,
    proposals_rejected: AtomicU64,
    rejection_reasons: Mutex<HashMap<String, u64>>,
    llm_calls: AtomicU64,
    llm_errors: AtomicU64,
    simulator_calls: AtomicU64,
    total_iteration_latency_ms: AtomicU64,
}

impl Telemetry {
    /// A fresh counter set, as held by a newly constructed `OptimizationLoop`.
    pub fn new() -> Self {
        Self {
            iterations_run: AtomicU64::new(0),
            proposals_accepted: AtomicU64::new(0),
            proposals_rejected: AtomicU64::new(0),
            rejection_reasons: Mutex::new(HashMap::new()),
            llm_calls: AtomicU64::new(0),
            llm_errors: AtomicU64::new(0),
            simulator_calls: AtomicU64::new(0),
            total_iteration_latency_ms: AtomicU64::new(0),
        }
    }

    /// Record one completed iteration step and its wall-clock latency.
    pub fn record_iteration(&self, latency_ms: u64) {
        self.iterations_run.fetch_add(1, Ordering::Relaxed);
        self.total_iteration_latency_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
    }

    /// Record one accepted proposal.
    pub fn record_accepted(&self) {
        self.proposals_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one rejected proposal under its reason category (e.g.
    /// `"constraint"`, `"parse"`, `"llm-transport"`, `"no-improvement"`).
    pub fn record_rejected(&self, reason: &str) {
        self.proposals_rejected.fetch_add(1, Ordering::Relaxed);
        let mut reasons = self.rejection_reasons.lock().expect("rejection reasons lock poisoned");
        *reasons.entry(reason.to_string()).or_insert(0) += 1;
    }

    /// Record one LLM call, successful or not.
    pub fn record_llm_call(&self, succeeded: bool) {
        self.llm_calls.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.llm_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record one simulator invocation.
    pub fn record_simulator_call(&self) {
        self.simulator_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// A point-in-time read of every counter.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let iterations_run = self.iterations_run.load(Ordering::Relaxed);
        let total_latency = self.total_iteration_latency_ms.load(Ordering::Relaxed);
        let avg_iteration_latency_ms = if iterations_run > 0 {
            total_latency as f64 / iterations_run as f64
        } else {
            0.0
        };

        TelemetrySnapshot {
            iterations_run,
            proposals_accepted: self.proposals_accepted.load(Ordering::Relaxed),
            proposals_rejected: self.proposals_rejected.load(Ordering::Relaxed),
            rejection_reasons: self
                .rejection_reasons
                .lock()
                .expect("rejection reasons lock poisoned")
                .clone(),
            llm_calls: self.llm_calls.load(Ordering::Relaxed),
            llm_errors: self.llm_errors.load(Ordering::Relaxed),
            simulator_calls: self.simulator_calls.load(Ordering::Relaxed),
            avg_iteration_latency_ms,
        }
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time counters exposed to the CLI's `info`/`results` subcommands
/// and to tests (§3.1).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub iterations_run: u64,
    pub proposals_accepted: u64,
    pub proposals_rejected: u64,
    pub rejection_reasons: HashMap<String, u64>,
    pub llm_calls: u64,
    pub llm_errors: u64,
    pub simulator_calls: u64,
    pub avg_iteration_latency_ms: f64,
}
