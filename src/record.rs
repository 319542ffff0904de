//! Event-sourced record types persisted across a run (§3): the
//! append-only shapes every [`crate::persistence::StateProvider`]
//! implementation reads and writes, and that [`crate::context::ContextBuilder`]
//! folds into an agent's `iteration_history`.
//!
//! These types are deliberately "dumb" data — no behavior beyond
//! construction helpers — so that a `DatabaseStateProvider` replaying from
//! JSON columns can produce the exact same values a `LiveStateProvider` held
//! in memory during the original run (Replay Identity, §4.8).

use crate::domain::{now_iso8601, Cents, RunId};
use crate::evaluator::PairedDelta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One agent's outcome for one iteration: proposed policy, whether it was
/// accepted, and the paired cost statistics that decided it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub agent_id: String,
    /// The LLM's proposed policy, stored verbatim regardless of acceptance
    /// (a rejected proposal is still of record, §7).
    pub proposed_policy: serde_json::Value,
    pub accepted: bool,
    /// `None` for iteration steps that never reached paired evaluation
    /// (constraint/parse/transport rejections, §4.6 step e).
    pub mean_delta: Option<f64>,
    pub baseline_cost: Cents,
    /// `None` alongside `mean_delta` for the same reason.
    pub proposal_cost: Option<Cents>,
    /// Every agent's current total cost as of this iteration, keyed by
    /// agent id — `OptimizationLoop`'s per-iteration cost summary (§4.6
    /// step 2's `costs_per_agent`).
    pub costs_per_agent: BTreeMap<String, Cents>,
    /// Non-empty only for a rejection; names the cause category (e.g.
    /// `"constraint-violation"`, `"policy-parse"`, `"llm-transport"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub timestamp: String,
}

impl IterationRecord {
    /// Build an accepted iteration record from a computed paired-delta
    /// sequence.
    #[allow(clippy::too_many_arguments)]
    pub fn accepted(
        iteration: u32,
        agent_id: impl Into<String>,
        proposed_policy: serde_json::Value,
        deltas: &[PairedDelta],
        baseline_cost: Cents,
        proposal_cost: Cents,
        costs_per_agent: BTreeMap<String, Cents>,
    ) -> Self {
        Self {
            iteration,
            agent_id: agent_id.into(),
            proposed_policy,
            accepted: true,
            mean_delta: Some(crate::evaluator::mean_delta(deltas)),
            baseline_cost,
            proposal_cost: Some(proposal_cost),
            costs_per_agent,
            rejection_reason: None,
            timestamp: now_iso8601(),
        }
    }

    /// Build a rejected iteration record. `mean_delta`/`proposal_cost` are
    /// populated when the rejection happened after paired evaluation (the
    /// proposal validated and simulated, but its delta was non-positive);
    /// pass `None` for rejections that never reached evaluation.
    #[allow(clippy::too_many_arguments)]
    pub fn rejected(
        iteration: u32,
        agent_id: impl Into<String>,
        proposed_policy: serde_json::Value,
        reason: impl Into<String>,
        mean_delta: Option<f64>,
        baseline_cost: Cents,
        proposal_cost: Option<Cents>,
        costs_per_agent: BTreeMap<String, Cents>,
    ) -> Self {
        Self {
            iteration,
            agent_id: agent_id.into(),
            proposed_policy,
            accepted: false,
            mean_delta,
            baseline_cost,
            proposal_cost,
            costs_per_agent,
            rejection_reason: Some(reason.into()),
            timestamp: now_iso8601(),
        }
    }

    /// The cost this agent carries forward after this iteration: the
    /// proposal cost if accepted, the baseline cost otherwise.
    pub fn effective_cost(&self) -> Cents {
        if self.accepted {
            self.proposal_cost.unwrap_or(self.baseline_cost)
        } else {
            self.baseline_cost
        }
    }
}

/// Run-level metadata, created at run start and finalized at completion or
/// abort (§3 Lifecycle).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub run_id: RunId,
    pub experiment_name: String,
    /// Canonical JSON snapshot of the `ExperimentConfig` this run was
    /// launched from (`ExperimentConfig::config_snapshot`).
    pub config_snapshot: serde_json::Value,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub num_iterations: u32,
    pub converged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convergence_reason: Option<String>,
}

impl ExperimentRecord {
    /// A freshly started run: not yet completed, zero iterations, not
    /// converged.
    pub fn start(
        run_id: RunId,
        experiment_name: impl Into<String>,
        config_snapshot: serde_json::Value,
    ) -> Self {
        Self {
            run_id,
            experiment_name: experiment_name.into(),
            config_snapshot,
            created_at: now_iso8601(),
            completed_at: None,
            num_iterations: 0,
            converged: false,
            convergence_reason: None,
        }
    }
}

/// The terminal states an [`crate::optimize::OptimizationLoop`] can reach,
/// and the `Idle`/`Running` states it passes through to get there (§4.6
/// state machine). Once terminal, a run never transitions again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunState {
    Idle,
    Running,
    Converged,
    MaxIterations,
    Aborted,
}

impl RunState {
    /// Whether this state is final — no further iterations will run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Converged | RunState::MaxIterations | RunState::Aborted
        )
    }
}

/// One persisted event in a run's total order (§3, §4.8). `sequence` is a
/// monotonic counter local to the run, assigned once by the
/// `LiveStateProvider` that records it and never reassigned on replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    pub iteration: u32,
    /// Event kind, e.g. `"llm_interaction"`, `"iteration_completed"`,
    /// `"run_aborted"`.
    pub event_type: String,
    /// Full, self-describing event payload — every field a replay needs to
    /// render is here, never just an id requiring re-computation (§9).
    pub event_data: serde_json::Value,
    pub timestamp: String,
}

impl EventRecord {
    /// Construct an event record with the current wall-clock timestamp.
    pub fn new(
        sequence: u64,
        iteration: u32,
        event_type: impl Into<String>,
        event_data: serde_json::Value,
    ) -> Self {
        Self {
            sequence,
            iteration,
            event_type: event_type.into(),
            event_data,
            timestamp: now_iso8601(),
        }
    }
}
