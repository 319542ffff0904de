//! Builds the per-agent context handed to the LLM each iteration (§4.3).
//!
//! One [`ContextBuilder`] serves all three evaluation modes uniformly: the
//! mode-specific pieces of a call are carried entirely in [`ModeMetadata`],
//! a closed enum rather than an open trait, so adding a fourth mode is a
//! compile-time-checked match arm rather than a new dynamic-dispatch
//! implementation (Design Notes, §9).
//!
//! Context Identity contract: for the same [`crate::evaluator::PolicyEvaluation`]
//! and agent, every mode produces byte-identical `simulation_output` and
//! `cost_breakdown`; only `mode_metadata` differs. This is why every
//! `build_*` method below funnels through the same `build_common` helper
//! rather than duplicating the simulation-output/cost-breakdown logic per
//! mode.

use crate::domain::Cents;
use crate::evaluator::PolicyEvaluation;
use crate::record::IterationRecord;
use crate::simulator::{BootstrapEvent, SimulationOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default cap on the number of events included in a single agent's
/// context, applied after priority sorting.
pub const DEFAULT_EVENT_CAP: usize = 50;

/// Relative importance of an event kind when a run produced more events
/// than the context window allows. Lower variant = higher priority
/// (sorted ascending, so `PolicyDecision` events are kept first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EventPriority {
    PolicyDecision,
    Overdraft,
    Delay,
    QueueRelease,
    Settlement,
    Arrival,
    Other,
}

impl EventPriority {
    fn of(kind: &str) -> Self {
        match kind {
            "policy_decision" => EventPriority::PolicyDecision,
            "overdraft" => EventPriority::Overdraft,
            "delay" => EventPriority::Delay,
            "queue_release" => EventPriority::QueueRelease,
            "settlement" => EventPriority::Settlement,
            "arrival" => EventPriority::Arrival,
            _ => EventPriority::Other,
        }
    }
}

/// Mode-specific metadata carried alongside the common context fields.
///
/// The `kind` tag is serialized so the LLM-facing JSON makes the active
/// mode explicit rather than leaving it implicit in which optional fields
/// happen to be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ModeMetadata {
    /// Bootstrap mode: summary statistics across the iteration's sample set.
    Bootstrap {
        best_seed: u64,
        worst_seed: u64,
        num_samples: usize,
        mean_cost: f64,
        cost_std: f64,
    },
    /// Deterministic-pairwise mode: a single fixed scenario seed, no
    /// temporal carry-over between iterations.
    DeterministicPairwise { scenario_seed: u64 },
    /// Deterministic-temporal mode: a single fixed scenario seed, with this
    /// agent's prior accepted iteration costs threaded through as history
    /// (SPEC_FULL.md §4.2.1 — continuity is carried here, not via seed
    /// chaining).
    DeterministicTemporal {
        scenario_seed: u64,
        iteration_cost_history: Vec<Cents>,
    },
}

/// The full context handed to the LLM for one agent in one iteration.
///
/// Agent Isolation invariant (§4.3, testable property #8): every event in
/// `simulation_output` and every record in `iteration_history` belongs to
/// `agent_id` — no other agent's policy, costs, or events ever appear here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMAgentContext {
    pub agent_id: String,
    pub iteration: u32,
    pub current_policy: serde_json::Value,
    /// Textual, chronologically-reordered trace of the best sample's
    /// events, priority-filtered and capped (§4.3).
    pub simulation_output: String,
    /// Cost component name -> integer cents, averaged over samples in
    /// bootstrap mode, the single evaluated value otherwise.
    pub cost_breakdown: BTreeMap<String, Cents>,
    /// Prior accepted proposals and their costs for this agent only.
    pub iteration_history: Vec<IterationRecord>,
    pub current_cost: Cents,
    pub mode_metadata: ModeMetadata,
}

/// Builds [`LLMAgentContext`] values from an agent's baseline evaluation.
///
/// Takes the *baseline* [`PolicyEvaluation`] — evaluated before any
/// proposal exists (§4.6 step c runs before step d) — never a paired
/// baseline/proposal result, so that the LLM's own proposal cannot leak
/// into the context it is given to produce that proposal.
pub struct ContextBuilder {
    event_cap: usize,
}

impl ContextBuilder {
    /// A context builder using [`DEFAULT_EVENT_CAP`].
    pub fn new() -> Self {
        Self {
            event_cap: DEFAULT_EVENT_CAP,
        }
    }

    /// A context builder with a caller-supplied event cap.
    pub fn with_event_cap(event_cap: usize) -> Self {
        Self { event_cap }
    }

    /// Build the bootstrap-mode context for one agent from its baseline
    /// evaluation, deriving summary statistics across the sample set.
    pub fn build_bootstrap(
        &self,
        agent_id: &str,
        iteration: u32,
        current_policy: &serde_json::Value,
        baseline: &PolicyEvaluation,
        iteration_history: Vec<IterationRecord>,
    ) -> LLMAgentContext {
        let best = baseline.best_outcome();
        let worst = baseline.worst_outcome();

        self.build_common(
            agent_id,
            iteration,
            current_policy,
            baseline,
            iteration_history,
            ModeMetadata::Bootstrap {
                best_seed: best.map(|o| o.seed).unwrap_or_default(),
                worst_seed: worst.map(|o| o.seed).unwrap_or_default(),
                num_samples: baseline.samples.len(),
                mean_cost: baseline.mean_cost(),
                cost_std: baseline.cost_std(),
            },
        )
    }

    /// Build a deterministic-pairwise-mode context: no temporal history.
    pub fn build_deterministic_pairwise(
        &self,
        agent_id: &str,
        iteration: u32,
        current_policy: &serde_json::Value,
        baseline: &PolicyEvaluation,
        iteration_history: Vec<IterationRecord>,
        scenario_seed: u64,
    ) -> LLMAgentContext {
        self.build_common(
            agent_id,
            iteration,
            current_policy,
            baseline,
            iteration_history,
            ModeMetadata::DeterministicPairwise { scenario_seed },
        )
    }

    /// Build a deterministic-temporal-mode context, threading the agent's
    /// accepted cost history through `iteration_cost_history`.
    pub fn build_deterministic_temporal(
        &self,
        agent_id: &str,
        iteration: u32,
        current_policy: &serde_json::Value,
        baseline: &PolicyEvaluation,
        iteration_history: Vec<IterationRecord>,
        scenario_seed: u64,
        iteration_cost_history: Vec<Cents>,
    ) -> LLMAgentContext {
        self.build_common(
            agent_id,
            iteration,
            current_policy,
            baseline,
            iteration_history,
            ModeMetadata::DeterministicTemporal {
                scenario_seed,
                iteration_cost_history,
            },
        )
    }

    /// The mode-independent core shared by all three `build_*` entry
    /// points: `simulation_output`, `cost_breakdown`, and `current_cost` are
    /// computed exactly once here, which is what makes Context Identity
    /// (§4.3) a structural property rather than something each mode has to
    /// separately honor.
    fn build_common(
        &self,
        agent_id: &str,
        iteration: u32,
        current_policy: &serde_json::Value,
        baseline: &PolicyEvaluation,
        iteration_history: Vec<IterationRecord>,
        mode_metadata: ModeMetadata,
    ) -> LLMAgentContext {
        let simulation_output = baseline
            .best_outcome()
            .map(|outcome| self.render_simulation_output(outcome))
            .unwrap_or_default();

        LLMAgentContext {
            agent_id: agent_id.to_string(),
            iteration,
            current_policy: current_policy.clone(),
            simulation_output,
            cost_breakdown: baseline.average_cost_breakdown(),
            iteration_history,
            current_cost: baseline.current_cost(),
            mode_metadata,
        }
    }

    /// Render the best sample's events as a deterministic, priority- and
    /// time-ordered text trace. No wall clocks; costs render as plain
    /// integers (never floating point) to keep the text byte-identical
    /// across replay runs.
    fn render_simulation_output(&self, outcome: &SimulationOutcome) -> String {
        let mut events: Vec<&BootstrapEvent> = outcome.events.iter().collect();
        events.sort_by_key(|e| (EventPriority::of(&e.kind), e.tick));
        events
            .into_iter()
            .take(self.event_cap)
            .map(|event| format!("[tick {}] {}: {}", event.tick, event.kind, event.detail))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
