//! The boundary to the external, deterministic payment-system simulator
//! (§5). This crate never implements simulator internals — it defines the
//! contract the optimization loop evaluates policies against, and adapts to
//! whatever concrete simulator is linked in at the binary's edge.

mod process;

pub use process::ProcessSimulator;

use crate::domain::Cents;
use crate::policy::Policy;
use serde::{Deserialize, Serialize};

/// Cost components the simulator reports for one completed run. `total_cost`
/// must equal the sum of the other four fields; callers that construct this
/// directly (tests, stub simulators) are responsible for the invariant, and
/// `CostBreakdown::total` recomputes it rather than trusting a stored field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Cost accrued while payments sat queued awaiting liquidity or priority.
    pub delay_cost: Cents,
    /// Cost accrued from negative account balances (overdraft facility usage).
    pub overdraft_cost: Cents,
    /// Penalty applied to payments that missed their stated deadline.
    pub deadline_penalty: Cents,
    /// Penalty applied to payments still unsettled at end of day.
    pub eod_penalty: Cents,
}

impl CostBreakdown {
    /// Sum of all four cost components.
    pub fn total(&self) -> Cents {
        self.delay_cost + self.overdraft_cost + self.deadline_penalty + self.eod_penalty
    }
}

/// One simulator-emitted event surfaced to the LLM context builder, ranked
/// by [`crate::context::EventPriority`] when a run produces more events
/// than the context window allows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapEvent {
    /// Simulated tick the event occurred at.
    pub tick: u32,
    /// Event kind, e.g. `"overdraft"`, `"delay"`, `"queue_release"`,
    /// `"settlement"`, `"arrival"`, `"policy_decision"`.
    pub kind: String,
    /// Free-form event payload, passed through to the LLM context verbatim.
    pub detail: serde_json::Value,
}

/// The full result of evaluating one policy against one seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationOutcome {
    /// Seed this outcome was produced from.
    pub seed: u64,
    /// Cost components for this run.
    pub costs: CostBreakdown,
    /// Fraction of arrived payments settled by end of day, in `[0,1]`.
    pub settlement_rate: f64,
    /// Mean settlement delay across settled payments, in ticks.
    pub avg_delay: f64,
    /// Events emitted during the run, in chronological order, already
    /// filtered by the simulator to `agent_id` (Agent Isolation, §4.2).
    pub events: Vec<BootstrapEvent>,
}

impl SimulationOutcome {
    /// Convenience accessor for `costs.total()`.
    pub fn total_cost(&self) -> Cents {
        self.costs.total()
    }
}

/// The contract an external payment-system simulator must satisfy to be
/// evaluated against. Synchronous and non-yielding (§7): the optimization
/// loop's only suspension points are LLM calls and database commits, so a
/// simulator run must never hold the loop's single task across an await.
pub trait Simulator: Send + Sync {
    /// Run one simulation of `policy` for `agent_id`, seeded with `seed`,
    /// for `ticks` simulated ticks.
    fn run(
        &self,
        agent_id: &str,
        policy: &Policy,
        seed: u64,
        ticks: u32,
    ) -> crate::error::Result<SimulationOutcome>;
}
