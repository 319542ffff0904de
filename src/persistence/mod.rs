//! Event-sourced persistence (§4.8): a `StateProvider` protocol with two
//! implementations sharing one method contract so that replay needs nothing
//! beyond what was durably written during the original run.
//!
//! [`LiveStateProvider`] is the read/write side used while a run is in
//! progress; [`DatabaseStateProvider`] is a read-only view over a completed
//! run, built straight from the same three tables. Both return the exact
//! same shapes for the same queries (Replay Identity).

pub mod database;
pub mod live;

pub use database::DatabaseStateProvider;
pub use live::LiveStateProvider;

use crate::domain::{Cents, RunId};
use crate::error::Result;
use crate::record::{EventRecord, ExperimentRecord};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Read surface shared by both the live and replay providers.
#[async_trait]
pub trait StateProvider: Send + Sync {
    /// The run this provider serves.
    fn run_id(&self) -> RunId;

    /// The run's metadata record as currently known.
    async fn get_run_metadata(&self) -> Result<ExperimentRecord>;

    /// Count of iterations durably recorded so far.
    async fn get_total_iterations(&self) -> Result<u32>;

    /// Every event recorded during one iteration, in sequence order.
    async fn get_iteration_events(&self, iteration: u32) -> Result<Vec<EventRecord>>;

    /// The `trees`-keyed policy snapshot recorded for one iteration.
    async fn get_iteration_policies(&self, iteration: u32) -> Result<serde_json::Value>;

    /// Each agent's total cost as of one iteration.
    async fn get_iteration_costs(&self, iteration: u32) -> Result<BTreeMap<String, Cents>>;

    /// Which agents' proposals were accepted at one iteration.
    async fn get_iteration_accepted_changes(&self, iteration: u32) -> Result<serde_json::Value>;

    /// Every event recorded for the run, in sequence order.
    async fn get_all_events(&self) -> Result<Vec<EventRecord>>;

    /// The run's metadata record once it has reached a terminal state.
    async fn get_final_result(&self) -> Result<ExperimentRecord>;
}

/// Write surface, implemented only by [`LiveStateProvider`]. Kept as a
/// separate trait so a `DatabaseStateProvider` can never be handed to code
/// that expects to mutate the run it is replaying.
#[async_trait]
pub trait WritableStateProvider: StateProvider {
    /// Buffer one event under the given iteration. Not durable until the
    /// enclosing `record_iteration` call commits (group commit, §4.8).
    async fn record_event(&self, iteration: u32, event_type: &str, data: serde_json::Value) -> Result<()>;

    /// Durably commit one iteration's row together with every event
    /// buffered for it since the previous commit.
    async fn record_iteration(
        &self,
        iteration: u32,
        costs_per_agent: BTreeMap<String, Cents>,
        accepted_changes: serde_json::Value,
        policies: serde_json::Value,
    ) -> Result<()>;

    /// Finalize the run's metadata row.
    async fn set_converged(&self, num_iterations: u32, reason: Option<String>) -> Result<()>;
}
