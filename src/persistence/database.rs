//! [`DatabaseStateProvider`]: a read-only `StateProvider` over a completed
//! run, used for replay and for the `results`/`replay` CLI subcommands.

use super::live::{
    fetch_all_events, fetch_experiment, fetch_iteration_column, fetch_iteration_events,
    fetch_total_iterations,
};
use super::StateProvider;
use crate::domain::{Cents, RunId};
use crate::error::Result;
use crate::record::{EventRecord, ExperimentRecord};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

/// Read-only view over one run's persisted rows. Returns exactly the same
/// shapes `LiveStateProvider` would have returned while the run was live
/// (Replay Identity, §4.8).
pub struct DatabaseStateProvider {
    pool: SqlitePool,
    run_id: RunId,
}

impl DatabaseStateProvider {
    /// Open a replay view over `run_id` using an already-connected pool.
    pub fn new(pool: SqlitePool, run_id: RunId) -> Self {
        Self { pool, run_id }
    }
}

#[async_trait]
impl StateProvider for DatabaseStateProvider {
    fn run_id(&self) -> RunId {
        self.run_id
    }

    async fn get_run_metadata(&self) -> Result<ExperimentRecord> {
        fetch_experiment(&self.pool, self.run_id).await
    }

    async fn get_total_iterations(&self) -> Result<u32> {
        fetch_total_iterations(&self.pool, self.run_id).await
    }

    async fn get_iteration_events(&self, iteration: u32) -> Result<Vec<EventRecord>> {
        fetch_iteration_events(&self.pool, self.run_id, iteration).await
    }

    async fn get_iteration_policies(&self, iteration: u32) -> Result<serde_json::Value> {
        fetch_iteration_column(&self.pool, self.run_id, iteration, "policies_json").await
    }

    async fn get_iteration_costs(&self, iteration: u32) -> Result<BTreeMap<String, Cents>> {
        let value = fetch_iteration_column(&self.pool, self.run_id, iteration, "costs_json").await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn get_iteration_accepted_changes(&self, iteration: u32) -> Result<serde_json::Value> {
        fetch_iteration_column(&self.pool, self.run_id, iteration, "accepted_json").await
    }

    async fn get_all_events(&self) -> Result<Vec<EventRecord>> {
        fetch_all_events(&self.pool, self.run_id).await
    }

    async fn get_final_result(&self) -> Result<ExperimentRecord> {
        fetch_experiment(&self.pool, self.run_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{LiveStateProvider, WritableStateProvider};
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn replay_reproduces_live_reads_for_a_completed_run() {
        let pool = pool().await;
        let run_id = RunId::new();
        let record = ExperimentRecord::start(run_id, "demo", json!({"master_seed": 7}));
        let live = LiveStateProvider::start(pool.clone(), &record).await.unwrap();

        live.record_event(0, "llm_interaction", json!({"agent_id": "alice"}))
            .await
            .unwrap();
        let mut costs = BTreeMap::new();
        costs.insert("alice".to_string(), 500);
        live.record_iteration(0, costs.clone(), json!({"alice": true}), json!({"alice": {}}))
            .await
            .unwrap();
        live.set_converged(1, Some("stability".to_string())).await.unwrap();

        let replay = DatabaseStateProvider::new(pool, run_id);
        assert_eq!(replay.get_total_iterations().await.unwrap(), 1);
        assert_eq!(replay.get_iteration_costs(0).await.unwrap(), costs);
        assert_eq!(replay.get_iteration_events(0).await.unwrap().len(), 1);

        let result = replay.get_final_result().await.unwrap();
        assert!(result.converged);
        assert_eq!(result.convergence_reason.as_deref(), Some("stability"));
    }
}
