//! End-to-end scenarios driving the full optimization loop against an
//! in-memory store, the way the `run` CLI subcommand drives it against a
//! real database and a real simulator process.

use policy_optimizer::config::ExperimentConfig;
use policy_optimizer::constraints::{ParameterConstraint, ParameterType, ScenarioConstraints};
use policy_optimizer::convergence::ConvergenceReason;
use policy_optimizer::domain::{Cents, RunId};
use policy_optimizer::error::Result;
use policy_optimizer::llm::StubLlmClient;
use policy_optimizer::optimize::OptimizationLoop;
use policy_optimizer::persistence::{DatabaseStateProvider, LiveStateProvider, StateProvider};
use policy_optimizer::policy::Policy;
use policy_optimizer::record::ExperimentRecord;
use policy_optimizer::simulator::{BootstrapEvent, CostBreakdown, SimulationOutcome, Simulator};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tempfile::TempDir;

async fn in_memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

fn experiment(dir: &TempDir, agents: &[&str], yaml_extra: &str) -> ExperimentConfig {
    let agents_yaml = agents
        .iter()
        .map(|a| format!("  - {a}"))
        .collect::<Vec<_>>()
        .join("\n");
    let yaml = format!(
        r#"
name: end-to-end
master_seed: 11
optimized_agents:
{agents_yaml}
scenario: rtgs-basic
evaluation:
  mode: deterministic-pairwise
  ticks: 20
llm:
  model: "anthropic:claude-sonnet-4"
  system_prompt: "propose a cheaper settlement policy"
{yaml_extra}
"#
    );
    let path = dir.path().join("experiment.yaml");
    std::fs::write(&path, yaml).unwrap();
    ExperimentConfig::load(&path).unwrap()
}

async fn started_state(pool: SqlitePool, name: &str) -> LiveStateProvider {
    let run_id = RunId::new();
    let record = ExperimentRecord::start(run_id, name, json!({}));
    LiveStateProvider::start(pool, &record).await.unwrap()
}

/// Cost depends only on whether a tree named "cheaper" is present; isolated
/// per agent_id so two agents evaluated in the same iteration never see
/// each other's policy leak through.
struct PerAgentToggleSimulator;

impl Simulator for PerAgentToggleSimulator {
    fn run(&self, agent_id: &str, policy: &Policy, seed: u64, _ticks: u32) -> Result<SimulationOutcome> {
        let agent_offset: Cents = agent_id.bytes().map(|b| b as Cents).sum();
        let base = 2000 + agent_offset + (seed % 7) as Cents;
        let cost = if policy.trees.contains_key("cheaper") {
            base - 300
        } else {
            base
        };
        Ok(SimulationOutcome {
            seed,
            costs: CostBreakdown {
                delay_cost: cost,
                overdraft_cost: 0,
                deadline_penalty: 0,
                eod_penalty: 0,
            },
            settlement_rate: 1.0,
            avg_delay: 0.0,
            events: vec![BootstrapEvent {
                tick: 0,
                kind: "arrival".to_string(),
                detail: json!({"agent_id": agent_id}),
            }],
        })
    }
}

#[tokio::test]
async fn two_agents_are_evaluated_and_accepted_independently() {
    let dir = TempDir::new().unwrap();
    let cfg = experiment(
        &dir,
        &["alice", "bob"],
        "convergence:\n  max_iterations: 5\n  stability_threshold: 0.0\n  stability_window: 10\n  improvement_threshold: 0.0\npolicy_constraints: {}",
    );
    let sim = PerAgentToggleSimulator;
    let llm = StubLlmClient::with_structured_response(json!({"trees": {"cheaper": {"children": []}}}));
    let state = started_state(in_memory_pool().await, "two-agent").await;

    let mut loop_ = OptimizationLoop::new(&cfg, ScenarioConstraints::new(), &sim, llm, &state, HashMap::new());
    let reason = loop_.run_iteration(0).await.unwrap();

    assert!(reason.is_none());
    assert!(loop_.policies()["alice"].trees.contains_key("cheaper"));
    assert!(loop_.policies()["bob"].trees.contains_key("cheaper"));

    let costs = state.get_iteration_costs(0).await.unwrap();
    assert_eq!(costs.len(), 2);
    assert_ne!(costs["alice"], costs["bob"]);
}

#[tokio::test]
async fn proposal_violating_constraints_is_rejected_and_policy_is_unchanged() {
    let dir = TempDir::new().unwrap();
    let mut constraints = ScenarioConstraints::new();
    constraints.parameters.insert(
        "initial_liquidity_fraction".to_string(),
        ParameterConstraint::numeric(0.0, 1.0, ParameterType::Float),
    );
    let cfg = experiment(
        &dir,
        &["alice"],
        "convergence:\n  max_iterations: 5\n  stability_threshold: 0.0\n  stability_window: 10\n  improvement_threshold: 0.0\npolicy_constraints: {}",
    );
    let sim = PerAgentToggleSimulator;
    // Proposes a tree with a parameter that is not in the whitelist at all.
    let llm = StubLlmClient::with_structured_response(json!({
        "trees": {"cheaper": {"children": [], "parameters": {"unwhitelisted": 1}}}
    }));
    let state = started_state(in_memory_pool().await, "constraint-violation").await;

    let mut loop_ = OptimizationLoop::new(&cfg, constraints, &sim, llm, &state, HashMap::new());
    loop_.run_iteration(0).await.unwrap();

    assert!(!loop_.policies().contains_key("alice"));
    let accepted = state.get_iteration_accepted_changes(0).await.unwrap();
    assert_eq!(accepted["alice"], json!(false));
    let snapshot = loop_.telemetry_snapshot();
    assert_eq!(
        snapshot.rejection_reasons.get("constraint-violation"),
        Some(&1)
    );
}

/// A simulator whose cost never moves once the run settles, so the run
/// should converge on stability well before `max_iterations`.
struct FlatSimulator;

impl Simulator for FlatSimulator {
    fn run(&self, _agent_id: &str, _policy: &Policy, seed: u64, _ticks: u32) -> Result<SimulationOutcome> {
        Ok(SimulationOutcome {
            seed,
            costs: CostBreakdown {
                delay_cost: 1000,
                overdraft_cost: 0,
                deadline_penalty: 0,
                eod_penalty: 0,
            },
            settlement_rate: 1.0,
            avg_delay: 0.0,
            events: Vec::new(),
        })
    }
}

#[tokio::test]
async fn identical_costs_converge_by_stability_before_max_iterations() {
    let dir = TempDir::new().unwrap();
    let cfg = experiment(
        &dir,
        &["alice"],
        "convergence:\n  max_iterations: 50\n  stability_threshold: 0.01\n  stability_window: 3\n  improvement_threshold: 0.0\npolicy_constraints: {}",
    );
    let sim = FlatSimulator;
    let llm = StubLlmClient::with_structured_response(json!({"trees": {}}));
    let state = started_state(in_memory_pool().await, "flat-cost").await;

    let mut loop_ = OptimizationLoop::new(&cfg, ScenarioConstraints::new(), &sim, llm, &state, HashMap::new());
    let mut reason = None;
    for iteration in 0..50 {
        if let Some(r) = loop_.run_iteration(iteration).await.unwrap() {
            reason = Some(r);
            break;
        }
    }

    assert_eq!(reason, Some(ConvergenceReason::Stability));
    let total = state.get_total_iterations().await.unwrap();
    assert!((total as usize) < 50, "converged early at {total} iterations");
}

#[tokio::test]
async fn replay_through_the_full_loop_reproduces_live_reads() {
    let dir = TempDir::new().unwrap();
    let cfg = experiment(
        &dir,
        &["alice"],
        "convergence:\n  max_iterations: 2\n  stability_threshold: 0.0\n  stability_window: 10\n  improvement_threshold: 0.0\npolicy_constraints: {}",
    );
    let sim = PerAgentToggleSimulator;
    let llm = StubLlmClient::with_structured_response(json!({"trees": {"cheaper": {"children": []}}}));
    let pool = in_memory_pool().await;
    let run_id = RunId::new();
    let record = ExperimentRecord::start(run_id, "replay-identity", json!({"master_seed": 11}));
    let state = LiveStateProvider::start(pool.clone(), &record).await.unwrap();

    let mut loop_ = OptimizationLoop::new(&cfg, ScenarioConstraints::new(), &sim, llm, &state, HashMap::new());
    let reason = loop_.run().await.unwrap();
    assert_eq!(reason, ConvergenceReason::MaxIterations);

    let live_total = state.get_total_iterations().await.unwrap();
    let live_costs = state.get_iteration_costs(0).await.unwrap();
    let live_events = state.get_all_events().await.unwrap();
    let live_final = state.get_final_result().await.unwrap();

    let replay = DatabaseStateProvider::new(pool, run_id);
    assert_eq!(replay.get_total_iterations().await.unwrap(), live_total);
    assert_eq!(replay.get_iteration_costs(0).await.unwrap(), live_costs);
    assert_eq!(replay.get_all_events().await.unwrap().len(), live_events.len());
    let replay_final = replay.get_final_result().await.unwrap();
    assert_eq!(replay_final.converged, live_final.converged);
    assert_eq!(replay_final.convergence_reason, live_final.convergence_reason);
}

#[tokio::test]
async fn audit_log_captures_llm_transport_failures_through_a_full_run() {
    let dir = TempDir::new().unwrap();
    let cfg = experiment(
        &dir,
        &["alice"],
        "convergence:\n  max_iterations: 3\n  stability_threshold: 0.0\n  stability_window: 10\n  improvement_threshold: 0.0\npolicy_constraints: {}",
    );
    let sim = FlatSimulator;
    let llm = StubLlmClient::with_error("connection reset by peer");
    let state = started_state(in_memory_pool().await, "audit-on-failure").await;

    let mut loop_ = OptimizationLoop::new(&cfg, ScenarioConstraints::new(), &sim, llm, &state, HashMap::new());
    loop_.run_iteration(0).await.unwrap();

    let events = state.get_iteration_events(0).await.unwrap();
    let interaction = events
        .iter()
        .find(|e| e.event_type == "llm_interaction")
        .expect("llm interaction recorded even on failure");
    assert!(interaction.event_data["error"]
        .as_str()
        .unwrap()
        .contains("connection reset"));
    assert!(interaction.event_data["response"].is_null());
}
