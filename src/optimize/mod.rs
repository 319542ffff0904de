//! Drives the per-iteration optimization sequence (§4.6).
//!
//! One `run_iteration` call processes every configured agent strictly in
//! order: generate this iteration's samples, evaluate the current policy as
//! a baseline, build the agent's context, ask the LLM for a proposal, parse
//! and constraint-check it, evaluate it against the identical samples, and
//! accept or reject by the sign of the paired mean delta. Only the LLM call
//! suspends the task (§4.6 step d; §7) — sample generation and simulator
//! runs are synchronous, so nothing else in the loop body ever yields.

use crate::config::{EvaluationMode, ExperimentConfig};
use crate::constraints::ScenarioConstraints;
use crate::context::ContextBuilder;
use crate::convergence::{ConvergenceDetector, ConvergenceReason};
use crate::domain::Cents;
use crate::error::{Error, Result};
use crate::evaluator::{mean_delta, PolicyEvaluator};
use crate::llm::{AuditCaptureLLMClient, LLMClient};
use crate::persistence::WritableStateProvider;
use crate::policy::{ConstraintValidator, Policy, PolicyParser};
use crate::record::IterationRecord;
use crate::simulator::Simulator;
use crate::telemetry::{Telemetry, TelemetrySnapshot};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, info_span, Instrument};

/// Owns the mutable state of one run: each agent's current policy, its
/// accepted-proposal history, and the running total-cost series convergence
/// is checked against.
pub struct OptimizationLoop<'a, C: LLMClient, S: WritableStateProvider> {
    config: &'a ExperimentConfig,
    constraints: ScenarioConstraints,
    evaluator: PolicyEvaluator<'a>,
    context_builder: ContextBuilder,
    llm: AuditCaptureLLMClient<C>,
    state: &'a S,
    telemetry: Telemetry,
    policies: HashMap<String, Policy>,
    iteration_history: HashMap<String, Vec<IterationRecord>>,
    total_cost_history: Vec<Cents>,
}

impl<'a, C: LLMClient, S: WritableStateProvider> OptimizationLoop<'a, C, S> {
    /// Construct a loop over `simulator`, starting every agent from
    /// `initial_policies` (typically the empty policy for a fresh run, or a
    /// loaded checkpoint).
    pub fn new(
        config: &'a ExperimentConfig,
        constraints: ScenarioConstraints,
        simulator: &'a dyn Simulator,
        llm_client: C,
        state: &'a S,
        initial_policies: HashMap<String, Policy>,
    ) -> Self {
        Self {
            config,
            constraints,
            evaluator: PolicyEvaluator::new(simulator),
            context_builder: ContextBuilder::new(),
            llm: AuditCaptureLLMClient::new(llm_client),
            state,
            telemetry: Telemetry::new(),
            policies: initial_policies,
            iteration_history: HashMap::new(),
            total_cost_history: Vec::new(),
        }
    }

    /// Current policy for every agent, as of the last committed iteration.
    pub fn policies(&self) -> &HashMap<String, Policy> {
        &self.policies
    }

    /// A point-in-time read of the run's accumulated counters.
    pub fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    /// Run iterations until a convergence criterion fires, returning the
    /// reason. Returns `Err(Error::Interrupted)` if cancelled at an LLM-call
    /// suspension point; the iterations committed before that point remain
    /// durable (group commit, §4.8), but the run is never marked converged.
    pub async fn run(&mut self) -> Result<ConvergenceReason> {
        loop {
            let iteration = self.total_cost_history.len() as u32;
            if let Some(reason) = self.run_iteration(iteration).await? {
                return Ok(reason);
            }
        }
    }

    /// Run exactly one iteration, returning the convergence reason if the
    /// run ends after it.
    pub async fn run_iteration(&mut self, iteration: u32) -> Result<Option<ConvergenceReason>> {
        let span = info_span!("iteration", iteration);
        self.run_iteration_inner(iteration).instrument(span).await
    }

    async fn run_iteration_inner(&mut self, iteration: u32) -> Result<Option<ConvergenceReason>> {
        let started = std::time::Instant::now();
        let mut costs_per_agent: BTreeMap<String, Cents> = BTreeMap::new();
        let mut accepted_changes: BTreeMap<String, bool> = BTreeMap::new();

        for agent_id in self.config.agents.clone() {
            let record = self.process_agent(iteration, &agent_id).await?;
            costs_per_agent.insert(agent_id.clone(), record.effective_cost());
            accepted_changes.insert(agent_id.clone(), record.accepted);
            self.iteration_history
                .entry(agent_id.clone())
                .or_default()
                .push(record);
        }

        for interaction in self.llm.take_interactions() {
            self.state
                .record_event(
                    iteration,
                    "llm_interaction",
                    serde_json::to_value(&interaction)?,
                )
                .await?;
        }

        let policies_json = serde_json::to_value(&self.policies)?;
        let accepted_json = serde_json::to_value(&accepted_changes)?;
        self.state
            .record_iteration(iteration, costs_per_agent.clone(), accepted_json, policies_json)
            .await?;

        let total_cost: Cents = costs_per_agent.values().sum();
        self.total_cost_history.push(total_cost);
        self.telemetry
            .record_iteration(started.elapsed().as_millis() as u64);

        let completed_iterations = self.total_cost_history.len() as u32;
        let reason = ConvergenceDetector::new(&self.config.convergence)
            .check(completed_iterations, &self.total_cost_history);

        if let Some(reason) = reason {
            info!(%reason, completed_iterations, "run converged");
            self.state
                .set_converged(completed_iterations, Some(reason.to_string()))
                .await?;
        }

        Ok(reason)
    }

    /// Run one agent's step of §4.6: baseline, context, LLM proposal,
    /// validate, paired-evaluate, accept/reject. Always returns a record —
    /// never propagates a rejection as an `Err`, since a rejection is a
    /// normal outcome of this step, not a failure of the loop itself.
    async fn process_agent(&mut self, iteration: u32, agent_id: &str) -> Result<IterationRecord> {
        let samples = self.evaluator.generate_samples(
            self.config.master_seed,
            iteration,
            agent_id,
            &self.config.evaluation,
        );
        for _ in &samples {
            self.telemetry.record_simulator_call();
        }

        let current_policy = self
            .policies
            .get(agent_id)
            .cloned()
            .unwrap_or_else(Policy::new);
        let baseline = self.evaluator.evaluate(agent_id, &samples, &current_policy)?;
        let baseline_cost = baseline.current_cost();
        let current_policy_json = serde_json::to_value(&current_policy)?;
        let history = self
            .iteration_history
            .get(agent_id)
            .cloned()
            .unwrap_or_default();

        let context = match self.config.evaluation.mode {
            EvaluationMode::Bootstrap => self.context_builder.build_bootstrap(
                agent_id,
                iteration,
                &current_policy_json,
                &baseline,
                history,
            ),
            EvaluationMode::DeterministicPairwise => {
                let scenario_seed = samples[0].seed;
                self.context_builder.build_deterministic_pairwise(
                    agent_id,
                    iteration,
                    &current_policy_json,
                    &baseline,
                    history,
                    scenario_seed,
                )
            }
            EvaluationMode::DeterministicTemporal => {
                let scenario_seed = samples[0].seed;
                let cost_history = self
                    .iteration_history
                    .get(agent_id)
                    .map(|records| records.iter().map(|r| r.effective_cost()).collect())
                    .unwrap_or_default();
                self.context_builder.build_deterministic_temporal(
                    agent_id,
                    iteration,
                    &current_policy_json,
                    &baseline,
                    history,
                    scenario_seed,
                    cost_history,
                )
            }
        };

        let rejected = |reason: &str, mean_delta: Option<f64>, proposal_cost: Option<Cents>, proposed: serde_json::Value| {
            IterationRecord::rejected(
                iteration,
                agent_id,
                proposed,
                reason,
                mean_delta,
                baseline_cost,
                proposal_cost,
                BTreeMap::new(),
            )
        };

        let proposal_raw = tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => return Err(Error::Interrupted),
            result = self.llm.generate_structured(&context) => result,
        };
        let proposal_raw = match proposal_raw {
            Ok(value) => {
                self.telemetry.record_llm_call(true);
                value
            }
            Err(e) => {
                self.telemetry.record_llm_call(false);
                let reason = e.category().to_string();
                self.telemetry.record_rejected(&reason);
                return Ok(rejected(&reason, None, None, serde_json::Value::Null));
            }
        };

        let proposal = match PolicyParser::parse(&proposal_raw) {
            Ok(policy) => policy,
            Err(_) => {
                self.telemetry.record_rejected("policy-parse");
                return Ok(rejected("policy-parse", None, None, proposal_raw));
            }
        };

        let violations = ConstraintValidator::validate(&proposal, &self.constraints);
        if !violations.is_empty() {
            self.telemetry.record_rejected("constraint-violation");
            return Ok(rejected(
                "constraint-violation",
                None,
                None,
                proposal_raw,
            ));
        }

        let proposal_results = self.evaluator.evaluate(agent_id, &samples, &proposal)?;
        for _ in &samples {
            self.telemetry.record_simulator_call();
        }
        let proposal_cost = proposal_results.current_cost();
        let deltas = self.evaluator.compute_paired_deltas(&baseline, &proposal_results);
        let mean = mean_delta(&deltas);

        if mean > 0.0 {
            self.telemetry.record_accepted();
            let mut costs = BTreeMap::new();
            costs.insert(agent_id.to_string(), proposal_cost);
            let record = IterationRecord::accepted(
                iteration,
                agent_id,
                proposal_raw,
                &deltas,
                baseline_cost,
                proposal_cost,
                costs,
            );
            self.policies.insert(agent_id.to_string(), proposal);
            Ok(record)
        } else {
            self.telemetry.record_rejected("no-improvement");
            Ok(IterationRecord::rejected(
                iteration,
                agent_id,
                proposal_raw,
                "no-improvement",
                Some(mean),
                baseline_cost,
                Some(proposal_cost),
                BTreeMap::new(),
            ))
        }
    }
}
