//! Paired evaluation of a baseline and proposed policy against a shared
//! sample set (§4.2, §4.7).
//!
//! The defining invariant here is sample reuse: the same seeds evaluate
//! both the baseline and the candidate policy, so per-sample noise cancels
//! out of the delta and only the policy change itself drives the mean. This
//! is why `evaluate` takes exactly one policy: the loop calls it twice,
//! once for the baseline (before a proposal exists) and once for the
//! proposal, against the identical `samples` slice both times.

use crate::config::EvaluationConfig;
use crate::domain::Cents;
use crate::error::Result;
use crate::policy::Policy;
use crate::sampling::{self, BootstrapSample};
use crate::simulator::{SimulationOutcome, Simulator};
use serde::{Deserialize, Serialize};

/// One sample's baseline/proposal cost pair and their difference.
///
/// `delta = baseline_cost - proposal_cost`, so a positive delta means the
/// proposal is cheaper (an improvement).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PairedDelta {
    pub sample_index: usize,
    pub seed: u64,
    pub baseline_cost: Cents,
    pub proposal_cost: Cents,
    pub delta: Cents,
}

/// One agent's evaluation of a single policy against a sample set: the
/// input to [`crate::context::ContextBuilder`] when it is the baseline, and
/// one half of a [`PairedDelta`] sequence when paired against a proposal's
/// own evaluation of the same samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    pub agent_id: String,
    pub samples: Vec<BootstrapSample>,
    pub outcomes: Vec<SimulationOutcome>,
}

impl PolicyEvaluation {
    /// The sample with the lowest total cost — the "best" sample §4.3 uses
    /// to render `simulation_output`.
    pub fn best_outcome(&self) -> Option<&SimulationOutcome> {
        self.outcomes.iter().min_by_key(|o| o.total_cost())
    }

    /// The sample with the highest total cost, used only for bootstrap
    /// `mode_metadata`, never for `simulation_output` text (§4.3).
    pub fn worst_outcome(&self) -> Option<&SimulationOutcome> {
        self.outcomes.iter().max_by_key(|o| o.total_cost())
    }

    /// Mean total cost across all outcomes.
    pub fn mean_cost(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.outcomes.iter().map(|o| o.total_cost() as f64).sum();
        sum / self.outcomes.len() as f64
    }

    /// Sample standard deviation of total cost across outcomes (0.0 for
    /// fewer than two samples).
    pub fn cost_std(&self) -> f64 {
        if self.outcomes.len() < 2 {
            return 0.0;
        }
        let mean = self.mean_cost();
        let variance = self
            .outcomes
            .iter()
            .map(|o| (o.total_cost() as f64 - mean).powi(2))
            .sum::<f64>()
            / self.outcomes.len() as f64;
        variance.sqrt()
    }

    /// Component-wise average cost breakdown across outcomes (§4.3:
    /// averaged in bootstrap mode, collapses to the single value otherwise).
    pub fn average_cost_breakdown(&self) -> std::collections::BTreeMap<String, Cents> {
        let n = self.outcomes.len().max(1) as i64;
        let mut delay = 0i64;
        let mut overdraft = 0i64;
        let mut deadline = 0i64;
        let mut eod = 0i64;
        for o in &self.outcomes {
            delay += o.costs.delay_cost;
            overdraft += o.costs.overdraft_cost;
            deadline += o.costs.deadline_penalty;
            eod += o.costs.eod_penalty;
        }
        let mut map = std::collections::BTreeMap::new();
        map.insert("delay_cost".to_string(), delay / n);
        map.insert("overdraft_cost".to_string(), overdraft / n);
        map.insert("deadline_penalty".to_string(), deadline / n);
        map.insert("eod_penalty".to_string(), eod / n);
        map
    }

    /// Mean total cost, rounded to the nearest integer cent — the
    /// `current_cost` field of the built context.
    pub fn current_cost(&self) -> Cents {
        self.mean_cost().round() as Cents
    }
}

/// Evaluates policies against a deterministically derived sample set and
/// pairs two evaluations of the same samples into a delta sequence.
pub struct PolicyEvaluator<'a> {
    simulator: &'a dyn Simulator,
}

impl<'a> PolicyEvaluator<'a> {
    /// Construct an evaluator over the given simulator.
    pub fn new(simulator: &'a dyn Simulator) -> Self {
        Self { simulator }
    }

    /// Generate this iteration's sample set for one agent, per the
    /// configured evaluation mode (§4.2).
    pub fn generate_samples(
        &self,
        master_seed: u64,
        iteration: u32,
        agent_id: &str,
        config: &EvaluationConfig,
    ) -> Vec<BootstrapSample> {
        sampling::generate_samples(
            master_seed,
            iteration,
            agent_id,
            config.effective_num_samples(),
            config.ticks,
        )
    }

    /// Evaluate a single policy against `samples`, returning one outcome
    /// per sample in sample order. Called twice per iteration step — once
    /// for the baseline, once for the proposal — against the identical
    /// `samples` slice both times (§4.2's paired-reuse requirement).
    pub fn evaluate(
        &self,
        agent_id: &str,
        samples: &[BootstrapSample],
        policy: &Policy,
    ) -> Result<PolicyEvaluation> {
        let mut outcomes = Vec::with_capacity(samples.len());
        for sample in samples {
            outcomes.push(self.simulator.run(agent_id, policy, sample.seed, sample.ticks)?);
        }
        Ok(PolicyEvaluation {
            agent_id: agent_id.to_string(),
            samples: samples.to_vec(),
            outcomes,
        })
    }

    /// Pair up a baseline and a proposal evaluation of the identical
    /// sample set, producing one [`PairedDelta`] per sample.
    ///
    /// Panics if `baseline` and `proposal` were not evaluated against the
    /// same samples in the same order — that would indicate a caller bug
    /// (sample regeneration between evaluations), which the spec forbids
    /// outright rather than silently tolerating.
    pub fn compute_paired_deltas(
        &self,
        baseline: &PolicyEvaluation,
        proposal: &PolicyEvaluation,
    ) -> Vec<PairedDelta> {
        assert_eq!(
            baseline.samples.len(),
            proposal.samples.len(),
            "baseline and proposal must share the same sample set"
        );
        baseline
            .samples
            .iter()
            .zip(proposal.samples.iter())
            .zip(baseline.outcomes.iter())
            .zip(proposal.outcomes.iter())
            .map(|(((base_sample, prop_sample), base_outcome), prop_outcome)| {
                assert_eq!(
                    base_sample.seed, prop_sample.seed,
                    "baseline and proposal samples diverged at index {}",
                    base_sample.sample_index
                );
                let baseline_cost = base_outcome.total_cost();
                let proposal_cost = prop_outcome.total_cost();
                PairedDelta {
                    sample_index: base_sample.sample_index,
                    seed: base_sample.seed,
                    baseline_cost,
                    proposal_cost,
                    delta: baseline_cost - proposal_cost,
                }
            })
            .collect()
    }
}

/// Arithmetic mean of a paired-delta sequence's `delta` field. Acceptance
/// happens iff this is `> 0` (§4.2, §4.6 step h).
pub fn mean_delta(deltas: &[PairedDelta]) -> f64 {
    if deltas.is_empty() {
        return 0.0;
    }
    deltas.iter().map(|d| d.delta as f64).sum::<f64>() / deltas.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::CostBreakdown;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Stub simulator: cost is a fixed per-policy-identity offset from the
    /// seed, so baseline/proposal costs are deterministic and comparable
    /// without any real payment-system logic.
    struct FixedOffsetSimulator {
        proposal_offset: Cents,
        calls: AtomicU64,
    }

    impl Simulator for FixedOffsetSimulator {
        fn run(
            &self,
            _agent_id: &str,
            policy: &Policy,
            seed: u64,
            _ticks: u32,
        ) -> Result<SimulationOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let is_proposal = policy.trees.contains_key("proposal_marker");
            let base_cost = (seed % 1000) as Cents;
            let delay_cost = if is_proposal {
                base_cost - self.proposal_offset
            } else {
                base_cost
            };
            Ok(SimulationOutcome {
                seed,
                costs: CostBreakdown {
                    delay_cost,
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

    fn proposal_policy() -> Policy {
        let mut p = Policy::new();
        p.trees.insert(
            "proposal_marker".to_string(),
            crate::policy::PolicyNode {
                id: "proposal_marker".to_string(),
                parameters: Default::default(),
                action: None,
                children: Vec::new(),
            },
        );
        p
    }

    #[test]
    fn cheaper_proposal_yields_positive_mean_delta_and_accepts() {
        let sim = FixedOffsetSimulator {
            proposal_offset: 50,
            calls: AtomicU64::new(0),
        };
        let evaluator = PolicyEvaluator::new(&sim);
        let samples = sampling::generate_samples(42, 1, "alice", 8, 100);
        let baseline = evaluator.evaluate("alice", &samples, &Policy::new()).unwrap();
        let proposal = evaluator
            .evaluate("alice", &samples, &proposal_policy())
            .unwrap();
        let deltas = evaluator.compute_paired_deltas(&baseline, &proposal);
        assert_eq!(mean_delta(&deltas), 50.0);
        assert_eq!(sim.calls.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn identical_policies_yield_zero_delta() {
        let sim = FixedOffsetSimulator {
            proposal_offset: 0,
            calls: AtomicU64::new(0),
        };
        let evaluator = PolicyEvaluator::new(&sim);
        let samples = sampling::generate_samples(42, 1, "alice", 4, 100);
        let baseline = evaluator.evaluate("alice", &samples, &Policy::new()).unwrap();
        let proposal = evaluator.evaluate("alice", &samples, &Policy::new()).unwrap();
        let deltas = evaluator.compute_paired_deltas(&baseline, &proposal);
        assert_eq!(mean_delta(&deltas), 0.0);
    }

    #[test]
    fn same_seed_drives_both_baseline_and_proposal_runs() {
        let sim = FixedOffsetSimulator {
            proposal_offset: 10,
            calls: AtomicU64::new(0),
        };
        let evaluator = PolicyEvaluator::new(&sim);
        let samples = sampling::generate_samples(7, 2, "bob", 3, 50);
        let baseline = evaluator.evaluate("bob", &samples, &Policy::new()).unwrap();
        let proposal = evaluator
            .evaluate("bob", &samples, &proposal_policy())
            .unwrap();
        let deltas = evaluator.compute_paired_deltas(&baseline, &proposal);
        for (delta, sample) in deltas.iter().zip(&samples) {
            assert_eq!(delta.seed, sample.seed);
            assert_eq!(delta.delta, 10);
        }
    }

    #[test]
    fn generate_samples_respects_configured_mode_and_ticks() {
        let sim = FixedOffsetSimulator {
            proposal_offset: 0,
            calls: AtomicU64::new(0),
        };
        let evaluator = PolicyEvaluator::new(&sim);
        let config = EvaluationConfig {
            mode: crate::config::EvaluationMode::Bootstrap,
            num_samples: Some(5),
            ticks: 10,
        };
        let samples = evaluator.generate_samples(1, 0, "alice", &config);
        assert_eq!(samples.len(), 5);
        assert!(samples.iter().all(|s| s.ticks == 10));
    }

    #[test]
    fn policy_evaluation_reports_best_worst_mean_and_std() {
        let sim = FixedOffsetSimulator {
            proposal_offset: 0,
            calls: AtomicU64::new(0),
        };
        let evaluator = PolicyEvaluator::new(&sim);
        let samples = sampling::generate_samples(42, 1, "alice", 8, 100);
        let result = evaluator.evaluate("alice", &samples, &Policy::new()).unwrap();
        let best = result.best_outcome().unwrap().total_cost();
        let worst = result.worst_outcome().unwrap().total_cost();
        assert!(best <= worst);
        assert!(result.cost_std() >= 0.0);
    }
}
