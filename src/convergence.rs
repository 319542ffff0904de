//! Convergence detection over a run's total-cost history (§4.7).
//!
//! `total cost` here is the sum of `costs_per_agent` across every optimized
//! agent for one iteration — the single scalar the three criteria below are
//! evaluated against. Criteria are checked in a fixed tie-break order
//! (max-iterations, then stability, then no-improvement) and the detector
//! reports the first that fires, never more than one reason per iteration.

use crate::config::convergence::IMPROVEMENT_EPSILON_CENTS;
use crate::config::ConvergenceConfig;
use crate::domain::Cents;
use serde::{Deserialize, Serialize};

/// Which criterion, if any, declared the run converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConvergenceReason {
    MaxIterations,
    Stability,
    NoImprovement,
}

impl ConvergenceReason {
    /// The string stored in `ExperimentRecord.convergence_reason`.
    pub fn as_str(self) -> &'static str {
        match self {
            ConvergenceReason::MaxIterations => "max-iterations",
            ConvergenceReason::Stability => "stability",
            ConvergenceReason::NoImprovement => "no-improvement",
        }
    }
}

impl std::fmt::Display for ConvergenceReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateless evaluator over the run's accumulated total-cost history. The
/// `OptimizationLoop` owns the history itself; this detector only reads it.
pub struct ConvergenceDetector<'a> {
    config: &'a ConvergenceConfig,
}

impl<'a> ConvergenceDetector<'a> {
    /// Construct a detector bound to one run's convergence configuration.
    pub fn new(config: &'a ConvergenceConfig) -> Self {
        Self { config }
    }

    /// Check whether the run has converged after iteration `completed_iterations - 1`
    /// (i.e. `completed_iterations` iterations have run so far), given the
    /// total cost recorded at the end of every iteration to date.
    pub fn check(
        &self,
        completed_iterations: u32,
        total_cost_history: &[Cents],
    ) -> Option<ConvergenceReason> {
        if completed_iterations as usize >= self.config.max_iterations {
            return Some(ConvergenceReason::MaxIterations);
        }

        let window_len = self.config.stability_window;
        if total_cost_history.len() < window_len {
            return None;
        }
        let window = &total_cost_history[total_cost_history.len() - window_len..];

        if Self::relative_range(window) <= self.config.stability_threshold {
            return Some(ConvergenceReason::Stability);
        }

        if Self::max_improvement(window) < self.config.improvement_threshold {
            return Some(ConvergenceReason::NoImprovement);
        }

        None
    }

    /// `(max - min) / max(1, min)` over the window.
    fn relative_range(window: &[Cents]) -> f64 {
        let max = *window.iter().max().expect("non-empty window");
        let min = *window.iter().min().expect("non-empty window");
        (max - min) as f64 / (min.max(1)) as f64
    }

    /// The largest improvement between any two consecutive iterations in
    /// the window, using the absolute/relative switch of §4.7.1.
    fn max_improvement(window: &[Cents]) -> f64 {
        window
            .windows(2)
            .map(|pair| Self::improvement(pair[0], pair[1]))
            .fold(f64::MIN, f64::max)
    }

    /// Improvement from `prev` to `curr`: absolute cents if either cost is
    /// within `IMPROVEMENT_EPSILON_CENTS` of zero, otherwise relative to
    /// `prev` (§4.7.1).
    fn improvement(prev: Cents, curr: Cents) -> f64 {
        if prev.abs().min(curr.abs()) < IMPROVEMENT_EPSILON_CENTS {
            (prev - curr) as f64
        } else {
            (prev - curr) as f64 / (prev.abs().max(1)) as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_iterations: usize, stability_threshold: f64, stability_window: usize, improvement_threshold: f64) -> ConvergenceConfig {
        ConvergenceConfig {
            max_iterations,
            stability_threshold,
            stability_window,
            improvement_threshold,
        }
    }

    #[test]
    fn fires_max_iterations_when_cap_reached() {
        let cfg = config(3, 0.0, 100, 0.0);
        let detector = ConvergenceDetector::new(&cfg);
        assert_eq!(
            detector.check(3, &[1000, 900, 800]),
            Some(ConvergenceReason::MaxIterations)
        );
    }

    #[test]
    fn does_not_fire_before_window_is_full() {
        let cfg = config(100, 0.02, 5, 0.01);
        let detector = ConvergenceDetector::new(&cfg);
        assert_eq!(detector.check(3, &[1000, 990, 985]), None);
    }

    #[test]
    fn fires_stability_when_relative_range_within_threshold() {
        let cfg = config(100, 0.02, 5, 0.0);
        let detector = ConvergenceDetector::new(&cfg);
        let history = vec![1000, 500, 498, 497, 496, 495];
        assert_eq!(
            detector.check(6, &history),
            Some(ConvergenceReason::Stability)
        );
    }

    #[test]
    fn max_iterations_beats_stability_on_tie() {
        let cfg = config(6, 0.02, 5, 0.0);
        let detector = ConvergenceDetector::new(&cfg);
        let history = vec![1000, 500, 498, 497, 496, 495];
        assert_eq!(
            detector.check(6, &history),
            Some(ConvergenceReason::MaxIterations)
        );
    }

    #[test]
    fn fires_no_improvement_when_relative_gains_are_small() {
        let cfg = config(100, 0.0, 3, 0.05);
        let detector = ConvergenceDetector::new(&cfg);
        // Each step improves by 1% relative, under a 5% threshold, and the
        // range is wide enough to miss the stability criterion.
        let history = vec![100_000, 99_000, 98_010, 97_030];
        assert_eq!(
            detector.check(4, &history),
            Some(ConvergenceReason::NoImprovement)
        );
    }

    #[test]
    fn no_criterion_fires_on_steady_large_improvement() {
        let cfg = config(100, 0.02, 3, 0.1);
        let detector = ConvergenceDetector::new(&cfg);
        let history = vec![10_000, 5_000, 2_500, 1_000];
        assert_eq!(detector.check(4, &history), None);
    }

    #[test]
    fn near_zero_costs_use_absolute_improvement() {
        let cfg = config(100, 0.0, 2, 50.0);
        let detector = ConvergenceDetector::new(&cfg);
        // Costs near zero: improvement is absolute cents (10 < 50 threshold).
        let history = vec![20, 10];
        assert_eq!(
            detector.check(2, &history),
            Some(ConvergenceReason::NoImprovement)
        );
    }
}
