//! Property-based coverage of the quantified invariants in §8: integer-cents
//! discipline, cost decomposition, and delta orientation — exercised over
//! generated inputs rather than a handful of fixed examples.

use policy_optimizer::domain::Cents;
use policy_optimizer::evaluator::{mean_delta, PairedDelta};
use policy_optimizer::simulator::CostBreakdown;
use proptest::prelude::*;

/// Cent amounts drawn from the `i32` range, so summing any four of them as
/// `i64` (`CostBreakdown::total`) can never overflow.
fn cents() -> impl Strategy<Value = Cents> {
    any::<i32>().prop_map(Cents::from)
}

proptest! {
    /// §8 property 2: `cost_breakdown.total() == sum of its four components`
    /// for any combination of signed cent values, not just the
    /// hand-picked `100/50/25/10` fixture in `simulator::tests`.
    #[test]
    fn cost_decomposition_holds(
        delay in cents(), overdraft in cents(), deadline in cents(), eod in cents(),
    ) {
        let breakdown = CostBreakdown {
            delay_cost: delay,
            overdraft_cost: overdraft,
            deadline_penalty: deadline,
            eod_penalty: eod,
        };
        prop_assert_eq!(breakdown.total(), delay + overdraft + deadline + eod);
    }

    /// §8 property 1: a `CostBreakdown` round-trips through JSON as
    /// integers — never floating-point literals — for any generated
    /// component values, and the round trip is lossless.
    #[test]
    fn cost_breakdown_serializes_as_integers(
        delay in cents(), overdraft in cents(), deadline in cents(), eod in cents(),
    ) {
        let breakdown = CostBreakdown {
            delay_cost: delay,
            overdraft_cost: overdraft,
            deadline_penalty: deadline,
            eod_penalty: eod,
        };
        let json = serde_json::to_string(&breakdown).unwrap();
        prop_assert!(!json.contains('.'), "cost components must serialize as integers, got {json}");
        let roundtripped: CostBreakdown = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(roundtripped, breakdown);
    }

    /// §8 property 4: `delta == baseline - proposal`, and the sign of a
    /// single-sample mean tracks which side is cheaper, for any pair of
    /// generated costs.
    #[test]
    fn paired_delta_orientation_holds(baseline in cents(), proposal in cents()) {
        let delta = PairedDelta {
            sample_index: 0,
            seed: 0,
            baseline_cost: baseline,
            proposal_cost: proposal,
            delta: baseline - proposal,
        };
        prop_assert_eq!(delta.delta, baseline - proposal);

        let mean = mean_delta(std::slice::from_ref(&delta));
        match baseline.cmp(&proposal) {
            std::cmp::Ordering::Greater => prop_assert!(mean > 0.0),
            std::cmp::Ordering::Less => prop_assert!(mean < 0.0),
            std::cmp::Ordering::Equal => prop_assert_eq!(mean, 0.0),
        }
    }

    /// §8 property 4 over a whole sample set: `mean_delta` is the plain
    /// arithmetic mean of the per-sample deltas regardless of sample count
    /// or seed assignment, matching the acceptance rule in §4.2/§4.6.
    #[test]
    fn mean_delta_matches_manual_average(pairs in prop::collection::vec((cents(), cents()), 1..32)) {
        let deltas: Vec<PairedDelta> = pairs
            .iter()
            .enumerate()
            .map(|(i, &(baseline, proposal))| PairedDelta {
                sample_index: i,
                seed: i as u64,
                baseline_cost: baseline,
                proposal_cost: proposal,
                delta: baseline - proposal,
            })
            .collect();
        let expected: f64 =
            pairs.iter().map(|&(b, p)| (b - p) as f64).sum::<f64>() / pairs.len() as f64;
        prop_assert!((mean_delta(&deltas) - expected).abs() < 1e-6);
    }
}
