//! Base-ref computation for stacked speculative pipelines.
//!
//! The head car validates against the live target branch HEAD. Every other
//! car validates against the speculative merge-ref produced by the car ahead
//! of it (target branch + all preceding cars' changes applied in order) -
//! never the live branch. That is what lets the whole train validate in
//! parallel without any pipeline observing another car's branch mutation.

use crate::types::{Car, Sha};

/// Computes the base ref for the car at `position` within `cars`.
///
/// - position 0: the caller-supplied target-branch HEAD.
/// - position p > 0: the speculative merge-ref of the car at p-1, or `None`
///   if that car has not produced a pipeline yet. A car with no base ref
///   cannot have a pipeline created for it.
pub fn base_ref_for(cars: &[Car], position: u32, branch_head: &Sha) -> Option<Sha> {
    if position == 0 {
        return Some(branch_head.clone());
    }
    cars.iter()
        .find(|c| c.position == position - 1)
        .and_then(|predecessor| predecessor.speculative_sha.clone())
}
