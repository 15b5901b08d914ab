//! Car record and per-car state machine.
//!
//! A `Car` is one queue entry: a merge request's state within a train,
//! tracking its validation pipeline and position.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{MergeRequestId, PipelineId, Sha, UserId};

/// The validation state of a car.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarStatus {
    /// Enqueued; no validation pipeline attached yet.
    Idle,

    /// A pipeline is attached and validates the car's current base ref.
    Fresh,

    /// The car's base ref changed upstream; the attached pipeline (if any)
    /// no longer validates the right content and must be recreated.
    Stale,

    /// A merge attempt is in flight. Guards re-entrancy: a concurrent
    /// refresh that observes this must not start a second merge.
    Merging,

    /// Merged onto the target branch. Terminal.
    Merged,

    /// Left the train due to a precondition, pipeline, or merge failure.
    /// Terminal; the reason is recorded with the abort sink.
    Aborted,
}

impl CarStatus {
    /// Returns true if the car is still riding the train.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true for states a car can never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CarStatus::Merged | CarStatus::Aborted)
    }

    /// Checks if a transition from this status to the target is valid.
    ///
    /// Valid transitions:
    /// - Idle -> Fresh (pipeline created)
    /// - Fresh -> Stale (base ref changed upstream)
    /// - Stale -> Fresh (pipeline recreated)
    /// - Fresh -> Merging (head car with succeeded pipeline)
    /// - Merging -> Merged (executor succeeded)
    /// - any non-terminal -> Aborted
    pub fn can_transition_to(&self, target: CarStatus) -> bool {
        if target == CarStatus::Aborted {
            return !self.is_terminal();
        }
        matches!(
            (self, target),
            (CarStatus::Idle, CarStatus::Fresh)
                | (CarStatus::Fresh, CarStatus::Stale)
                | (CarStatus::Stale, CarStatus::Fresh)
                | (CarStatus::Fresh, CarStatus::Merging)
                | (CarStatus::Merging, CarStatus::Merged)
        )
    }
}

/// How the merge executor should land a car's changes.
///
/// A closed set: the default strategy merges the target branch tip with the
/// car's changes; the fast-forward variant advances the branch tip to the
/// car's already-validated speculative ref, avoiding a redundant merge commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    Merge,
    FastForward,
}

/// Merge options carried by a car from enqueue time to the merge attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeParams {
    pub strategy: MergeStrategy,

    /// Squash the car's commits into one before merging.
    pub squash: bool,

    /// Override for the merge commit message, if any.
    pub commit_message: Option<String>,
}

impl Default for MergeParams {
    fn default() -> Self {
        MergeParams {
            strategy: MergeStrategy::Merge,
            squash: false,
            commit_message: None,
        }
    }
}

/// One queue entry: a merge request riding a train.
///
/// `position` is maintained by the owning [`Train`]: 0 is the head, the only
/// car eligible to actually merge. `previous_ref_sha` is the commit the car's
/// pipeline validates against - the target branch HEAD for the head car, or
/// the predecessor's speculative merge-ref for the rest.
///
/// [`Train`]: crate::state::Train
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Car {
    pub merge_request: MergeRequestId,

    /// Who enqueued the merge request; merges are performed on their behalf.
    pub user: UserId,

    /// 0 = head. Contiguous and unique within a train.
    pub position: u32,

    pub status: CarStatus,

    /// The active validation pipeline, if one is attached. Superseded
    /// pipelines are canceled, never silently dropped.
    pub pipeline: Option<PipelineId>,

    /// The commit this car's pipeline was/will be validated against.
    /// Must be set before a pipeline can be created.
    pub previous_ref_sha: Option<Sha>,

    /// The speculative merge-ref commit produced by this car's current
    /// pipeline (target branch + all cars up to and including this one).
    /// Becomes the next car's `previous_ref_sha`.
    pub speculative_sha: Option<Sha>,

    pub merge_params: MergeParams,

    pub enqueued_at: DateTime<Utc>,

    pub merged_at: Option<DateTime<Utc>>,
}

impl Car {
    /// Creates a car at the given position with no pipeline attached.
    pub fn new(
        merge_request: MergeRequestId,
        user: UserId,
        position: u32,
        merge_params: MergeParams,
    ) -> Self {
        Car {
            merge_request,
            user,
            position,
            status: CarStatus::Idle,
            pipeline: None,
            previous_ref_sha: None,
            speculative_sha: None,
            merge_params,
            enqueued_at: Utc::now(),
            merged_at: None,
        }
    }

    /// Returns true if this car is at the head of its train.
    pub fn is_head(&self) -> bool {
        self.position == 0
    }

    /// Returns true if the car needs a pipeline (re)created: it has none,
    /// or its base ref changed since the current one was created.
    pub fn needs_pipeline(&self) -> bool {
        self.pipeline.is_none() || self.status == CarStatus::Stale
    }

    /// Records a newly created pipeline and the speculative ref it validates.
    ///
    /// Re-attaching over an already fresh pipeline (a forced recreation) is
    /// a valid no-op transition.
    pub fn attach_pipeline(&mut self, pipeline: PipelineId, speculative_sha: Sha) {
        debug_assert!(
            self.status == CarStatus::Fresh || self.status.can_transition_to(CarStatus::Fresh),
            "cannot attach a pipeline to a {:?} car",
            self.status
        );
        self.pipeline = Some(pipeline);
        self.speculative_sha = Some(speculative_sha);
        self.status = CarStatus::Fresh;
    }

    /// Re-seats the car on a new base ref, invalidating its pipeline.
    ///
    /// Called when the car ahead merged, was recreated, or left the train.
    /// The attached pipeline reference is kept so the refresh engine can
    /// cancel it when the replacement is created.
    pub fn rebase_onto(&mut self, previous_ref_sha: Option<Sha>) {
        self.previous_ref_sha = previous_ref_sha;
        self.speculative_sha = None;
        if self.status == CarStatus::Fresh {
            self.status = CarStatus::Stale;
        }
    }

    /// Marks the car merged. Only valid while a merge attempt is in flight.
    pub fn finish_merge(&mut self) {
        debug_assert!(
            self.status.can_transition_to(CarStatus::Merged),
            "cannot finish a merge from {:?}",
            self.status
        );
        self.status = CarStatus::Merged;
        self.merged_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_status() -> impl Strategy<Value = CarStatus> {
        prop_oneof![
            Just(CarStatus::Idle),
            Just(CarStatus::Fresh),
            Just(CarStatus::Stale),
            Just(CarStatus::Merging),
            Just(CarStatus::Merged),
            Just(CarStatus::Aborted),
        ]
    }

    mod car_status {
        use super::*;

        proptest! {
            #[test]
            fn serde_roundtrip(status in arb_status()) {
                let json = serde_json::to_string(&status).unwrap();
                let parsed: CarStatus = serde_json::from_str(&json).unwrap();
                prop_assert_eq!(status, parsed);
            }

            #[test]
            fn terminal_states_transition_nowhere(
                from in arb_status(),
                to in arb_status()
            ) {
                if from.is_terminal() {
                    prop_assert!(!from.can_transition_to(to));
                }
            }

            #[test]
            fn any_active_state_can_abort(from in arb_status()) {
                prop_assert_eq!(
                    from.can_transition_to(CarStatus::Aborted),
                    from.is_active()
                );
            }
        }

        #[test]
        fn valid_transitions() {
            assert!(CarStatus::Idle.can_transition_to(CarStatus::Fresh));
            assert!(CarStatus::Fresh.can_transition_to(CarStatus::Stale));
            assert!(CarStatus::Stale.can_transition_to(CarStatus::Fresh));
            assert!(CarStatus::Fresh.can_transition_to(CarStatus::Merging));
            assert!(CarStatus::Merging.can_transition_to(CarStatus::Merged));
        }

        #[test]
        fn invalid_transitions() {
            // Can't merge without going through Merging.
            assert!(!CarStatus::Fresh.can_transition_to(CarStatus::Merged));
            // A stale car must be refreshed before it can merge.
            assert!(!CarStatus::Stale.can_transition_to(CarStatus::Merging));
            // No pipeline yet means nothing to go stale.
            assert!(!CarStatus::Idle.can_transition_to(CarStatus::Stale));
            // No resurrection.
            assert!(!CarStatus::Merged.can_transition_to(CarStatus::Fresh));
            assert!(!CarStatus::Aborted.can_transition_to(CarStatus::Fresh));
        }
    }

    mod car {
        use super::*;
        use crate::types::ids::{MergeRequestId, PipelineId, Sha, UserId};

        fn make_car() -> Car {
            Car::new(MergeRequestId(7), UserId(1), 0, MergeParams::default())
        }

        #[test]
        fn new_car_is_idle_with_no_refs() {
            let car = make_car();
            assert_eq!(car.status, CarStatus::Idle);
            assert!(car.pipeline.is_none());
            assert!(car.previous_ref_sha.is_none());
            assert!(car.speculative_sha.is_none());
            assert!(car.needs_pipeline());
        }

        #[test]
        fn attach_pipeline_makes_fresh() {
            let mut car = make_car();
            car.attach_pipeline(PipelineId(10), Sha::new("a".repeat(40)));
            assert_eq!(car.status, CarStatus::Fresh);
            assert_eq!(car.pipeline, Some(PipelineId(10)));
            assert!(!car.needs_pipeline());
        }

        #[test]
        fn rebase_invalidates_fresh_pipeline() {
            let mut car = make_car();
            car.attach_pipeline(PipelineId(10), Sha::new("a".repeat(40)));

            car.rebase_onto(Some(Sha::new("b".repeat(40))));

            assert_eq!(car.status, CarStatus::Stale);
            assert!(car.needs_pipeline());
            assert!(car.speculative_sha.is_none());
            // Kept so the replacement pipeline can cancel it.
            assert_eq!(car.pipeline, Some(PipelineId(10)));
        }

        #[test]
        fn rebase_of_idle_car_stays_idle() {
            let mut car = make_car();
            car.rebase_onto(Some(Sha::new("b".repeat(40))));
            assert_eq!(car.status, CarStatus::Idle);
        }

        #[test]
        fn reattach_over_fresh_pipeline_is_allowed() {
            // Forced recreation replaces a still-fresh pipeline in place.
            let mut car = make_car();
            car.attach_pipeline(PipelineId(10), Sha::new("a".repeat(40)));
            car.attach_pipeline(PipelineId(11), Sha::new("b".repeat(40)));
            assert_eq!(car.pipeline, Some(PipelineId(11)));
            assert_eq!(car.status, CarStatus::Fresh);
        }

        #[test]
        #[should_panic(expected = "cannot attach a pipeline")]
        fn attach_to_terminal_car_panics() {
            let mut car = make_car();
            car.status = CarStatus::Aborted;
            car.attach_pipeline(PipelineId(10), Sha::new("a".repeat(40)));
        }

        #[test]
        #[should_panic(expected = "cannot finish a merge")]
        fn finish_merge_without_merging_panics() {
            let mut car = make_car();
            car.finish_merge();
        }

        #[test]
        fn finish_merge_sets_timestamp() {
            let mut car = make_car();
            car.attach_pipeline(PipelineId(10), Sha::new("a".repeat(40)));
            car.status = CarStatus::Merging;

            car.finish_merge();

            assert_eq!(car.status, CarStatus::Merged);
            assert!(car.merged_at.is_some());
        }

        #[test]
        fn serde_roundtrip() {
            let mut car = make_car();
            car.attach_pipeline(PipelineId(10), Sha::new("a".repeat(40)));
            let json = serde_json::to_string(&car).unwrap();
            let parsed: Car = serde_json::from_str(&json).unwrap();
            assert_eq!(car, parsed);
        }
    }
}
