//! The ordered queue of cars for one (project, target branch) pair.
//!
//! A `Train` owns ordering and head promotion only. It never talks to the
//! pipeline gateway or the merge executor; the caller supplies the current
//! target-branch HEAD where one is needed.

use serde::{Deserialize, Serialize};

use crate::state::stacking;
use crate::types::{Car, MergeParams, MergeRequestId, Sha, TrainKey, UserId};

/// Raised by the new head after a car leaves the train.
///
/// Removal deliberately does not refresh the promoted car itself - that
/// would cascade one car's failure into its successors' processing. The
/// caller is responsible for triggering a refresh of `merge_request`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    /// The car now needing a refresh (usually the new head; for a mid-train
    /// removal, the successor whose base ref was recomputed).
    pub merge_request: MergeRequestId,

    /// True if the promoted car moved to position 0.
    pub became_head: bool,
}

/// Outcome of removing a car from a train.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    /// The removed car, with its position as it was at removal time.
    pub car: Car,

    /// Set when a remaining car's base ref was recomputed and it should be
    /// refreshed by the caller.
    pub promotion: Option<Promotion>,
}

/// The ordered collection of cars targeting one branch.
///
/// Invariant: car positions are contiguous from 0 and unique; index in
/// `cars` always equals `car.position`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Train {
    pub key: TrainKey,
    cars: Vec<Car>,
}

impl Train {
    /// Creates an empty train for the given key.
    pub fn new(key: TrainKey) -> Self {
        Train { key, cars: vec![] }
    }

    /// Returns the car at position 0, if any.
    pub fn head(&self) -> Option<&Car> {
        self.cars.first()
    }

    /// Returns the car for the given merge request, if it is on the train.
    pub fn car(&self, merge_request: MergeRequestId) -> Option<&Car> {
        self.cars.iter().find(|c| c.merge_request == merge_request)
    }

    /// Mutable access to a car by merge request.
    pub fn car_mut(&mut self, merge_request: MergeRequestId) -> Option<&mut Car> {
        self.cars
            .iter_mut()
            .find(|c| c.merge_request == merge_request)
    }

    /// All cars in position order.
    pub fn cars(&self) -> &[Car] {
        &self.cars
    }

    pub fn len(&self) -> usize {
        self.cars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cars.is_empty()
    }

    /// Appends a car at the tail position.
    ///
    /// If the train was empty the new car becomes head, with
    /// `previous_ref_sha` set to the caller-supplied target-branch HEAD.
    /// Non-head cars start with no base ref; it is computed from the
    /// predecessor's speculative merge-ref once that exists.
    ///
    /// Enqueueing a merge request already on the train is a no-op returning
    /// the existing car's position.
    pub fn enqueue(
        &mut self,
        merge_request: MergeRequestId,
        user: UserId,
        merge_params: MergeParams,
        branch_head: &Sha,
    ) -> u32 {
        if let Some(existing) = self.car(merge_request) {
            return existing.position;
        }

        let position = self.cars.len() as u32;
        let mut car = Car::new(merge_request, user, position, merge_params);
        car.previous_ref_sha = stacking::base_ref_for(&self.cars, position, branch_head);
        self.cars.push(car);
        position
    }

    /// Deletes a car and renumbers the rest.
    ///
    /// The car that now occupies the removed position has a new predecessor,
    /// so its base ref is recomputed (the possibly-updated target-branch
    /// HEAD if it became head, otherwise the new predecessor's speculative
    /// merge-ref) and it is marked stale so it regenerates its pipeline
    /// against fresh content. Every other remaining car only has its
    /// position decremented.
    ///
    /// Returns `None` if the merge request is not on the train.
    pub fn remove(&mut self, merge_request: MergeRequestId, branch_head: &Sha) -> Option<Removal> {
        let index = self
            .cars
            .iter()
            .position(|c| c.merge_request == merge_request)?;
        let car = self.cars.remove(index);

        for later in &mut self.cars[index..] {
            later.position -= 1;
        }

        let promotion = self.reseat_successor(index, branch_head);
        Some(Removal { car, promotion })
    }

    /// Recomputes a non-head car's base ref from its predecessor's current
    /// speculative merge-ref, marking the car stale if the ref changed
    /// (e.g. the car ahead had its pipeline recreated).
    ///
    /// The head car's base ref is seated at enqueue/promotion time and left
    /// alone here - the live branch only moves when the train itself merges.
    ///
    /// Returns `None` if the merge request is not on the train.
    pub fn sync_base_ref(&mut self, merge_request: MergeRequestId) -> Option<Option<Sha>> {
        let index = self
            .cars
            .iter()
            .position(|c| c.merge_request == merge_request)?;
        if index == 0 {
            return Some(self.cars[0].previous_ref_sha.clone());
        }

        let base = self.cars[index - 1].speculative_sha.clone();
        let car = &mut self.cars[index];
        if car.previous_ref_sha != base {
            car.rebase_onto(base.clone());
        }
        Some(base)
    }

    /// Recomputes the base ref of the car now at `index` after its
    /// predecessor changed, marking it stale.
    fn reseat_successor(&mut self, index: usize, branch_head: &Sha) -> Option<Promotion> {
        if index >= self.cars.len() {
            return None;
        }

        let position = self.cars[index].position;
        let base = stacking::base_ref_for(&self.cars, position, branch_head);
        let successor = &mut self.cars[index];
        successor.rebase_onto(base);

        Some(Promotion {
            merge_request: successor.merge_request,
            became_head: successor.is_head(),
        })
    }

    /// Debug-time check of the ordering invariant.
    #[cfg(test)]
    pub fn positions_are_contiguous(&self) -> bool {
        self.cars
            .iter()
            .enumerate()
            .all(|(i, c)| c.position == i as u32)
    }
}
