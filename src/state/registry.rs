//! Shared registry of live trains, keyed by (project, target branch).
//!
//! Refreshes arrive from independent, possibly concurrent triggers, so every
//! train mutation goes through a per-train `Mutex`. The mutex is only ever
//! held for in-memory bookkeeping - never across a remote call. The separate
//! merge lease provides the train-scoped mutual exclusion for the merge
//! attempt itself, so two concurrent refreshes of the same head car cannot
//! both invoke the merge executor.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::debug;

use crate::state::train::{Removal, Train};
use crate::types::{MergeParams, MergeRequestId, Sha, TrainKey, UserId};

/// A live train plus its concurrency primitives.
pub struct TrainHandle {
    pub key: TrainKey,

    /// Guards all Car/Train mutations. Held only for bookkeeping.
    pub train: Mutex<Train>,

    /// Scoped to the merge attempt: acquired before marking a car
    /// `Merging`, released after the executor reports.
    merge_lease: Mutex<()>,
}

impl TrainHandle {
    fn new(key: TrainKey) -> Self {
        TrainHandle {
            train: Mutex::new(Train::new(key.clone())),
            merge_lease: Mutex::new(()),
            key,
        }
    }

    /// Tries to take the merge lease without waiting.
    ///
    /// `None` means another refresh currently holds it, i.e. a merge attempt
    /// for this train is already in flight and the caller must skip its own.
    pub fn try_merge_lease(&self) -> Option<MutexGuard<'_, ()>> {
        self.merge_lease.try_lock().ok()
    }
}

/// All live trains. Trains are created implicitly on first enqueue and
/// dropped when their last car leaves.
#[derive(Default)]
pub struct TrainRegistry {
    trains: RwLock<HashMap<TrainKey, Arc<TrainHandle>>>,
}

impl TrainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle for an existing train, if any.
    pub async fn handle(&self, key: &TrainKey) -> Option<Arc<TrainHandle>> {
        self.trains.read().await.get(key).cloned()
    }

    /// Appends a merge request to the train for `key`, creating the train if
    /// this is its first car. Returns the handle and the car's position.
    pub async fn enqueue(
        &self,
        key: &TrainKey,
        merge_request: MergeRequestId,
        user: UserId,
        merge_params: MergeParams,
        branch_head: &Sha,
    ) -> (Arc<TrainHandle>, u32) {
        let handle = {
            let mut trains = self.trains.write().await;
            trains
                .entry(key.clone())
                .or_insert_with(|| {
                    debug!(train = %key, "creating train");
                    Arc::new(TrainHandle::new(key.clone()))
                })
                .clone()
        };

        let position = handle
            .train
            .lock()
            .await
            .enqueue(merge_request, user, merge_params, branch_head);
        (handle, position)
    }

    /// Removes a car from its train, dropping the train if it became empty.
    ///
    /// `branch_head` is the possibly-updated target-branch HEAD, used to
    /// re-seat a newly promoted head car.
    pub async fn remove(
        &self,
        key: &TrainKey,
        merge_request: MergeRequestId,
        branch_head: &Sha,
    ) -> Option<Removal> {
        let handle = self.handle(key).await?;
        let removal = handle.train.lock().await.remove(merge_request, branch_head)?;
        self.drop_if_empty(key).await;
        Some(removal)
    }

    /// Drops the registry entry for `key` if its train has no cars left.
    ///
    /// Re-checks emptiness under both locks: a concurrent enqueue may have
    /// appended a car between our removal and this cleanup.
    pub async fn drop_if_empty(&self, key: &TrainKey) {
        let mut trains = self.trains.write().await;
        if let Some(handle) = trains.get(key) {
            if handle.train.lock().await.is_empty() {
                debug!(train = %key, "dropping empty train");
                trains.remove(key);
            }
        }
    }
}
