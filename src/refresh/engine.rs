//! The refresh engine: advances exactly one car by one step.
//!
//! `refresh` is idempotent - safe to invoke repeatedly for the same car with
//! no external state change, e.g. on duplicate trigger delivery. It is driven
//! by independent, possibly concurrent triggers (pipeline status callbacks,
//! user actions, periodic reconciliation); there is no coordinating loop.
//!
//! # Locking
//!
//! The per-train mutex scopes every state mutation and is never held across
//! a collaborator call. The merge attempt additionally takes the train's
//! merge lease (try-acquire, skip when busy), so at most one refresh per
//! train can ever be talking to the merge executor.
//!
//! # Failure policy
//!
//! Anything the algorithm can decide is fatal to the car becomes a
//! [`ProcessError`] and is consumed right here: the car is removed, the
//! abort sink is told why, and the caller gets an ordinary
//! [`RefreshOutcome::Aborted`]. Aborting one car never touches the rest of
//! the train beyond re-seating its immediate successor; the `promoted`
//! field names the car whose refresh the caller must trigger next.
//! Only collaborator unreachability surfaces as `Err`.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::gateway::{
    AbortSink, CancelOutcome, MergeExecutor, MergeOrder, MergeOutcome, MergeRequestError,
    MergeRequests, PipelineError, PipelineGateway, PipelineStatus, ProjectGateway,
};
use crate::refresh::error::{ProcessError, ReasonCode, RefreshError};
use crate::state::{Promotion, TrainHandle, TrainRegistry};
use crate::types::{
    Car, CarStatus, MergeParams, MergeRequestId, MergeStrategy, PipelineId, Sha, TrainKey, UserId,
};

/// Result of an enqueue request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The merge request rides the train at `position`. Re-enqueueing a
    /// merge request already on the train returns its existing position.
    Enqueued { position: u32 },

    /// Merge trains are not enabled for the project; nothing was enqueued.
    Disabled,
}

/// Result of one refresh step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Nothing to do: pipeline still running, car not at the head yet, or a
    /// concurrent refresh already holds the merge lease.
    Unchanged,

    /// A validation pipeline was (re)created for the car.
    PipelineCreated { pipeline: PipelineId },

    /// The car merged. `commit` is the target branch's new HEAD and
    /// `promoted` names the successor the caller must now refresh.
    Merged {
        commit: Sha,
        promoted: Option<Promotion>,
    },

    /// The car left the train with the recorded reason. `promoted` names
    /// the successor the caller must now refresh, if any.
    Aborted {
        reason: ReasonCode,
        promoted: Option<Promotion>,
    },
}

impl RefreshOutcome {
    /// The `{merged: bool}` view of the outcome.
    pub fn merged(&self) -> bool {
        matches!(self, RefreshOutcome::Merged { .. })
    }

    /// The car (if any) whose refresh the caller should trigger next.
    pub fn promoted(&self) -> Option<&Promotion> {
        match self {
            RefreshOutcome::Merged { promoted, .. } | RefreshOutcome::Aborted { promoted, .. } => {
                promoted.as_ref()
            }
            _ => None,
        }
    }
}

/// Stateless orchestrator advancing cars through validation and merge.
///
/// Holds the shared train registry plus the five external collaborators.
/// All decisions are made against a snapshot of the car taken under the
/// train lock; every mutation re-checks the car under the lock, so
/// concurrent refreshes of the same car converge instead of clobbering
/// each other.
pub struct RefreshEngine<P, M, Q, A, C> {
    registry: Arc<TrainRegistry>,
    pipelines: P,
    merger: M,
    merge_requests: Q,
    aborts: A,
    projects: C,
}

impl<P, M, Q, A, C> RefreshEngine<P, M, Q, A, C>
where
    P: PipelineGateway,
    M: MergeExecutor,
    Q: MergeRequests,
    A: AbortSink,
    C: ProjectGateway,
{
    pub fn new(
        registry: Arc<TrainRegistry>,
        pipelines: P,
        merger: M,
        merge_requests: Q,
        aborts: A,
        projects: C,
    ) -> Self {
        RefreshEngine {
            registry,
            pipelines,
            merger,
            merge_requests,
            aborts,
            projects,
        }
    }

    /// The shared registry, for callers that need read access to trains.
    pub fn registry(&self) -> &Arc<TrainRegistry> {
        &self.registry
    }

    /// Adds a merge request to the train for `key`, creating the train if
    /// it did not exist. The first car is seated on the target branch's
    /// current HEAD.
    #[instrument(skip(self, merge_params), fields(train = %key, mr = %merge_request))]
    pub async fn enqueue(
        &self,
        key: &TrainKey,
        merge_request: MergeRequestId,
        user: UserId,
        merge_params: MergeParams,
    ) -> Result<EnqueueOutcome, RefreshError> {
        if !self.projects.trains_enabled(key.project).await? {
            debug!("merge trains disabled, refusing enqueue");
            return Ok(EnqueueOutcome::Disabled);
        }

        let branch_head = self
            .projects
            .branch_head(key.project, &key.target_branch)
            .await?;
        let (_, position) = self
            .registry
            .enqueue(key, merge_request, user, merge_params, &branch_head)
            .await;

        info!(position, "merge request enqueued");
        Ok(EnqueueOutcome::Enqueued { position })
    }

    /// Advances the car for `merge_request` by one step: validates
    /// preconditions, (re)creates its pipeline if absent/stale/forced,
    /// merges it when it is the head with a succeeded pipeline, or aborts
    /// it on any fatal condition.
    #[instrument(skip(self), fields(train = %key, mr = %merge_request))]
    pub async fn refresh(
        &self,
        key: &TrainKey,
        merge_request: MergeRequestId,
        force_recreate: bool,
    ) -> Result<RefreshOutcome, RefreshError> {
        let Some(handle) = self.registry.handle(key).await else {
            debug!("no train for key; nothing to refresh");
            return Ok(RefreshOutcome::Aborted {
                reason: ReasonCode::NotOnTrain,
                promoted: None,
            });
        };

        match self
            .drive(&handle, key, merge_request, force_recreate)
            .await?
        {
            Ok(outcome) => Ok(outcome),
            Err(process) => self.abort(key, merge_request, process).await,
        }
    }

    /// The refresh algorithm proper. Inner `Err` is a process failure that
    /// [`Self::abort`] will consume; outer `Err` is infrastructure.
    async fn drive(
        &self,
        handle: &TrainHandle,
        key: &TrainKey,
        merge_request: MergeRequestId,
        force_recreate: bool,
    ) -> Result<Result<RefreshOutcome, ProcessError>, RefreshError> {
        // Step 1: preconditions, each mapped to an abort reason.
        if !self.projects.trains_enabled(key.project).await? {
            return Ok(Err(ProcessError::new(
                ReasonCode::TrainsDisabled,
                format!("merge trains are disabled for project {}", key.project),
            )));
        }

        // Snapshot the car under the lock, first re-deriving its base ref
        // from the predecessor's current speculative merge-ref (the car
        // ahead may have had its pipeline recreated since we last looked).
        let car = {
            let mut train = handle.train.lock().await;
            train.sync_base_ref(merge_request);
            train.car(merge_request).cloned()
        };
        let Some(car) = car else {
            return Ok(Err(ProcessError::new(
                ReasonCode::NotOnTrain,
                "merge request is not on the train",
            )));
        };

        let snapshot = match self.merge_requests.snapshot(key.project, merge_request).await {
            Ok(snapshot) => snapshot,
            Err(MergeRequestError::NotFound(project, mr)) => {
                return Ok(Err(ProcessError::new(
                    ReasonCode::NotMergeable,
                    format!("merge request {mr} no longer exists in project {project}"),
                )));
            }
            Err(e) => return Err(e.into()),
        };
        if !snapshot.mergeable_state() {
            let detail = if !snapshot.open {
                "merge request is closed"
            } else if snapshot.draft {
                "merge request is a draft"
            } else {
                "merge request cannot be merged"
            };
            return Ok(Err(ProcessError::new(ReasonCode::NotMergeable, detail)));
        }

        // A concurrent refresh is mid-merge for this very car; let it finish.
        if car.status == CarStatus::Merging {
            debug!("car is already merging; skipping");
            return Ok(Ok(RefreshOutcome::Unchanged));
        }

        let Some(previous_ref) = car.previous_ref_sha.clone() else {
            return Ok(Err(ProcessError::new(
                ReasonCode::MissingBaseRef,
                "car has no base ref to validate against",
            )));
        };

        // Step 2: pipeline (re)creation.
        let recreate = car.needs_pipeline() || force_recreate;
        if recreate {
            return self
                .recreate_pipeline(handle, key, &car, &previous_ref)
                .await;
        }

        // The car holds a current pipeline; a failed one is fatal and is
        // never auto-retried.
        let Some(pipeline) = car.pipeline else {
            // needs_pipeline() above guarantees this, but don't panic on it.
            return Ok(Ok(RefreshOutcome::Unchanged));
        };
        let status = self.pipelines.status(pipeline).await?;
        if status == PipelineStatus::Failed {
            return Ok(Err(ProcessError::new(
                ReasonCode::PipelineFailed,
                format!("validation pipeline {pipeline} failed"),
            )));
        }

        // Step 3: merge attempt, only for the head car with a green pipeline.
        if !car.is_head() || status != PipelineStatus::Succeeded {
            debug!(?status, position = car.position, "car not mergeable yet");
            return Ok(Ok(RefreshOutcome::Unchanged));
        }

        self.attempt_merge(handle, key, &car).await
    }

    /// Requests a new validation pipeline for `car` against `previous_ref`,
    /// supersedes the old pipeline, and records the new one on the car.
    async fn recreate_pipeline(
        &self,
        handle: &TrainHandle,
        key: &TrainKey,
        car: &Car,
        previous_ref: &Sha,
    ) -> Result<Result<RefreshOutcome, ProcessError>, RefreshError> {
        let created = match self
            .pipelines
            .create(key, previous_ref, car.merge_request)
            .await
        {
            Ok(created) => created,
            Err(PipelineError::Rejected(message)) => {
                return Ok(Err(ProcessError::new(
                    ReasonCode::PipelineCreationFailed,
                    message,
                )));
            }
            Err(e) => return Err(e.into()),
        };
        info!(pipeline = %created.id, base = %previous_ref.short(), "validation pipeline created");

        // Supersede the old pipeline. An optimistic-concurrency conflict
        // (the pipeline finished or was canceled concurrently) is a no-op
        // success, not an error.
        if let Some(superseded) = car.pipeline {
            match self.pipelines.cancel(superseded, Some(created.id)).await {
                Ok(CancelOutcome::Canceled) => {
                    debug!(pipeline = %superseded, "superseded pipeline canceled");
                }
                Ok(CancelOutcome::AlreadyFinished) => {
                    debug!(pipeline = %superseded, "superseded pipeline already finished");
                }
                Err(PipelineError::Rejected(message)) => {
                    warn!(pipeline = %superseded, %message, "cancel rejected; leaving pipeline to finish");
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Record under the lock, re-checking the car against the snapshot:
        // it may have left the train, a concurrent recreation of the same
        // car may have already attached its own replacement, or a merge
        // attempt may be in flight. In all three cases our pipeline must
        // not be recorded over what is there now.
        let recorded = {
            let mut train = handle.train.lock().await;
            match train.car_mut(car.merge_request) {
                Some(current)
                    if current.pipeline == car.pipeline
                        && current.status != CarStatus::Merging =>
                {
                    current.previous_ref_sha = Some(previous_ref.clone());
                    current.attach_pipeline(created.id, created.speculative_sha);
                    true
                }
                _ => false,
            }
        };

        if !recorded {
            // Superseded references get canceled, never silently dropped; a
            // pipeline no car points at must not keep running.
            warn!(pipeline = %created.id, "pipeline superseded before it was recorded; canceling orphan");
            if let Err(e) = self.pipelines.cancel(created.id, None).await {
                warn!(error = %e, "failed to cancel orphaned pipeline");
            }
            return Ok(Ok(RefreshOutcome::Unchanged));
        }

        Ok(Ok(RefreshOutcome::PipelineCreated {
            pipeline: created.id,
        }))
    }

    /// Tries to merge the head car. Skips (without error) when another
    /// refresh holds the merge lease or the car stopped being a fresh head
    /// in the meantime.
    async fn attempt_merge(
        &self,
        handle: &TrainHandle,
        key: &TrainKey,
        car: &Car,
    ) -> Result<Result<RefreshOutcome, ProcessError>, RefreshError> {
        let fast_forward = self.projects.fast_forward_enabled(key.project).await?;

        let Some(_lease) = handle.try_merge_lease() else {
            debug!("merge lease busy; another refresh is merging");
            return Ok(Ok(RefreshOutcome::Unchanged));
        };

        // Re-validate and mark `Merging` in one atomic step under the
        // train lock, then release it before calling the executor.
        {
            let mut train = handle.train.lock().await;
            let Some(current) = train.car_mut(car.merge_request) else {
                return Ok(Ok(RefreshOutcome::Unchanged));
            };
            if !current.is_head() || current.status != CarStatus::Fresh {
                debug!(status = ?current.status, "car no longer a fresh head; skipping merge");
                return Ok(Ok(RefreshOutcome::Unchanged));
            }
            current.status = CarStatus::Merging;
        }

        let strategy = if fast_forward {
            MergeStrategy::FastForward
        } else {
            car.merge_params.strategy
        };
        let order = MergeOrder {
            key: key.clone(),
            merge_request: car.merge_request,
            user: car.user,
            strategy,
            squash: car.merge_params.squash,
            commit_message: car.merge_params.commit_message.clone(),
            validated_ref: match strategy {
                MergeStrategy::FastForward => car.speculative_sha.clone(),
                MergeStrategy::Merge => None,
            },
        };

        info!(?strategy, "invoking merge executor");
        match self.merger.merge(order).await {
            Ok(MergeOutcome::Merged { commit }) => {
                let promoted = {
                    let mut train = handle.train.lock().await;
                    if let Some(current) = train.car_mut(car.merge_request) {
                        current.finish_merge();
                    }
                    train
                        .remove(car.merge_request, &commit)
                        .and_then(|removal| removal.promotion)
                };
                self.registry.drop_if_empty(key).await;

                info!(commit = %commit.short(), "car merged");
                Ok(Ok(RefreshOutcome::Merged { commit, promoted }))
            }
            Ok(MergeOutcome::Refused { message }) => {
                // Leave `Merging` before the abort runs: if the abort itself
                // hits an infrastructure error, the car must not stay wedged
                // in a state no retry can enter.
                let mut train = handle.train.lock().await;
                if let Some(current) = train.car_mut(car.merge_request) {
                    if current.status == CarStatus::Merging {
                        current.status = CarStatus::Fresh;
                    }
                }
                Ok(Err(ProcessError::new(ReasonCode::MergeFailed, message)))
            }
            Err(e) => {
                // Infrastructure failure mid-merge: put the car back so a
                // retried refresh can attempt the merge again.
                let mut train = handle.train.lock().await;
                if let Some(current) = train.car_mut(car.merge_request) {
                    if current.status == CarStatus::Merging {
                        current.status = CarStatus::Fresh;
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Consumes a [`ProcessError`]: removes the car, records the reason
    /// with the abort sink, and reports the successor needing a refresh.
    /// Never cascades - aborting one car aborts nobody else.
    async fn abort(
        &self,
        key: &TrainKey,
        merge_request: MergeRequestId,
        error: ProcessError,
    ) -> Result<RefreshOutcome, RefreshError> {
        warn!(reason = %error.reason, message = %error.message, "aborting car");

        // Removal needs the possibly-updated branch HEAD to seat a newly
        // promoted head car.
        let branch_head = self
            .projects
            .branch_head(key.project, &key.target_branch)
            .await?;

        let removal = self.registry.remove(key, merge_request, &branch_head).await;
        let promoted = removal.as_ref().and_then(|r| r.promotion.clone());

        if let Some(mut removal) = removal {
            removal.car.status = CarStatus::Aborted;
            // Fire-and-forget: a sink failure is logged, never rolls back
            // the abort.
            if let Err(e) = self
                .aborts
                .record(key, &removal.car, error.reason, &error.message)
                .await
            {
                warn!(error = %e, "abort sink failed; abort stands");
            }
        }

        Ok(RefreshOutcome::Aborted {
            reason: error.reason,
            promoted,
        })
    }
}
