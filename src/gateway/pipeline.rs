//! Contract for the CI pipeline gateway.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{MergeRequestId, PipelineId, Sha, TrainKey};

/// Status of a validation pipeline as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl PipelineStatus {
    /// Returns true if the pipeline has reached a final status.
    pub fn is_finished(&self) -> bool {
        matches!(self, PipelineStatus::Succeeded | PipelineStatus::Failed)
    }
}

/// A freshly created validation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPipeline {
    pub id: PipelineId,

    /// The speculative merge-ref commit this pipeline validates: the base
    /// ref it was requested against plus the merge request's own changes.
    /// The next car on the train stacks onto this commit.
    pub speculative_sha: Sha,
}

/// Outcome of a cancel request.
///
/// `AlreadyFinished` is the idempotent-cancel contract: the gateway hit an
/// optimistic-concurrency conflict because the pipeline was concurrently
/// finishing or already canceled. Callers treat it exactly like `Canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Canceled,
    AlreadyFinished,
}

/// Errors from the pipeline gateway.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The gateway understood the request and refused it (invalid config,
    /// no CI defined for the ref, quota). Fatal to the car.
    #[error("pipeline request rejected: {0}")]
    Rejected(String),

    /// The gateway could not be reached. Infrastructure failure; the
    /// trigger should retry the whole refresh.
    #[error("pipeline gateway unreachable: {0}")]
    Unreachable(String),
}

/// Creates, cancels, and reports status of validation pipelines.
///
/// Calls are remote blocking I/O with timeouts owned by the implementation;
/// callers never hold a train lock across them.
pub trait PipelineGateway: Send + Sync {
    /// Requests a pipeline validating `merge_request`'s changes stacked on
    /// `previous_ref` (never the live target branch for non-head cars).
    fn create(
        &self,
        key: &TrainKey,
        previous_ref: &Sha,
        merge_request: MergeRequestId,
    ) -> impl Future<Output = Result<CreatedPipeline, PipelineError>> + Send;

    /// Cancels a superseded pipeline, recording which pipeline replaced it.
    fn cancel(
        &self,
        pipeline: PipelineId,
        superseded_by: Option<PipelineId>,
    ) -> impl Future<Output = Result<CancelOutcome, PipelineError>> + Send;

    /// Reports the current status of a pipeline.
    fn status(
        &self,
        pipeline: PipelineId,
    ) -> impl Future<Output = Result<PipelineStatus, PipelineError>> + Send;
}
