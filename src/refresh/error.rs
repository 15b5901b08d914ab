//! The refresh error taxonomy.
//!
//! Every way a car can fail out of the train maps to one recoverable error
//! kind, [`ProcessError`], carrying a [`ReasonCode`]. Process errors are
//! consumed at the engine boundary - converted into a car abort plus an
//! abort-sink record - and never surface to the trigger. Only
//! [`RefreshError`] (a collaborator being unreachable) propagates, and the
//! trigger is expected to retry it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::{MergeExecError, MergeRequestError, PipelineError, ProjectError};

/// Why a car was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Merge trains are not enabled for the project.
    TrainsDisabled,

    /// The merge request is no longer on the train (concurrently removed).
    NotOnTrain,

    /// The merge request is closed, broken, or a draft.
    NotMergeable,

    /// The car has no base ref to validate against.
    MissingBaseRef,

    /// The car's validation pipeline failed. Not auto-retried.
    PipelineFailed,

    /// The pipeline gateway refused to create a validation pipeline.
    PipelineCreationFailed,

    /// The merge executor refused the merge.
    MergeFailed,
}

impl ReasonCode {
    /// Stable identifier for audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::TrainsDisabled => "trains_disabled",
            ReasonCode::NotOnTrain => "not_on_train",
            ReasonCode::NotMergeable => "not_mergeable",
            ReasonCode::MissingBaseRef => "missing_base_ref",
            ReasonCode::PipelineFailed => "pipeline_failed",
            ReasonCode::PipelineCreationFailed => "pipeline_creation_failed",
            ReasonCode::MergeFailed => "merge_failed",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recoverable failure within the refresh algorithm: the car leaves the
/// train with a recorded reason, the train itself keeps going.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}: {message}")]
pub struct ProcessError {
    pub reason: ReasonCode,

    /// Human-readable detail, recorded with the abort sink.
    pub message: String,
}

impl ProcessError {
    pub fn new(reason: ReasonCode, message: impl Into<String>) -> Self {
        ProcessError {
            reason,
            message: message.into(),
        }
    }
}

/// An infrastructure failure: a collaborator could not be reached, so the
/// refresh could not run to a decision. Nothing was aborted; the trigger
/// should retry.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Merge(#[from] MergeExecError),

    #[error(transparent)]
    MergeRequest(#[from] MergeRequestError),

    #[error(transparent)]
    Project(#[from] ProjectError),
}
