//! Contract for the merge executor.

use std::future::Future;

use thiserror::Error;

use crate::types::{MergeRequestId, MergeStrategy, Sha, TrainKey, UserId};

/// Everything the executor needs to land one car's changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOrder {
    pub key: TrainKey,
    pub merge_request: MergeRequestId,

    /// The user on whose behalf the merge is performed.
    pub user: UserId,

    pub strategy: MergeStrategy,
    pub squash: bool,
    pub commit_message: Option<String>,

    /// For [`MergeStrategy::FastForward`]: the car's already-validated
    /// speculative merge-ref, which becomes the new branch tip directly
    /// instead of producing a redundant merge commit.
    pub validated_ref: Option<Sha>,
}

/// What the executor reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The branch was advanced; `commit` is its new HEAD.
    Merged { commit: Sha },

    /// The executor understood the request and could not merge (conflict,
    /// rejected hook). Fatal to the car, with the executor's message.
    Refused { message: String },
}

/// Errors from the merge executor.
#[derive(Debug, Error)]
pub enum MergeExecError {
    /// The executor could not be reached. Infrastructure failure; the
    /// trigger should retry the whole refresh.
    #[error("merge executor unreachable: {0}")]
    Unreachable(String),
}

/// Performs the actual branch merge. The only collaborator allowed to
/// mutate the target branch.
pub trait MergeExecutor: Send + Sync {
    fn merge(
        &self,
        order: MergeOrder,
    ) -> impl Future<Output = Result<MergeOutcome, MergeExecError>> + Send;
}
