//! Contract for reading merge request state.

use std::future::Future;

use thiserror::Error;

use crate::types::{MergeRequestId, MergeRequestSnapshot, ProjectId};

/// Errors from the merge request provider.
#[derive(Debug, Error)]
pub enum MergeRequestError {
    #[error("merge request {1} not found in project {0}")]
    NotFound(ProjectId, MergeRequestId),

    #[error("merge request provider unreachable: {0}")]
    Unreachable(String),
}

/// Reads the current state of a merge request.
///
/// Refresh preconditions always fetch a fresh snapshot: the merge request
/// can be closed, redrafted, or conflicted at any moment, independently of
/// what the train last saw.
pub trait MergeRequests: Send + Sync {
    fn snapshot(
        &self,
        project: ProjectId,
        merge_request: MergeRequestId,
    ) -> impl Future<Output = Result<MergeRequestSnapshot, MergeRequestError>> + Send;
}
