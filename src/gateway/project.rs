//! Contract for project configuration and repository reads.

use std::future::Future;

use thiserror::Error;

use crate::types::{ProjectId, Sha};

/// Errors from the project gateway.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("branch {1} not found in project {0}")]
    BranchNotFound(ProjectId, String),

    #[error("project gateway unreachable: {0}")]
    Unreachable(String),
}

/// Per-project configuration plus the one repository read the sequencer
/// needs: the target branch's current HEAD, used to seat a head car when it
/// is enqueued first or promoted after its predecessor left.
pub trait ProjectGateway: Send + Sync {
    /// Whether merge trains are enabled for the project. Checked on every
    /// refresh so that disabling the feature drains existing trains.
    fn trains_enabled(
        &self,
        project: ProjectId,
    ) -> impl Future<Output = Result<bool, ProjectError>> + Send;

    /// Whether merges should fast-forward the branch to the validated
    /// speculative ref instead of creating a merge commit.
    fn fast_forward_enabled(
        &self,
        project: ProjectId,
    ) -> impl Future<Output = Result<bool, ProjectError>> + Send;

    /// The current HEAD commit of a branch.
    fn branch_head(
        &self,
        project: ProjectId,
        branch: &str,
    ) -> impl Future<Output = Result<Sha, ProjectError>> + Send;
}
