//! Contracts for the external collaborators the refresh engine drives.
//!
//! Each trait describes one remote system: CI pipelines, the merge
//! mechanics, merge request state, project configuration, and the audit
//! sink. All calls are remote blocking I/O; implementations own their
//! timeouts and retries. The trait-based design enables mock collaborators
//! for testing the engine without I/O.
//!
//! Every gateway error type splits into two families:
//! - a *rejection* the remote system reported (fatal to the car being
//!   refreshed, converted to an abort), and
//! - an `Unreachable` infrastructure failure (propagated to the trigger,
//!   which should retry the refresh).

pub mod merge;
pub mod mr;
pub mod notify;
pub mod pipeline;
pub mod project;

pub use merge::{MergeExecError, MergeExecutor, MergeOrder, MergeOutcome};
pub use mr::{MergeRequestError, MergeRequests};
pub use notify::{AbortSink, NotifyError};
pub use pipeline::{
    CancelOutcome, CreatedPipeline, PipelineError, PipelineGateway, PipelineStatus,
};
pub use project::{ProjectError, ProjectGateway};
