//! Merge-train sequencing core.
//!
//! Many merge requests targeting the same branch are validated in parallel
//! via stacked, speculative CI pipelines, then merged in a guaranteed order:
//! the queue admits concurrent validation while the actual branch mutation
//! stays strictly serial. This crate provides the Train/Car queue model and
//! the refresh algorithm that advances a queue entry through validation and
//! merge; git mechanics, CI execution, and notifications are behind the
//! collaborator traits in [`gateway`].

pub mod gateway;
pub mod refresh;
pub mod state;
pub mod types;
