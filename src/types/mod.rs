//! Core domain types for merge-train sequencing.
//!
//! This module contains all the fundamental types used throughout the crate,
//! designed to encode invariants via the type system.

pub mod car;
pub mod ids;
pub mod mr;

// Re-export commonly used types at the module level
pub use car::{Car, CarStatus, MergeParams, MergeStrategy};
pub use ids::{MergeRequestId, PipelineId, ProjectId, Sha, TrainKey, UserId};
pub use mr::MergeRequestSnapshot;
