//! The refresh engine: validates, (re)creates pipelines, merges, aborts.
//!
//! # Architecture
//!
//! The engine is stateless apart from the shared [`TrainRegistry`]: each
//! `refresh` call reads the car's state, talks to the collaborators, and
//! applies its mutations as single atomic updates under the train lock.
//! The abort path is an ordinary return branch, not an unwind.
//!
//! [`TrainRegistry`]: crate::state::TrainRegistry

pub mod engine;
pub mod error;


pub use engine::{EnqueueOutcome, RefreshEngine, RefreshOutcome};
pub use error::{ProcessError, ReasonCode, RefreshError};
