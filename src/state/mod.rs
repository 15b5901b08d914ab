//! Queue state for merge trains.
//!
//! `train` and `stacking` are the functional core: pure ordering and base-ref
//! bookkeeping with no I/O. `registry` adds the shared, lock-guarded map of
//! live trains that concurrent refreshes operate on.

pub mod registry;
pub mod stacking;
pub mod train;

// Re-export commonly used types and functions
pub use registry::{TrainHandle, TrainRegistry};
pub use stacking::base_ref_for;
pub use train::{Promotion, Removal, Train};
