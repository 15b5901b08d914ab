//! Contract for the abort/notify sink.

use std::future::Future;

use thiserror::Error;

use crate::refresh::ReasonCode;
use crate::types::{Car, TrainKey};

/// Errors from the abort sink.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("abort sink unreachable: {0}")]
    Unreachable(String),
}

/// Records why a car left the train, for audit/timeline purposes.
///
/// Fire-and-forget: the refresh engine logs a failure here and moves on.
/// A sink error must never roll back the abort itself.
pub trait AbortSink: Send + Sync {
    fn record(
        &self,
        key: &TrainKey,
        car: &Car,
        reason: ReasonCode,
        message: &str,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}
