//! Relay error definitions.
//!
//! The stream's own failure channel is the opaque `Failure` type carried by
//! [`Completion::Failed`](super::protocol::Completion::Failed); the errors
//! here cover scheduler construction and runtime faults only and never flow
//! through a stream.

/// Errors produced by the scheduler adapters.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RelayError {
    /// No Tokio runtime was available to host the scheduler's execution
    /// context.
    #[error("no tokio runtime available")]
    RuntimeUnavailable,
    /// The scheduler's execution context has shut down and can no longer
    /// accept work.
    #[error("scheduler executor is unavailable")]
    ExecutorUnavailable,
}
