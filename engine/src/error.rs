//! Error types for the livelist engine.

use thiserror::Error;

/// All possible errors from the livelist engine.
///
/// Unmatched repository events are deliberately absent: an update, remove or
/// replace that finds nothing to act on is dropped, not reported.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Lifecycle errors
    #[error("list is not connected")]
    NotConnected,

    #[error("list is already being modified")]
    ModifyInProgress,

    // Caller-supplied function errors
    #[error("transform failed: {0}")]
    Transform(String),

    // Input errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
