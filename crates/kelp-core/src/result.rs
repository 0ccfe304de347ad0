//! Result type alias for kelp operations

use crate::error::KelpError;

/// Standard Result type for kelp operations
pub type Result<T> = std::result::Result<T, KelpError>;

/// Skipping failed work items while processing a batch
pub trait ResultExt<T> {
    /// Log the error and continue with None
    fn log_and_continue(self) -> Option<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn log_and_continue(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                if err.is_recoverable() {
                    tracing::warn!("Continuing after error: {}", err);
                } else {
                    tracing::error!("Skipping after error: {}", err);
                }
                None
            }
        }
    }
}
