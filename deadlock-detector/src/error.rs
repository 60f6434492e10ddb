use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum DeadlockDetectionError {
    #[error("This version of the target VM doesn't support deadlock detection.")]
    PendingMonitorsUnsupported,
}
