use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Failure kinds a session operation can report.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "message")]
pub enum RunError {
    #[error("User not authenticated")]
    NotAuthenticated,
    #[error("You already have an active run")]
    AlreadyActive,
    #[error("Run not found")]
    NotFound,
    #[error("Unauthorized to modify this run")]
    Unauthorized,
    #[error("Run is still in progress")]
    RunInProgress,
    #[error("{0}")]
    BackendFailure(String),
}

impl From<StoreError> for RunError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => RunError::NotFound,
            err @ StoreError::AlreadyStopped(_) => RunError::BackendFailure(err.to_string()),
            StoreError::Backend(message) => RunError::BackendFailure(message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Start,
    Stop,
    Delete,
    /// Resuming an active run at session start.
    Recover,
}

/// The single observable error slot of a session, tagged with the
/// operation that raised it.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{operation:?} failed: {error}")]
pub struct OperationError {
    pub operation: Operation,
    pub error: RunError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_run_errors() {
        assert_eq!(
            RunError::from(StoreError::NotFound("r1".into())),
            RunError::NotFound
        );
        assert_eq!(
            RunError::from(StoreError::Backend("permission denied".into())),
            RunError::BackendFailure("permission denied".into())
        );
        assert_eq!(
            RunError::from(StoreError::AlreadyStopped("r1".into())),
            RunError::BackendFailure("run r1 has already been stopped".into())
        );
    }

    #[test]
    fn backend_message_passes_through() {
        let err = OperationError {
            operation: Operation::Stop,
            error: RunError::BackendFailure("network unreachable".into()),
        };
        assert_eq!(err.to_string(), "Stop failed: network unreachable");
    }
}
