use serde::Serialize;
use thiserror::Error;

/// Failure of a single task on a single host.
///
/// None of these are fatal to other hosts; they are recorded in the task
/// result and surface in the recap.
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    /// The host could not be reached or the transport broke mid-task.
    #[error("failed to connect to {host}: {message}")]
    Connection { host: String, message: String },

    /// The idempotence check could not be evaluated.
    #[error("precondition check failed: {message}")]
    Precondition { message: String },

    /// An underlying OS command returned a non-zero exit status.
    #[error("command failed with exit code {exit_code}: {stderr}")]
    Mutation { exit_code: i32, stderr: String },

    /// A syntax check rejected the staged change before it was committed.
    #[error("validation failed with exit code {exit_code}: {stderr}")]
    Validation { exit_code: i32, stderr: String },
}

impl TaskError {
    pub fn connection(host: &str, err: impl std::fmt::Display) -> Self {
        TaskError::Connection {
            host: host.to_string(),
            message: err.to_string(),
        }
    }

    pub fn precondition(err: impl std::fmt::Display) -> Self {
        TaskError::Precondition {
            message: err.to_string(),
        }
    }
}
