use std::time::Duration;

use thiserror::Error;

use crate::{
    action::{executor::ExecutionError, validator::Rejection},
    snapshot::builder::SnapshotError,
};

/// Why a run ended in `Failed`. The originating reason is always kept.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AgentError {
    #[error("driver unavailable: {0}")]
    DriverUnavailable(String),

    #[error("snapshot timed out after {0:?}")]
    SnapshotTimeout(Duration),

    #[error("stale element: {0}")]
    StaleElement(String),

    #[error("driver timeout: {0}")]
    DriverTimeout(String),

    #[error("driver error: {0}")]
    DriverError(String),

    #[error("action rejected: {0}")]
    Rejected(Rejection),

    #[error("decision maker error: {0}")]
    DecisionMaker(String),

    /// The decision-maker signalled that the task cannot be completed.
    #[error("task abandoned: {0}")]
    TaskAbandoned(String),

    #[error("failed to complete task in maximum steps ({0})")]
    StepBudgetExhausted(u32),

    #[error("stopped after {count} consecutive failures; last: {last}")]
    TooManyFailures { count: u32, last: Box<AgentError> },
}

impl From<SnapshotError> for AgentError {
    fn from(e: SnapshotError) -> Self {
        match e {
            SnapshotError::DriverUnavailable(msg) => AgentError::DriverUnavailable(msg),
            SnapshotError::Timeout(after) => AgentError::SnapshotTimeout(after),
            SnapshotError::Driver(inner) => AgentError::DriverError(inner.to_string()),
        }
    }
}

impl From<ExecutionError> for AgentError {
    fn from(e: ExecutionError) -> Self {
        match e {
            ExecutionError::Stale(msg) => AgentError::StaleElement(msg),
            ExecutionError::Timeout { attempts } => {
                AgentError::DriverTimeout(format!("gave up after {} attempts", attempts))
            }
            ExecutionError::Driver(msg) => AgentError::DriverError(msg),
            ExecutionError::Unavailable(msg) => AgentError::DriverUnavailable(msg),
            ExecutionError::StaleSequence { validated, current } => AgentError::StaleElement(
                format!("validated against #{} but executed against #{}", validated, current),
            ),
            ExecutionError::Cancelled { attempts } => {
                AgentError::DriverError(format!("cancelled after {} attempts", attempts))
            }
        }
    }
}

impl From<Rejection> for AgentError {
    fn from(r: Rejection) -> Self {
        AgentError::Rejected(r)
    }
}
