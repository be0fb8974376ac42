use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriverError {
    /// Session is not connected or the backend process is gone
    #[error("driver unavailable: {0}")]
    Unavailable(String),

    /// Backend did not answer in time
    #[error("driver timeout: {0}")]
    Timeout(String),

    /// Locator no longer resolves in the live UI
    #[error("stale element: {0}")]
    StaleElement(String),

    /// Backend reported a failure (app crash, permission dialog, ...)
    #[error("{command} failed: {message}")]
    Command { command: String, message: String },

    /// Malformed exchange with the backend
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        DriverError::Command {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, DriverError::Timeout(_) | DriverError::StaleElement(_))
    }
}
