use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    action::{
        action_model::{Action, Operation},
        validator::{ValidatedAction, validate},
    },
    driver::{
        driver_model::{Driver, DriverCommand},
        error::DriverError,
    },
    snapshot::{
        builder::{SnapshotBuilder, SnapshotError},
        snapshot_model::Snapshot,
    },
};

pub const DEFAULT_TIMEOUT_ATTEMPTS: u32 = 2;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(250);
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total dispatch attempts when the driver times out.
    pub timeout_attempts: u32,
    /// First backoff delay; doubles on each further attempt.
    pub backoff: Duration,
    /// Bound on a single dispatch.
    pub action_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout_attempts: DEFAULT_TIMEOUT_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
            action_timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("action failed (stale): {0}")]
    Stale(String),

    #[error("action failed (timeout) after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("driver error: {0}")]
    Driver(String),

    #[error("driver unavailable: {0}")]
    Unavailable(String),

    #[error("action validated against snapshot #{validated} but executed against #{current}")]
    StaleSequence { validated: u64, current: u64 },

    /// Cancellation arrived after the first dispatch; no further driver call was made.
    #[error("execution cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl ExecutionError {
    /// Everything except a lost session can be answered with a fresh
    /// snapshot and a new decision.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ExecutionError::Unavailable(_))
    }
}

/// What the executor believes the UI did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "hint", rename_all = "snake_case")]
pub enum StateHint {
    /// Nothing reached the driver.
    Unchanged,
    /// The command was delivered; the UI may have moved on.
    Dispatched,
    /// Staleness recovery rebuilt the snapshot with this sequence number.
    Rebuilt { sequence: u64 },
    /// The driver failed mid-command.
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    pub error: Option<ExecutionError>,
    pub state_hint: StateHint,
    /// Driver dispatches issued for this action.
    pub attempts: u32,
}

impl ExecutionResult {
    fn succeeded(state_hint: StateHint, attempts: u32) -> Self {
        Self {
            success: true,
            error: None,
            state_hint,
            attempts,
        }
    }

    fn failed(error: ExecutionError, state_hint: StateHint, attempts: u32) -> Self {
        Self {
            success: false,
            error: Some(error),
            state_hint,
            attempts,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.error.as_ref().is_none_or(ExecutionError::is_recoverable)
    }
}

pub struct ActionExecutor {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl ActionExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop retrying (and skip stale recovery) once `token` is cancelled.
    /// A dispatch already in flight always runs to completion.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Issue a validated action.
    ///
    /// A stale locator triggers exactly one snapshot rebuild and one retry.
    /// Driver timeouts are retried with backoff up to the policy bound.
    /// Other driver errors are returned at once.
    pub async fn execute<D: Driver + ?Sized>(
        &self,
        validated: &ValidatedAction,
        snapshot: &Snapshot,
        driver: &mut D,
        builder: &mut SnapshotBuilder,
    ) -> ExecutionResult {
        if validated.sequence() != snapshot.sequence() {
            warn!(
                validated = validated.sequence(),
                current = snapshot.sequence(),
                "refusing action validated against another snapshot"
            );
            return ExecutionResult::failed(
                ExecutionError::StaleSequence {
                    validated: validated.sequence(),
                    current: snapshot.sequence(),
                },
                StateHint::Unchanged,
                0,
            );
        }

        let action = validated.action();
        let command = match to_command(action, snapshot) {
            Ok(Some(command)) => command,
            Ok(None) => {
                if let Operation::Wait { duration_ms } = action.operation {
                    debug!(duration_ms, "waiting");
                    sleep(Duration::from_millis(duration_ms)).await;
                }
                return ExecutionResult::succeeded(StateHint::Unchanged, 0);
            }
            Err(e) => return ExecutionResult::failed(e, StateHint::Unchanged, 0),
        };

        let mut attempts = 0;
        match self.dispatch_with_retry(driver, &command, &mut attempts).await {
            Ok(()) => ExecutionResult::succeeded(StateHint::Dispatched, attempts),
            Err(DriverError::Unavailable(msg)) => ExecutionResult::failed(
                ExecutionError::Unavailable(msg),
                StateHint::Unknown,
                attempts,
            ),
            Err(_) if self.cancel.is_cancelled() => self.cancelled(attempts, StateHint::Unknown),
            Err(DriverError::StaleElement(msg)) => {
                self.recover_stale(action, driver, builder, attempts, msg)
                    .await
            }
            Err(e) => {
                ExecutionResult::failed(execution_error(e, attempts), StateHint::Unknown, attempts)
            }
        }
    }

    async fn recover_stale<D: Driver + ?Sized>(
        &self,
        action: &Action,
        driver: &mut D,
        builder: &mut SnapshotBuilder,
        mut attempts: u32,
        reason: String,
    ) -> ExecutionResult {
        let Some(target) = action.target else {
            return ExecutionResult::failed(
                ExecutionError::Stale(reason),
                StateHint::Unknown,
                attempts,
            );
        };

        info!(%target, "stale locator; rebuilding snapshot");

        let fresh = match builder.build(driver).await {
            Ok(snapshot) => snapshot,
            Err(SnapshotError::DriverUnavailable(msg)) => {
                return ExecutionResult::failed(
                    ExecutionError::Unavailable(msg),
                    StateHint::Unknown,
                    attempts,
                );
            }
            Err(e) => {
                return ExecutionResult::failed(
                    ExecutionError::Stale(format!("rebuild failed: {}", e)),
                    StateHint::Unknown,
                    attempts,
                );
            }
        };

        let hint = StateHint::Rebuilt {
            sequence: fresh.sequence(),
        };

        if !fresh.contains(target) {
            return ExecutionResult::failed(
                ExecutionError::Stale(format!("element {} retired after UI change", target)),
                hint,
                attempts,
            );
        }

        if self.cancel.is_cancelled() {
            return self.cancelled(attempts, hint);
        }

        let revalidated = match validate(action, &fresh) {
            Ok(v) => v,
            Err(rejection) => {
                return ExecutionResult::failed(
                    ExecutionError::Stale(format!("element {} changed: {}", target, rejection)),
                    hint,
                    attempts,
                );
            }
        };

        let command = match to_command(revalidated.action(), &fresh) {
            Ok(Some(command)) => command,
            Ok(None) => return ExecutionResult::succeeded(hint, attempts),
            Err(e) => return ExecutionResult::failed(e, hint, attempts),
        };

        match self.dispatch_with_retry(driver, &command, &mut attempts).await {
            Ok(()) => ExecutionResult::succeeded(hint, attempts),
            Err(e) => ExecutionResult::failed(execution_error(e, attempts), hint, attempts),
        }
    }

    fn cancelled(&self, attempts: u32, state_hint: StateHint) -> ExecutionResult {
        info!(attempts, "execution cancelled; no further driver calls");
        ExecutionResult::failed(ExecutionError::Cancelled { attempts }, state_hint, attempts)
    }

    async fn dispatch_with_retry<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
        command: &DriverCommand,
        attempts: &mut u32,
    ) -> Result<(), DriverError> {
        let max = self.policy.timeout_attempts.max(1);
        let mut tries = 0;

        loop {
            tries += 1;
            *attempts += 1;

            let outcome = match timeout(self.policy.action_timeout, driver.dispatch(command)).await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(DriverError::Timeout(format!(
                    "{} exceeded {:?}",
                    command.name(),
                    self.policy.action_timeout
                ))),
            };

            match outcome {
                Err(DriverError::Timeout(msg)) if tries < max && !self.cancel.is_cancelled() => {
                    let delay = self.policy.backoff * 2u32.saturating_pow(tries - 1);
                    warn!(attempt = tries, max, ?delay, "driver timeout: {}", msg);
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(DriverError::Timeout(msg)),
                        _ = sleep(delay) => {}
                    }
                }
                other => return other,
            }
        }
    }
}

fn execution_error(error: DriverError, attempts: u32) -> ExecutionError {
    match error {
        DriverError::Timeout(_) => ExecutionError::Timeout { attempts },
        DriverError::StaleElement(msg) => ExecutionError::Stale(msg),
        DriverError::Unavailable(msg) => ExecutionError::Unavailable(msg),
        other => ExecutionError::Driver(other.to_string()),
    }
}

/// Translate an action into its driver command; `None` for actions that
/// never touch the driver.
fn to_command(
    action: &Action,
    snapshot: &Snapshot,
) -> Result<Option<DriverCommand>, ExecutionError> {
    let locator = match action.target {
        Some(id) => Some(
            snapshot
                .resolve(id)
                .map_err(|e| ExecutionError::Stale(e.to_string()))?
                .locator()
                .clone(),
        ),
        None => None,
    };

    let command = match (&action.operation, locator) {
        (Operation::Wait { .. }, _) => return Ok(None),
        (Operation::Back, _) => DriverCommand::Back,
        (Operation::Swipe { from, to, duration_ms }, _) => DriverCommand::Swipe {
            from: *from,
            to: *to,
            duration_ms: *duration_ms,
        },
        (Operation::Tap, Some(locator)) => DriverCommand::Tap { locator },
        (Operation::LongPress { duration_ms }, Some(locator)) => DriverCommand::LongPress {
            locator,
            duration_ms: *duration_ms,
        },
        (Operation::TypeText { text, clear_first }, Some(locator)) => DriverCommand::TypeText {
            locator,
            text: text.clone(),
            clear_first: *clear_first,
        },
        (Operation::ClearText, Some(locator)) => DriverCommand::Clear { locator },
        (Operation::Scroll { direction }, Some(locator)) => DriverCommand::Scroll {
            locator,
            direction: *direction,
        },
        (op, None) => {
            return Err(ExecutionError::Driver(format!(
                "{} reached the executor without a target",
                op.name()
            )));
        }
    };

    Ok(Some(command))
}
