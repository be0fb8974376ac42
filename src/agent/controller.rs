use std::collections::VecDeque;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    action::{
        action_model::Action,
        executor::{ActionExecutor, ExecutionError},
        validator::{ValidatedAction, validate},
    },
    agent::{
        agent_model::{
            Decision, DecisionRequest, FEEDBACK_WINDOW, LoopConfig, LoopState, RunReport,
            StepOutcome, StepRecord,
        },
        decision::DecisionMaker,
        error::AgentError,
        memory::MemoryStore,
    },
    driver::driver_model::Driver,
    snapshot::{
        builder::{SnapshotBuilder, SnapshotError},
        render::describe_screen,
        snapshot_model::Snapshot,
    },
    trace::{
        logger::EventSink,
        trace::{LoopEvent, TraceEvent},
    },
};

/// Drives one task from `Idle` to a terminal state.
///
/// Each call to [`AgentLoop::step`] performs exactly one transition:
///
/// ```text
/// Idle -> Snapshotting -> AwaitingDecision -> Validating -> Executing -> Snapshotting ...
/// ```
///
/// Terminal states are `Succeeded`, `Failed` and `Cancelled`. A rejected
/// action goes back to `AwaitingDecision` on the same snapshot with the
/// rejection reason added to the feedback. The snapshot is rebuilt after
/// every executed action.
pub struct AgentLoop {
    task: String,
    config: LoopConfig,
    driver: Box<dyn Driver>,
    decision_maker: Box<dyn DecisionMaker>,
    memory: Option<Box<dyn MemoryStore>>,
    sinks: Vec<Box<dyn EventSink>>,
    builder: SnapshotBuilder,
    executor: ActionExecutor,
    cancel: CancellationToken,

    state: LoopState,
    snapshot: Option<Snapshot>,
    pending: Option<Action>,
    validated: Option<ValidatedAction>,
    initial_actions: VecDeque<Action>,
    feedback: Vec<String>,
    history: Vec<StepRecord>,
    steps_taken: u32,
    consecutive_failures: u32,
    snapshot_failures: u32,
}

impl AgentLoop {
    pub fn new(
        task: impl Into<String>,
        driver: Box<dyn Driver>,
        decision_maker: Box<dyn DecisionMaker>,
    ) -> Self {
        let config = LoopConfig::default();
        let cancel = CancellationToken::new();
        Self {
            task: task.into(),
            builder: SnapshotBuilder::new(config.snapshot_timeout),
            executor: ActionExecutor::new(config.retry.clone()).with_cancellation(cancel.clone()),
            config,
            driver,
            decision_maker,
            memory: None,
            sinks: Vec::new(),
            cancel,
            state: LoopState::Idle,
            snapshot: None,
            pending: None,
            validated: None,
            initial_actions: VecDeque::new(),
            feedback: Vec::new(),
            history: Vec::new(),
            steps_taken: 0,
            consecutive_failures: 0,
            snapshot_failures: 0,
        }
    }

    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.builder = SnapshotBuilder::new(config.snapshot_timeout);
        self.executor =
            ActionExecutor::new(config.retry.clone()).with_cancellation(self.cancel.clone());
        self.config = config;
        self
    }

    pub fn with_memory(mut self, memory: Box<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Actions run before the first decision, without consulting the
    /// decision-maker. They are still validated.
    pub fn with_initial_actions(mut self, actions: Vec<Action>) -> Self {
        self.initial_actions = actions.into();
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.executor =
            ActionExecutor::new(self.config.retry.clone()).with_cancellation(token.clone());
        self.cancel = token;
        self
    }

    /// Token that cancels this loop. Cancelling is idempotent.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    /// Decisions requested so far.
    pub fn steps_taken(&self) -> u32 {
        self.steps_taken
    }

    /// Run until a terminal state is reached.
    pub async fn run(&mut self) -> RunReport {
        info!(task = %self.task, max_steps = self.config.max_steps, "starting agent loop");

        while !self.state.is_terminal() {
            self.step().await;
        }

        let outcome = match &self.state {
            LoopState::Succeeded { summary } => format!("succeeded: {}", summary),
            LoopState::Failed(e) => format!("failed: {}", e),
            other => other.name().to_string(),
        };
        info!(steps = self.steps_taken, "agent loop finished, {}", outcome);
        self.emit(LoopEvent::RunFinished {
            outcome,
            steps: self.steps_taken,
        });

        RunReport {
            state: self.state.clone(),
            steps: self.steps_taken,
            history: self.history.clone(),
            last_snapshot: self.snapshot.as_ref().map(Snapshot::sequence),
        }
    }

    /// Release the driver session.
    pub async fn close(&mut self) {
        self.driver.close().await;
    }

    /// Perform one transition and return the resulting state.
    pub async fn step(&mut self) -> &LoopState {
        if self.state.is_terminal() {
            return &self.state;
        }

        if self.cancel.is_cancelled() {
            info!(state = self.state.name(), "cancellation requested");
            self.transition(LoopState::Cancelled);
            return &self.state;
        }

        let next = match self.state {
            LoopState::Idle => LoopState::Snapshotting,
            LoopState::Snapshotting => self.take_snapshot().await,
            LoopState::AwaitingDecision => self.await_decision().await,
            LoopState::Validating => self.validate_pending(),
            LoopState::Executing => self.execute_validated().await,
            LoopState::Succeeded { .. } | LoopState::Failed(_) | LoopState::Cancelled => {
                return &self.state;
            }
        };

        self.transition(next);
        &self.state
    }

    fn transition(&mut self, next: LoopState) {
        let from = self.state.name();
        let to = next.name();

        if let LoopState::Failed(e) = &next {
            error!(from, "agent loop failed: {}", e);
        } else if from != to {
            debug!(from, to, "state transition");
        }

        self.state = next;
        if from != to {
            self.emit(LoopEvent::StateChanged { from, to });
        }
    }

    fn emit(&self, event: LoopEvent) {
        if self.sinks.is_empty() {
            return;
        }
        let event = TraceEvent::now(self.steps_taken, event);
        for sink in &self.sinks {
            sink.emit(&event);
        }
    }

    // ------------------------------------------------------------------
    // Snapshotting
    // ------------------------------------------------------------------

    async fn take_snapshot(&mut self) -> LoopState {
        match self.builder.build(self.driver.as_mut()).await {
            Ok(snapshot) => {
                self.snapshot_failures = 0;
                info!(
                    sequence = snapshot.sequence(),
                    elements = snapshot.len(),
                    "snapshot built"
                );
                self.emit(LoopEvent::SnapshotBuilt {
                    sequence: snapshot.sequence(),
                    elements: snapshot.len(),
                });
                self.snapshot = Some(snapshot);
                LoopState::AwaitingDecision
            }
            Err(SnapshotError::DriverUnavailable(msg)) => {
                LoopState::Failed(AgentError::DriverUnavailable(msg))
            }
            Err(e) => {
                self.snapshot_failures += 1;
                let attempts = self.config.snapshot_attempts.max(1);
                if self.snapshot_failures >= attempts {
                    LoopState::Failed(e.into())
                } else {
                    warn!(
                        attempt = self.snapshot_failures,
                        max = attempts,
                        "snapshot failed: {}",
                        e
                    );
                    LoopState::Snapshotting
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Decision
    // ------------------------------------------------------------------

    async fn await_decision(&mut self) -> LoopState {
        if self.snapshot.is_none() {
            return LoopState::Snapshotting;
        }

        if let Some(action) = self.initial_actions.pop_front() {
            info!(%action, "running initial action");
            self.pending = Some(action);
            return LoopState::Validating;
        }

        if self.steps_taken >= self.config.max_steps {
            return LoopState::Failed(AgentError::StepBudgetExhausted(self.config.max_steps));
        }
        self.steps_taken += 1;

        if self.config.memory_interval > 0
            && self.steps_taken > 1
            && (self.steps_taken - 1) % self.config.memory_interval == 0
        {
            self.remember_progress().await;
        }

        let memory = self.recall_progress().await;
        let Some(request) = self.decision_request(memory) else {
            return LoopState::Snapshotting;
        };

        let attempts = self.config.decision_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(step = self.steps_taken, "decision abandoned on cancellation");
                    return LoopState::Cancelled;
                }
                outcome = timeout(
                    self.config.decision_timeout,
                    self.decision_maker.decide(&request),
                ) => outcome,
            };

            match outcome {
                Ok(Ok(decision)) => return self.accept_decision(decision),
                Ok(Err(e)) => {
                    warn!(attempt, max = attempts, "decision maker failed: {}", e);
                    last_error = e.to_string();
                }
                Err(_) => {
                    warn!(attempt, max = attempts, "decision maker timed out");
                    last_error = format!("no decision within {:?}", self.config.decision_timeout);
                }
            }
        }

        LoopState::Failed(AgentError::DecisionMaker(last_error))
    }

    fn decision_request(&self, memory: Option<String>) -> Option<DecisionRequest> {
        let snapshot = self.snapshot.as_ref()?;
        let skip = self.feedback.len().saturating_sub(FEEDBACK_WINDOW);

        Some(DecisionRequest {
            task: self.task.clone(),
            step: self.steps_taken,
            max_steps: self.config.max_steps,
            snapshot_sequence: snapshot.sequence(),
            screen: describe_screen(snapshot),
            feedback: self.feedback[skip..].to_vec(),
            history: self.history.iter().map(StepRecord::summary).collect(),
            memory,
        })
    }

    fn accept_decision(&mut self, decision: Decision) -> LoopState {
        let described = match &decision {
            Decision::Act(action) => action.to_string(),
            Decision::Complete { summary } => format!("complete: {}", summary),
            Decision::Fail { reason } => format!("fail: {}", reason),
        };
        info!(step = self.steps_taken, decision = %described, "decision received");
        self.emit(LoopEvent::DecisionReceived {
            decision: described,
        });

        match decision {
            Decision::Act(action) => {
                self.pending = Some(action);
                LoopState::Validating
            }
            Decision::Complete { summary } => {
                self.record(None, StepOutcome::Completed {
                    summary: summary.clone(),
                });
                LoopState::Succeeded { summary }
            }
            Decision::Fail { reason } => LoopState::Failed(AgentError::TaskAbandoned(reason)),
        }
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    fn validate_pending(&mut self) -> LoopState {
        let Some(action) = self.pending.take() else {
            return LoopState::AwaitingDecision;
        };
        let Some(snapshot) = self.snapshot.as_ref() else {
            return LoopState::Snapshotting;
        };
        let sequence = snapshot.sequence();

        match validate(&action, snapshot) {
            Ok(validated) => {
                debug!(%action, sequence, "action validated");
                self.emit(LoopEvent::ActionValidated {
                    sequence,
                    action: action.to_string(),
                });
                self.validated = Some(validated);
                LoopState::Executing
            }
            Err(rejection) => {
                warn!(%action, sequence, "action rejected: {}", rejection);
                self.emit(LoopEvent::ActionRejected {
                    sequence,
                    action: action.to_string(),
                    reason: rejection.to_string(),
                });
                self.record(Some(&action), StepOutcome::Rejected {
                    reason: rejection.to_string(),
                });
                self.feedback.push(format!(
                    "Action {} was rejected: {}. Choose a different action.",
                    action, rejection
                ));

                self.register_failure(rejection.into())
                    .unwrap_or(LoopState::AwaitingDecision)
            }
        }
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    async fn execute_validated(&mut self) -> LoopState {
        let Some(validated) = self.validated.take() else {
            return LoopState::AwaitingDecision;
        };
        let Some(snapshot) = self.snapshot.as_ref() else {
            return LoopState::Snapshotting;
        };

        let result = self
            .executor
            .execute(&validated, snapshot, self.driver.as_mut(), &mut self.builder)
            .await;

        let action = validated.into_action();
        let error_text = result.error.as_ref().map(ExecutionError::to_string);

        self.emit(LoopEvent::ExecutionFinished {
            action: action.to_string(),
            success: result.success,
            error: error_text.clone(),
            attempts: result.attempts,
            state_hint: result.state_hint,
        });
        self.record(Some(&action), StepOutcome::Executed {
            success: result.success,
            error: error_text.clone(),
            state_hint: result.state_hint,
        });

        if let Some(ExecutionError::Cancelled { attempts }) = result.error {
            info!(%action, attempts, "execution stopped on cancellation");
            return LoopState::Cancelled;
        }

        if result.success {
            info!(%action, attempts = result.attempts, "action executed");
            self.feedback.push(format!("Action {} executed.", action));
            self.consecutive_failures = 0;
            return LoopState::Snapshotting;
        }

        let reason = error_text.unwrap_or_else(|| "unknown error".into());
        warn!(%action, attempts = result.attempts, "action failed: {}", reason);
        self.feedback
            .push(format!("Action {} failed: {}", action, reason));

        let recoverable = result.is_recoverable();
        let error = match result.error {
            Some(e) => AgentError::from(e),
            None => AgentError::DriverError(reason),
        };

        if !recoverable {
            return LoopState::Failed(error);
        }

        self.register_failure(error)
            .unwrap_or(LoopState::Snapshotting)
    }

    /// Count a failed step; returns the terminal state once the limit is hit.
    fn register_failure(&mut self, error: AgentError) -> Option<LoopState> {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.config.max_failures.max(1) {
            return Some(LoopState::Failed(AgentError::TooManyFailures {
                count: self.consecutive_failures,
                last: Box::new(error),
            }));
        }
        None
    }

    fn record(&mut self, action: Option<&Action>, outcome: StepOutcome) {
        let snapshot_sequence = self.snapshot.as_ref().map(Snapshot::sequence).unwrap_or(0);
        self.history.push(StepRecord {
            step: self.steps_taken,
            snapshot_sequence,
            action: action.map(Action::to_string),
            outcome,
        });
    }

    // ------------------------------------------------------------------
    // Memory
    // ------------------------------------------------------------------

    fn memory_key(&self) -> String {
        format!("progress/{}", self.task)
    }

    async fn recall_progress(&self) -> Option<String> {
        let memory = self.memory.as_ref()?;
        match memory.recall(&self.memory_key()).await {
            Ok(note) => note,
            Err(e) => {
                warn!("memory recall failed, continuing without it: {}", e);
                None
            }
        }
    }

    async fn remember_progress(&self) {
        let Some(memory) = self.memory.as_ref() else {
            return;
        };

        let skip = self.history.len().saturating_sub(self.config.memory_interval as usize);
        let note = self.history[skip..]
            .iter()
            .map(StepRecord::summary)
            .collect::<Vec<_>>()
            .join("\n");

        if let Err(e) = memory.remember(&self.memory_key(), &note).await {
            warn!("memory write failed, continuing: {}", e);
        }
    }
}
