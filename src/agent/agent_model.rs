use std::time::Duration;

use serde::Serialize;

use crate::{
    action::{
        action_model::Action,
        executor::{RetryPolicy, StateHint},
    },
    agent::error::AgentError,
    snapshot::builder::DEFAULT_SNAPSHOT_TIMEOUT,
};

pub const DEFAULT_MAX_STEPS: u32 = 100;
pub const DEFAULT_MAX_FAILURES: u32 = 3;
pub const DEFAULT_SNAPSHOT_ATTEMPTS: u32 = 3;
pub const DEFAULT_DECISION_ATTEMPTS: u32 = 3;
pub const DEFAULT_DECISION_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MEMORY_INTERVAL: u32 = 10;

/// Feedback lines handed to the decision-maker each step.
pub const FEEDBACK_WINDOW: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    Idle,
    Snapshotting,
    AwaitingDecision,
    Validating,
    Executing,
    Succeeded { summary: String },
    Failed(AgentError),
    Cancelled,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoopState::Succeeded { .. } | LoopState::Failed(_) | LoopState::Cancelled
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            LoopState::Idle => "idle",
            LoopState::Snapshotting => "snapshotting",
            LoopState::AwaitingDecision => "awaiting_decision",
            LoopState::Validating => "validating",
            LoopState::Executing => "executing",
            LoopState::Succeeded { .. } => "succeeded",
            LoopState::Failed(_) => "failed",
            LoopState::Cancelled => "cancelled",
        }
    }
}

/// What the decision-maker returns for one step.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Act(Action),
    /// Explicit completion; the only way a run ends in `Succeeded`.
    Complete { summary: String },
    /// The decision-maker gives up on the task.
    Fail { reason: String },
}

/// Everything the decision-maker gets to see. No native locators.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionRequest {
    pub task: String,
    /// 1-based step number.
    pub step: u32,
    pub max_steps: u32,
    pub snapshot_sequence: u64,
    /// Rendered interactable elements of the current snapshot.
    pub screen: String,
    /// Most recent rejection reasons and execution results.
    pub feedback: Vec<String>,
    pub history: Vec<String>,
    pub memory: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    pub max_steps: u32,
    /// Consecutive failed executions or rejections before giving up.
    pub max_failures: u32,
    pub snapshot_attempts: u32,
    pub decision_attempts: u32,
    pub snapshot_timeout: Duration,
    pub decision_timeout: Duration,
    pub retry: RetryPolicy,
    /// Write a progress note to memory every N steps; 0 disables it.
    pub memory_interval: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_failures: DEFAULT_MAX_FAILURES,
            snapshot_attempts: DEFAULT_SNAPSHOT_ATTEMPTS,
            decision_attempts: DEFAULT_DECISION_ATTEMPTS,
            snapshot_timeout: DEFAULT_SNAPSHOT_TIMEOUT,
            decision_timeout: DEFAULT_DECISION_TIMEOUT,
            retry: RetryPolicy::default(),
            memory_interval: DEFAULT_MEMORY_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Rejected {
        reason: String,
    },
    Executed {
        success: bool,
        error: Option<String>,
        state_hint: StateHint,
    },
    Completed {
        summary: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub step: u32,
    pub snapshot_sequence: u64,
    pub action: Option<String>,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

impl StepRecord {
    pub fn summary(&self) -> String {
        let action = self.action.as_deref().unwrap_or("-");
        match &self.outcome {
            StepOutcome::Rejected { reason } => {
                format!("step {}: {} rejected ({})", self.step, action, reason)
            }
            StepOutcome::Executed { success: true, .. } => {
                format!("step {}: {} ok", self.step, action)
            }
            StepOutcome::Executed { error, .. } => format!(
                "step {}: {} failed ({})",
                self.step,
                action,
                error.as_deref().unwrap_or("unknown error")
            ),
            StepOutcome::Completed { summary } => {
                format!("step {}: done ({})", self.step, summary)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub state: LoopState,
    pub steps: u32,
    pub history: Vec<StepRecord>,
    pub last_snapshot: Option<u64>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.state, LoopState::Succeeded { .. })
    }
}
