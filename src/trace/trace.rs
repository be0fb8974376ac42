use chrono::Utc;
use serde::Serialize;

use crate::action::executor::StateHint;

/// Observable loop events, one per line in the trace file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoopEvent {
    StateChanged {
        from: &'static str,
        to: &'static str,
    },
    SnapshotBuilt {
        sequence: u64,
        elements: usize,
    },
    DecisionReceived {
        decision: String,
    },
    ActionValidated {
        sequence: u64,
        action: String,
    },
    ActionRejected {
        sequence: u64,
        action: String,
        reason: String,
    },
    ExecutionFinished {
        action: String,
        success: bool,
        error: Option<String>,
        attempts: u32,
        state_hint: StateHint,
    },
    RunFinished {
        outcome: String,
        steps: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    pub timestamp_ms: i64,
    pub step: u32,
    #[serde(flatten)]
    pub event: LoopEvent,
}

impl TraceEvent {
    pub fn now(step: u32, event: LoopEvent) -> Self {
        Self {
            timestamp_ms: Utc::now().timestamp_millis(),
            step,
            event,
        }
    }
}
