use std::fmt;

use serde::{Deserialize, Serialize};

use crate::snapshot::snapshot_model::ElementId;

pub use crate::driver::driver_model::{Direction, Point};

pub const DEFAULT_LONG_PRESS_MS: u64 = 800;
pub const DEFAULT_SWIPE_MS: u64 = 400;

/// What the decision-maker wants done. Consumed once.
///
/// Wire form (as produced by the model):
/// `{"op":"type_text","target":2,"text":"hello"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ElementId>,
    #[serde(flatten)]
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Tap,
    LongPress {
        #[serde(default = "default_long_press_ms")]
        duration_ms: u64,
    },
    TypeText {
        text: String,
        #[serde(default)]
        clear_first: bool,
    },
    ClearText,
    Swipe {
        from: Point,
        to: Point,
        #[serde(default = "default_swipe_ms")]
        duration_ms: u64,
    },
    Scroll {
        direction: Direction,
    },
    Back,
    Wait {
        duration_ms: u64,
    },
}

fn default_long_press_ms() -> u64 {
    DEFAULT_LONG_PRESS_MS
}

fn default_swipe_ms() -> u64 {
    DEFAULT_SWIPE_MS
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Tap => "tap",
            Operation::LongPress { .. } => "long_press",
            Operation::TypeText { .. } => "type_text",
            Operation::ClearText => "clear_text",
            Operation::Swipe { .. } => "swipe",
            Operation::Scroll { .. } => "scroll",
            Operation::Back => "back",
            Operation::Wait { .. } => "wait",
        }
    }

    /// Operations that act on one element and need its locator.
    pub fn requires_target(&self) -> bool {
        matches!(
            self,
            Operation::Tap
                | Operation::LongPress { .. }
                | Operation::TypeText { .. }
                | Operation::ClearText
                | Operation::Scroll { .. }
        )
    }

    /// Operations that never take a target.
    pub fn forbids_target(&self) -> bool {
        matches!(self, Operation::Back | Operation::Wait { .. })
    }
}

impl Action {
    pub fn on(target: ElementId, operation: Operation) -> Self {
        Self {
            target: Some(target),
            operation,
        }
    }

    pub fn global(operation: Operation) -> Self {
        Self {
            target: None,
            operation,
        }
    }

    pub fn tap(target: ElementId) -> Self {
        Self::on(target, Operation::Tap)
    }

    pub fn type_text(target: ElementId, text: impl Into<String>) -> Self {
        Self::on(
            target,
            Operation::TypeText {
                text: text.into(),
                clear_first: false,
            },
        )
    }

    pub fn swipe(from: Point, to: Point) -> Self {
        Self::global(Operation::Swipe {
            from,
            to,
            duration_ms: DEFAULT_SWIPE_MS,
        })
    }

    pub fn scroll(target: ElementId, direction: Direction) -> Self {
        Self::on(target, Operation::Scroll { direction })
    }

    pub fn back() -> Self {
        Self::global(Operation::Back)
    }

    pub fn wait(duration_ms: u64) -> Self {
        Self::global(Operation::Wait { duration_ms })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(id) => write!(f, "{}[{}]", self.operation.name(), id)?,
            None => write!(f, "{}", self.operation.name())?,
        }
        match &self.operation {
            Operation::TypeText { text, .. } => write!(f, " {:?}", text),
            Operation::Swipe { from, to, .. } => {
                write!(f, " ({},{})->({},{})", from.x, from.y, to.x, to.y)
            }
            Operation::Scroll { direction } => write!(f, " {:?}", direction),
            Operation::Wait { duration_ms } => write!(f, " {}ms", duration_ms),
            _ => Ok(()),
        }
    }
}
