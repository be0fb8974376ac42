use thiserror::Error;

use crate::{
    action::action_model::{Action, Operation, Point},
    driver::driver_model::Bounds,
    snapshot::snapshot_model::{ElementId, Role, Snapshot},
};

pub const MAX_GESTURE_MS: u64 = 10_000;
pub const MAX_WAIT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("unknown id {0}")]
    UnknownId(ElementId),

    #[error("not enabled")]
    NotEnabled(ElementId),

    #[error("not visible")]
    NotVisible(ElementId),

    #[error("{operation} not supported by {role} element {id}")]
    UnsupportedOperation {
        id: ElementId,
        role: Role,
        operation: &'static str,
    },

    #[error(
        "point ({}, {}) outside screen {}x{}",
        .point.x, .point.y, .screen.width, .screen.height
    )]
    OutOfBounds { point: Point, screen: Bounds },

    #[error("{operation} needs a target element")]
    MissingTarget { operation: &'static str },

    #[error("{operation} does not take a target element")]
    UnexpectedTarget { operation: &'static str },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Proof that an action passed validation against one snapshot.
///
/// Only [`validate`] creates it; the executor refuses tokens whose sequence
/// number does not match the snapshot it is handed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAction {
    action: Action,
    sequence: u64,
}

impl ValidatedAction {
    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn into_action(self) -> Action {
        self.action
    }
}

/// Check a proposed action against a snapshot. Pure: no driver access.
pub fn validate(action: &Action, snapshot: &Snapshot) -> Result<ValidatedAction, Rejection> {
    let op = &action.operation;

    match (action.target, op.requires_target(), op.forbids_target()) {
        (None, true, _) => {
            return Err(Rejection::MissingTarget {
                operation: op.name(),
            });
        }
        (Some(_), _, true) => {
            return Err(Rejection::UnexpectedTarget {
                operation: op.name(),
            });
        }
        _ => {}
    }

    if let Some(id) = action.target {
        let el = snapshot
            .resolve(id)
            .map_err(|_| Rejection::UnknownId(id))?;

        if !el.visible {
            return Err(Rejection::NotVisible(id));
        }
        if !el.enabled {
            return Err(Rejection::NotEnabled(id));
        }

        let supported = match op {
            Operation::Tap => el.accepts_tap(),
            Operation::LongPress { .. } => el.accepts_long_press(),
            Operation::TypeText { .. } | Operation::ClearText => el.editable,
            Operation::Scroll { .. } => el.scrollable,
            Operation::Swipe { .. } => true,
            Operation::Back | Operation::Wait { .. } => false,
        };

        if !supported {
            return Err(Rejection::UnsupportedOperation {
                id,
                role: el.role,
                operation: op.name(),
            });
        }
    }

    check_parameters(op, snapshot.screen())?;

    Ok(ValidatedAction {
        action: action.clone(),
        sequence: snapshot.sequence(),
    })
}

fn check_parameters(op: &Operation, screen: Bounds) -> Result<(), Rejection> {
    match op {
        Operation::LongPress { duration_ms } => {
            check_duration("long_press", *duration_ms, MAX_GESTURE_MS)
        }
        Operation::TypeText { text, .. } if text.is_empty() => Err(Rejection::InvalidParameter(
            "type_text needs non-empty text (use clear_text to empty a field)".into(),
        )),
        Operation::Swipe {
            from,
            to,
            duration_ms,
        } => {
            for point in [from, to] {
                if !screen.contains(*point) {
                    return Err(Rejection::OutOfBounds {
                        point: *point,
                        screen,
                    });
                }
            }
            if from == to {
                return Err(Rejection::InvalidParameter(
                    "swipe start and end are the same point".into(),
                ));
            }
            check_duration("swipe", *duration_ms, MAX_GESTURE_MS)
        }
        Operation::Wait { duration_ms } => check_duration("wait", *duration_ms, MAX_WAIT_MS),
        _ => Ok(()),
    }
}

fn check_duration(operation: &str, duration_ms: u64, max: u64) -> Result<(), Rejection> {
    if duration_ms == 0 || duration_ms > max {
        return Err(Rejection::InvalidParameter(format!(
            "{} duration {}ms outside 1..={}ms",
            operation, duration_ms, max
        )));
    }
    Ok(())
}
