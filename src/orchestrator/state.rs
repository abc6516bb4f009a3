use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a mirror run; `Completed` and `Failed` are terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum RunState {
    NotStarted,
    TargetReady,
    SnapshotTaken,
    SchemaCreated,
    Synchronizing { index: usize, table: String },
    Completed,
    Failed { stage: String, table: Option<String> },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed { .. })
    }

    /// Whether moving from `self` to `next` follows the run order
    pub fn can_transition_to(&self, next: &RunState) -> bool {
        use RunState::*;

        match (self, next) {
            (Completed, _) | (Failed { .. }, _) => false,
            (_, Failed { .. }) => true,
            (NotStarted, TargetReady) => true,
            (TargetReady, SnapshotTaken) => true,
            (SnapshotTaken, SchemaCreated) => true,
            (SchemaCreated, Synchronizing { index: 0, .. }) => true,
            (SchemaCreated, Completed) => true,
            (Synchronizing { index: current, .. }, Synchronizing { index: following, .. }) => {
                *following == current + 1
            }
            (Synchronizing { .. }, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::NotStarted => write!(f, "not started"),
            RunState::TargetReady => write!(f, "target ready"),
            RunState::SnapshotTaken => write!(f, "snapshot taken"),
            RunState::SchemaCreated => write!(f, "schema created"),
            RunState::Synchronizing { index, table } => write!(f, "synchronizing table {} ({})", index + 1, table),
            RunState::Completed => write!(f, "completed"),
            RunState::Failed { stage, table: Some(table) } => write!(f, "failed during {} of table {}", stage, table),
            RunState::Failed { stage, table: None } => write!(f, "failed during {}", stage),
        }
    }
}
