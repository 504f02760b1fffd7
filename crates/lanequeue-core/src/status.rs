//! Status enums for driven routines and the host lifecycle.

use serde::{Deserialize, Serialize};

/// Status of a routine handed to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Handed to the host, first step not taken yet.
    #[default]
    Scheduled,
    /// Stepped at least once and not finished.
    Running,
    /// Ran to exhaustion.
    Completed,
    /// A step returned a fault.
    Faulted,
    /// Dropped by the host before finishing.
    Cancelled,
}

impl TaskStatus {
    /// Returns true if the routine will not be stepped again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Faulted | Self::Cancelled)
    }

    /// Returns true if the routine is still live on the host.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// Phase of the host simulation.
///
/// Every transition between phases is a lifecycle reset signal for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameState {
    Gameplay,
    Setup,
    PostGame,
    Transitioning,
    Unlock,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Scheduled.is_terminal());
        assert!(TaskStatus::Running.is_active());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Faulted.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Faulted).unwrap(),
            "\"FAULTED\""
        );
        let state: GameState = serde_json::from_str("\"POST_GAME\"").unwrap();
        assert_eq!(state, GameState::PostGame);
    }
}
