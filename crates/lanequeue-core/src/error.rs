//! Core domain errors.

use thiserror::Error;

/// Core domain errors for lanequeue.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Lane name was empty or whitespace only.
    #[error("Invalid lane name: {0:?}")]
    InvalidLane(String),

    /// A routine faulted while being stepped.
    #[error(transparent)]
    RoutineFault(#[from] RoutineFault),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A fault raised by a routine while it was being stepped.
///
/// The scheduler never recovers from a fault; it is handed to the host unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Routine fault: {message}")]
pub struct RoutineFault {
    message: String,
}

impl RoutineFault {
    /// Create a new fault with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The fault message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for RoutineFault {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RoutineFault {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}
