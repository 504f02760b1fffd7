//! Transparent suspension marker.

use std::fmt;

use crate::routine::{BoxRoutine, Routine, Step, Suspend};

/// Marks a suspension point as transparent to split scheduling.
///
/// A split lane normally steps aside after every suspension of a routine. When the routine
/// yields a `SkipMarker` instead, the lane unwraps it, passes the payload to the host and keeps
/// the routine in flight, so nothing else in the lane can run before its next step.
pub struct SkipMarker {
    payload: Payload,
}

enum Payload {
    Suspend(Suspend),
    Routine(BoxRoutine),
}

impl SkipMarker {
    /// Mark a plain suspension.
    pub fn new(payload: Suspend) -> Self {
        Self {
            payload: Payload::Suspend(payload),
        }
    }

    /// Mark a nested routine.
    pub fn routine(routine: impl Routine + 'static) -> Self {
        Self::boxed(Box::new(routine))
    }

    /// Mark an already boxed nested routine.
    pub fn boxed(routine: BoxRoutine) -> Self {
        Self {
            payload: Payload::Routine(routine),
        }
    }

    /// The wrapped plain suspension, if that is what this marker carries.
    pub fn suspend(&self) -> Option<&Suspend> {
        match &self.payload {
            Payload::Suspend(s) => Some(s),
            Payload::Routine(_) => None,
        }
    }

    /// Unwrap into the step the host should see.
    pub fn into_step(self) -> Step {
        match self.payload {
            Payload::Suspend(s) => Step::Pending(s),
            Payload::Routine(r) => Step::Blocked(r),
        }
    }
}

impl From<Suspend> for SkipMarker {
    fn from(payload: Suspend) -> Self {
        Self::new(payload)
    }
}

impl fmt::Debug for SkipMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Suspend(s) => f.debug_tuple("SkipMarker").field(s).finish(),
            Payload::Routine(r) => f.debug_tuple("SkipMarker").field(&r.name()).finish(),
        }
    }
}
