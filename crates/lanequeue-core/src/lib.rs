//! lanequeue Core Types
//!
//! This crate contains the routine model shared by the scheduler and its hosts, with no
//! dependency on:
//! - a host runtime
//! - logging
//! - queue bookkeeping

pub mod error;
pub mod ids;
pub mod routine;
pub mod skip;
pub mod status;

// Re-export commonly used types
pub use error::{CoreError, RoutineFault};
pub use ids::{LaneName, OwnerId, TicketId, DEFAULT_LANE};
pub use routine::{BoxRoutine, Routine, Step, Suspend};
pub use skip::SkipMarker;
pub use status::{GameState, TaskStatus};
