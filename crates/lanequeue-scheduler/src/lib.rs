//! lanequeue Scheduler
//!
//! Per-owner, per-lane FIFO scheduling of cooperative routines on top of a host's tick-driven
//! task primitive.
//!
//! Everything here is single-threaded: lanes and the registry use `Rc`/`RefCell` and are only
//! touched from the thread that ticks the host.

pub mod config;
pub mod entry;
pub mod host;
pub mod module;
pub mod queue;
pub mod registry;

#[cfg(test)]
mod testing;

pub use config::{HostConfig, OwnerScope, SchedulerConfig};
pub use entry::{CoroutineEntry, PatchedRoutine};
pub use host::{Host, HostError, Observation, TaskHandle, TickHost};
pub use module::ModuleContext;
pub use queue::CoroutineQueue;
pub use registry::{OwnerKey, QueueRegistry};
