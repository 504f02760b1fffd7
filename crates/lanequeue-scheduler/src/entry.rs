//! Queued units of work and the patch protocol that runs them.
//!
//! A [`CoroutineEntry`] sits in a lane until the lane dispatches it. At dispatch it is turned
//! into a [`PatchedRoutine`] holding a [`LaneLease`] on the lane, and the patched routine is what
//! the host drives.
//!
//! Non-split entries hand their whole source routine to the host as one nested step, so the
//! source runs to completion before the lane moves on. Split entries step the source
//! themselves; after every ordinary suspension they put the rest of the source back at the
//! tail of the lane and release it. A `SkipMarker` suspension is passed through without
//! releasing the lane.

use tracing::{debug, warn};

use lanequeue_core::{BoxRoutine, Routine, RoutineFault, Step, TicketId};

use crate::queue::CoroutineQueue;

/// A single queued unit of work.
pub struct CoroutineEntry {
    source: BoxRoutine,
    split: bool,
}

impl CoroutineEntry {
    /// Create a new entry.
    pub fn new(source: BoxRoutine, split: bool) -> Self {
        Self { source, split }
    }

    /// Whether this entry splits at every ordinary suspension.
    pub fn is_split(&self) -> bool {
        self.split
    }

    /// Name of the wrapped routine.
    pub fn name(&self) -> &str {
        self.source.name()
    }

    /// Bind the entry to a lane lease, producing the routine handed to the host.
    pub(crate) fn patch(self, lease: LaneLease) -> PatchedRoutine {
        let name = self.source.name().to_string();
        let state = if self.split {
            Patch::Split {
                source: self.source,
                requeue: false,
            }
        } else {
            Patch::Whole(Some(self.source))
        };
        PatchedRoutine { name, lease, state }
    }
}

impl std::fmt::Debug for CoroutineEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoroutineEntry")
            .field("name", &self.name())
            .field("split", &self.split)
            .finish()
    }
}

/// Claim on a lane's single in-flight slot.
///
/// The lane is released when [`LaneLease::release`] is called or, failing that, when the lease
/// is dropped. Either way the release only takes effect while the lease's ticket is still the
/// lane's in-flight ticket; after a lane reset the lease is stale and does nothing.
pub(crate) struct LaneLease {
    queue: CoroutineQueue,
    ticket: TicketId,
    released: bool,
}

impl LaneLease {
    pub(crate) fn new(queue: CoroutineQueue, ticket: TicketId) -> Self {
        Self {
            queue,
            ticket,
            released: false,
        }
    }

    pub(crate) fn is_current(&self) -> bool {
        self.queue.in_flight() == Some(self.ticket)
    }

    /// Put a continuation at the tail of the lane without dispatching.
    pub(crate) fn requeue(&self, entry: CoroutineEntry) {
        if self.is_current() {
            debug!(
                owner = %self.queue.owner(),
                lane = %self.queue.lane(),
                ticket = %self.ticket,
                routine = %entry.name(),
                "Requeueing continuation"
            );
            self.queue.append(entry);
        } else {
            debug!(
                lane = %self.queue.lane(),
                ticket = %self.ticket,
                routine = %entry.name(),
                "Dropping continuation of a stale lease"
            );
        }
    }

    /// Clear the lane's in-flight slot and dispatch the next entry.
    pub(crate) fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if !self.queue.release(self.ticket) {
            debug!(
                lane = %self.queue.lane(),
                ticket = %self.ticket,
                "Stale lease released after lane reset"
            );
        }
    }
}

impl Drop for LaneLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if self.is_current() {
            warn!(
                owner = %self.queue.owner(),
                lane = %self.queue.lane(),
                ticket = %self.ticket,
                "Lane released by an abandoned routine"
            );
        }
        self.release();
    }
}

enum Patch {
    /// Non-split: `Some` until the source is handed to the host.
    Whole(Option<BoxRoutine>),
    /// Split: `requeue` is set once the source has paused at an ordinary suspension.
    Split { source: BoxRoutine, requeue: bool },
    Finished,
}

/// The routine actually handed to the host for one dispatched entry.
pub struct PatchedRoutine {
    name: String,
    lease: LaneLease,
    state: Patch,
}

impl PatchedRoutine {
    fn finish(&mut self) -> Step {
        self.state = Patch::Finished;
        self.lease.release();
        Step::Done
    }
}

impl Routine for PatchedRoutine {
    fn step(&mut self) -> Result<Step, RoutineFault> {
        match std::mem::replace(&mut self.state, Patch::Finished) {
            Patch::Whole(Some(source)) => {
                self.state = Patch::Whole(None);
                Ok(Step::Blocked(source))
            }
            Patch::Whole(None) => Ok(self.finish()),
            Patch::Split {
                source,
                requeue: true,
            } => {
                self.lease.requeue(CoroutineEntry::new(source, true));
                Ok(self.finish())
            }
            Patch::Split {
                mut source,
                requeue: false,
            } => match source.step() {
                Ok(Step::Done) => Ok(self.finish()),
                Ok(Step::Skip(marker)) => {
                    self.state = Patch::Split {
                        source,
                        requeue: false,
                    };
                    Ok(marker.into_step())
                }
                Ok(step) => {
                    self.state = Patch::Split {
                        source,
                        requeue: true,
                    };
                    Ok(step)
                }
                Err(fault) => {
                    warn!(
                        lane = %self.lease.queue.lane(),
                        routine = %self.name,
                        error = %fault,
                        "Releasing lane after fault"
                    );
                    self.finish();
                    Err(fault)
                }
            },
            Patch::Finished => Ok(Step::Done),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
