//! A single lane: an ordered FIFO of entries with one in-flight slot.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use lanequeue_core::{LaneName, TicketId};

use crate::entry::{CoroutineEntry, LaneLease};
use crate::host::{Host, TaskHandle};
use crate::registry::OwnerKey;

/// One independently serialized lane of execution for one owner.
///
/// At most one patched routine from a lane is in flight on the host at any time. The slot is
/// identified by a [`TicketId`] so that a routine dispatched before a reset can never release
/// or requeue into the lane after it.
///
/// The lane only holds a weak reference to its host, since the host in turn owns the patched
/// routines that point back at the lane.
///
/// Cloning yields another handle to the same lane.
#[derive(Clone)]
pub struct CoroutineQueue {
    inner: Rc<QueueInner>,
}

struct QueueInner {
    owner: OwnerKey,
    lane: LaneName,
    host: Weak<dyn Host>,
    state: RefCell<QueueState>,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<CoroutineEntry>,
    in_flight: Option<TicketId>,
}

impl CoroutineQueue {
    /// Create a new, idle lane. The caller keeps `host` alive.
    pub fn new(owner: OwnerKey, lane: LaneName, host: Rc<dyn Host>) -> Self {
        Self {
            inner: Rc::new(QueueInner {
                owner,
                lane,
                host: Rc::downgrade(&host),
                state: RefCell::new(QueueState::default()),
            }),
        }
    }

    pub fn owner(&self) -> &OwnerKey {
        &self.inner.owner
    }

    pub fn lane(&self) -> &LaneName {
        &self.inner.lane
    }

    /// Number of entries waiting; the in-flight routine is not counted.
    pub fn len(&self) -> usize {
        self.inner.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a routine from this lane is in flight on the host.
    pub fn is_running(&self) -> bool {
        self.in_flight().is_some()
    }

    /// Nothing waiting and nothing in flight.
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.borrow();
        state.entries.is_empty() && state.in_flight.is_none()
    }

    pub(crate) fn in_flight(&self) -> Option<TicketId> {
        self.inner.state.borrow().in_flight
    }

    /// Append to the tail without dispatching.
    ///
    /// This is the form a running routine uses to requeue its own continuation, since the
    /// lane's slot is still held by that routine.
    pub fn append(&self, entry: CoroutineEntry) {
        debug!(
            owner = %self.owner(),
            lane = %self.lane(),
            routine = %entry.name(),
            split = entry.is_split(),
            "Queued routine"
        );
        self.inner.state.borrow_mut().entries.push_back(entry);
    }

    /// Append to the tail, then dispatch if the lane is free.
    ///
    /// Returns the handle of whichever entry was started, which is not necessarily `entry`.
    pub fn append_and_dispatch(&self, entry: CoroutineEntry) -> Option<TaskHandle> {
        self.append(entry);
        self.dispatch_next()
    }

    /// Start the head entry if nothing from this lane is in flight.
    ///
    /// This is the only place routines are handed to the host.
    pub fn dispatch_next(&self) -> Option<TaskHandle> {
        let (entry, ticket, host) = {
            let mut state = self.inner.state.borrow_mut();
            if state.in_flight.is_some() || state.entries.is_empty() {
                return None;
            }
            let Some(host) = self.inner.host.upgrade() else {
                warn!(
                    owner = %self.owner(),
                    lane = %self.lane(),
                    pending = state.entries.len(),
                    "Host is gone, lane not dispatched"
                );
                return None;
            };
            let entry = state.entries.pop_front()?;
            let ticket = TicketId::generate();
            state.in_flight = Some(ticket);
            (entry, ticket, host)
        };

        debug!(
            owner = %self.owner(),
            lane = %self.lane(),
            ticket = %ticket,
            routine = %entry.name(),
            "Dispatching routine"
        );
        let patched = entry.patch(LaneLease::new(self.clone(), ticket));
        Some(host.drive(Box::new(patched)))
    }

    /// Free the slot held by `ticket` and dispatch the next entry.
    ///
    /// Returns false, and does nothing, if `ticket` no longer holds the slot.
    pub(crate) fn release(&self, ticket: TicketId) -> bool {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.in_flight != Some(ticket) {
                return false;
            }
            state.in_flight = None;
        }
        debug!(owner = %self.owner(), lane = %self.lane(), ticket = %ticket, "Released lane");
        self.dispatch_next();
        true
    }

    /// Drop all waiting entries and free the slot, unconditionally.
    ///
    /// This is a best-effort, queue-level reset. A routine already handed to the host keeps
    /// running until the host stops it; it just can no longer release or requeue into this
    /// lane.
    pub fn reset(&self) {
        let dropped = {
            let mut state = self.inner.state.borrow_mut();
            state.in_flight = None;
            std::mem::take(&mut state.entries)
        };
        if !dropped.is_empty() {
            debug!(
                owner = %self.owner(),
                lane = %self.lane(),
                dropped = dropped.len(),
                "Reset lane"
            );
        }
        // Entries drop outside the borrow; a routine's destructor may touch the lane
        drop(dropped);
    }
}

impl std::fmt::Debug for CoroutineQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("CoroutineQueue")
            .field("owner", &self.inner.owner)
            .field("lane", &self.inner.lane)
            .field("entries", &state.entries)
            .field("in_flight", &state.in_flight)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanequeue_core::routine::script;
    use lanequeue_core::{BoxRoutine, Step};

    use crate::config::HostConfig;
    use crate::host::TickHost;
    use crate::testing::{recorder, EventLog, ManualHost};

    fn entry(name: &str) -> CoroutineEntry {
        CoroutineEntry::new(Box::new(script(name, vec![])), false)
    }

    #[test]
    fn test_single_flight() {
        let host = ManualHost::new();
        let queue = CoroutineQueue::new(OwnerKey::from("m"), LaneName::default(), host.clone());

        assert!(queue.append_and_dispatch(entry("a")).is_some());
        assert!(queue.append_and_dispatch(entry("b")).is_none());
        assert!(queue.append_and_dispatch(entry("c")).is_none());

        assert_eq!(host.driven_names(), vec!["a"]);
        assert_eq!(queue.len(), 2);
        assert!(queue.is_running());
        assert!(queue.dispatch_next().is_none());
    }

    #[test]
    fn test_append_does_not_dispatch() {
        let host = ManualHost::new();
        let queue = CoroutineQueue::new(OwnerKey::from("m"), LaneName::default(), host.clone());

        queue.append(entry("a"));
        assert!(host.driven_names().is_empty());
        assert!(!queue.is_running());

        let handle = queue.dispatch_next().unwrap();
        assert_eq!(handle.name(), "a");
        assert!(queue.is_running());
    }

    #[test]
    fn test_dispatch_on_empty_queue() {
        let host = ManualHost::new();
        let queue = CoroutineQueue::new(OwnerKey::from("m"), LaneName::default(), host.clone());
        assert!(queue.dispatch_next().is_none());
        assert!(!queue.is_running());
        assert!(queue.is_idle());
    }

    #[test]
    fn test_reset_idle_queue() {
        let host = ManualHost::new();
        let queue = CoroutineQueue::new(OwnerKey::from("m"), LaneName::default(), host.clone());

        assert_eq!(queue.len(), 0);
        assert!(!queue.is_running());
        queue.reset();
        assert_eq!(queue.len(), 0);
        assert!(!queue.is_running());
    }

    #[test]
    fn test_reset_clears_pending() {
        let host = ManualHost::new();
        let queue = CoroutineQueue::new(OwnerKey::from("m"), LaneName::default(), host.clone());
        queue.append_and_dispatch(entry("a"));
        queue.append(entry("b"));
        queue.append(entry("c"));

        queue.reset();
        assert_eq!(queue.len(), 0);
        assert!(!queue.is_running());
        assert!(queue.dispatch_next().is_none());
        assert!(queue.dispatch_next().is_none());

        queue.append_and_dispatch(entry("d"));
        assert_eq!(host.driven_names(), vec!["a", "d"]);
    }

    #[test]
    fn test_fifo_on_tick_host() {
        let host = TickHost::new(HostConfig::default());
        let queue = CoroutineQueue::new(OwnerKey::from("m"), LaneName::default(), host.clone());
        let log = EventLog::default();

        for name in ["a", "b", "c"] {
            let routine: BoxRoutine = Box::new(recorder(
                &log,
                name,
                vec![Step::next_tick(), Step::next_tick()],
            ));
            queue.append_and_dispatch(CoroutineEntry::new(routine, false));
        }
        host.run_until_idle(100).unwrap();

        assert_eq!(
            log.events(),
            vec![
                "a:0", "a:1", "a:done", "b:0", "b:1", "b:done", "c:0", "c:1", "c:done"
            ]
        );
        assert!(queue.is_idle());
    }

    #[test]
    fn test_no_overlap_on_tick_host() {
        let host = TickHost::new(HostConfig::default());
        let queue = CoroutineQueue::new(OwnerKey::from("m"), LaneName::default(), host.clone());
        let log = EventLog::default();

        for i in 0..5 {
            let name = format!("t{}", i);
            queue.append_and_dispatch(CoroutineEntry::new(
                Box::new(recorder(&log, &name, vec![Step::ticks(2)])),
                i % 2 == 0,
            ));
        }
        while !host.is_idle() {
            host.tick();
            assert!(host.live_tasks() <= 1);
        }
        assert_eq!(log.started_order(), vec!["t0", "t1", "t2", "t3", "t4"]);
    }

    #[test]
    fn test_dropped_host_stops_dispatch() {
        let host = ManualHost::new();
        let queue = CoroutineQueue::new(OwnerKey::from("m"), LaneName::default(), host.clone());
        drop(host);

        assert!(queue.append_and_dispatch(entry("a")).is_none());
        assert_eq!(queue.len(), 1);
        assert!(!queue.is_running());
    }

    #[test]
    fn test_debug_lists_entries() {
        let host = ManualHost::new();
        let queue = CoroutineQueue::new(OwnerKey::from("m"), LaneName::default(), host.clone());
        queue.append(entry("a"));
        let debug = format!("{:?}", queue);
        assert!(debug.contains("\"a\""));
        assert!(debug.contains("in_flight: None"));
    }
}
