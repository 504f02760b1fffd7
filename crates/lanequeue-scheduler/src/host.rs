//! Host task primitive.
//!
//! The scheduler never steps routines itself. It hands patched routines to a [`Host`], which
//! drives them tick by tick. [`TickHost`] is a single-threaded reference implementation:
//! - a routine handed over with [`Host::drive`] takes its first step on the next tick;
//! - each tick steps every awake routine until it pauses, finishes or faults;
//! - a nested routine (`Step::Blocked`) runs to completion before its parent resumes;
//! - a `Step::Skip` is unwrapped and treated as its payload.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use lanequeue_core::{BoxRoutine, RoutineFault, Step, Suspend, TaskStatus};

use crate::config::HostConfig;

/// Host errors.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Host still busy after {0} ticks")]
    TickBudgetExceeded(u64),
}

/// The host's cooperative execution engine.
pub trait Host {
    /// Begin driving `routine`. Returns a handle for observing or cancelling it.
    fn drive(&self, routine: BoxRoutine) -> TaskHandle;
}

/// Shared view of a routine handed to a host.
///
/// Cloning is cheap; all clones observe the same task. The status setters are for host
/// implementations.
#[derive(Clone)]
pub struct TaskHandle {
    inner: Rc<HandleInner>,
}

struct HandleInner {
    id: u64,
    name: String,
    status: Cell<TaskStatus>,
    cancel_requested: Cell<bool>,
    fault: RefCell<Option<RoutineFault>>,
    started_at: Cell<Option<DateTime<Utc>>>,
    finished_at: Cell<Option<DateTime<Utc>>>,
}

impl TaskHandle {
    /// Create a handle in the `Scheduled` state.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(HandleInner {
                id,
                name: name.into(),
                status: Cell::new(TaskStatus::Scheduled),
                cancel_requested: Cell::new(false),
                fault: RefCell::new(None),
                started_at: Cell::new(None),
                finished_at: Cell::new(None),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn status(&self) -> TaskStatus {
        self.inner.status.get()
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    /// The fault that ended the task, if it faulted.
    pub fn fault(&self) -> Option<RoutineFault> {
        self.inner.fault.borrow().clone()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.started_at.get()
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.inner.finished_at.get()
    }

    /// Ask the host to drop the task before its next step.
    pub fn cancel(&self) {
        if !self.is_finished() {
            self.inner.cancel_requested.set(true);
        }
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.inner.cancel_requested.get()
    }

    /// Mark the task as running. Only the first call records `started_at`.
    pub fn mark_running(&self) {
        if self.status() == TaskStatus::Scheduled {
            self.inner.status.set(TaskStatus::Running);
            self.inner.started_at.set(Some(Utc::now()));
        }
    }

    /// Mark the task as completed.
    pub fn complete(&self) {
        self.finish(TaskStatus::Completed);
    }

    /// Mark the task as faulted.
    pub fn fail(&self, fault: RoutineFault) {
        *self.inner.fault.borrow_mut() = Some(fault);
        self.finish(TaskStatus::Faulted);
    }

    /// Mark the task as cancelled.
    pub fn mark_cancelled(&self) {
        self.finish(TaskStatus::Cancelled);
    }

    fn finish(&self, status: TaskStatus) {
        if self.is_finished() {
            return;
        }
        self.inner.status.set(status);
        self.inner.finished_at.set(Some(Utc::now()));
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("status", &self.status())
            .finish()
    }
}

/// A suspension recorded by [`TickHost`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    /// Tick on which the suspension happened.
    pub tick: u64,
    /// Handle of the driven task.
    pub handle: u64,
    /// Name of the routine that suspended.
    pub routine: String,
    /// What it suspended on.
    pub suspend: Suspend,
}

/// A routine being driven, with its stack of nested routines.
struct Driven {
    handle: TaskHandle,
    stack: Vec<BoxRoutine>,
    wake_at: u64,
}

enum Advance {
    Paused,
    Finished,
    Faulted(RoutineFault),
}

/// Single-threaded reference host.
pub struct TickHost {
    config: HostConfig,
    tick: Cell<u64>,
    next_handle: Cell<u64>,
    // Routines driven since the last tick; they start on the next one.
    incoming: RefCell<Vec<Driven>>,
    active: RefCell<Vec<Driven>>,
    observed: RefCell<Vec<Observation>>,
}

impl TickHost {
    /// Create a new TickHost wrapped in Rc.
    pub fn new(config: HostConfig) -> Rc<Self> {
        Rc::new(Self {
            config,
            tick: Cell::new(0),
            next_handle: Cell::new(1),
            incoming: RefCell::new(Vec::new()),
            active: RefCell::new(Vec::new()),
            observed: RefCell::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Number of ticks run so far.
    pub fn current_tick(&self) -> u64 {
        self.tick.get()
    }

    /// Number of tasks that have not finished.
    pub fn live_tasks(&self) -> usize {
        self.active.borrow().len() + self.incoming.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.live_tasks() == 0
    }

    /// Every suspension recorded so far.
    pub fn observed(&self) -> Vec<Observation> {
        self.observed.borrow().clone()
    }

    /// Drain the recorded suspensions.
    pub fn take_observed(&self) -> Vec<Observation> {
        std::mem::take(&mut *self.observed.borrow_mut())
    }

    /// Values carried by `Suspend::Value` suspensions, in order.
    pub fn observed_values(&self) -> Vec<serde_json::Value> {
        self.observed
            .borrow()
            .iter()
            .filter_map(|o| match &o.suspend {
                Suspend::Value(v) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    /// Run one tick. Returns the number of tasks that were stepped.
    ///
    /// Must not be called from inside a routine.
    pub fn tick(&self) -> usize {
        let now = self.tick.get() + 1;
        self.tick.set(now);

        let mut batch = std::mem::take(&mut *self.active.borrow_mut());
        batch.append(&mut self.incoming.borrow_mut());

        let mut stepped = 0;
        let mut keep = Vec::with_capacity(batch.len());
        for mut task in batch {
            if task.handle.is_cancel_requested() {
                debug!(
                    handle = task.handle.id(),
                    routine = %task.handle.name(),
                    "Dropping cancelled routine"
                );
                task.handle.mark_cancelled();
                // Dropping the stack may release a lane and drive the next routine
                drop(task);
                continue;
            }
            if task.wake_at > now {
                keep.push(task);
                continue;
            }

            stepped += 1;
            match self.advance(&mut task, now) {
                Advance::Paused => keep.push(task),
                Advance::Finished => {
                    trace!(handle = task.handle.id(), "Routine completed");
                    task.handle.complete();
                }
                Advance::Faulted(fault) => {
                    error!(
                        handle = task.handle.id(),
                        routine = %task.handle.name(),
                        error = %fault,
                        "Routine faulted"
                    );
                    task.handle.fail(fault);
                }
            }
        }

        let mut active = self.active.borrow_mut();
        keep.append(&mut active);
        *active = keep;
        stepped
    }

    /// Tick until no task is live, or fail once `max_ticks` have run.
    pub fn run_until_idle(&self, max_ticks: u64) -> Result<u64, HostError> {
        let mut ran = 0;
        while !self.is_idle() {
            if ran >= max_ticks {
                warn!(max_ticks, live = self.live_tasks(), "Tick budget exhausted");
                return Err(HostError::TickBudgetExceeded(max_ticks));
            }
            self.tick();
            ran += 1;
        }
        Ok(ran)
    }

    /// Drop every live task, marking it cancelled.
    ///
    /// Must not be called from inside a routine.
    pub fn stop_all(&self) -> usize {
        let mut stopped = 0;
        // Dropping a task can drive new ones, so keep draining until both sets stay empty
        loop {
            let mut batch = std::mem::take(&mut *self.active.borrow_mut());
            batch.append(&mut self.incoming.borrow_mut());
            if batch.is_empty() {
                break;
            }
            for task in batch {
                task.handle.mark_cancelled();
                stopped += 1;
                drop(task);
            }
        }
        if stopped > 0 {
            debug!(stopped, "Stopped all routines");
        }
        stopped
    }

    fn advance(&self, task: &mut Driven, now: u64) -> Advance {
        task.handle.mark_running();
        loop {
            let Some(top) = task.stack.last_mut() else {
                return Advance::Finished;
            };
            let step = match top.step() {
                Ok(Step::Skip(marker)) => marker.into_step(),
                Ok(step) => step,
                Err(fault) => return Advance::Faulted(fault),
            };
            trace!(handle = task.handle.id(), routine = %top.name(), step = ?step, "Stepped");

            match step {
                Step::Done => {
                    task.stack.pop();
                }
                Step::Blocked(nested) => task.stack.push(nested),
                Step::Pending(suspend) => {
                    let delay = match suspend {
                        Suspend::Ticks(n) => u64::from(n.max(1)),
                        Suspend::NextTick | Suspend::Value(_) => 1,
                    };
                    self.observed.borrow_mut().push(Observation {
                        tick: now,
                        handle: task.handle.id(),
                        routine: top.name().to_string(),
                        suspend,
                    });
                    task.wake_at = now + delay;
                    return Advance::Paused;
                }
                // Unwrapped above; a marker never carries another marker
                Step::Skip(_) => {}
            }
        }
    }
}

impl Host for TickHost {
    fn drive(&self, routine: BoxRoutine) -> TaskHandle {
        let id = self.next_handle.get();
        self.next_handle.set(id + 1);

        let handle = TaskHandle::new(id, routine.name());
        debug!(handle = id, routine = %routine.name(), "Driving routine");
        self.incoming.borrow_mut().push(Driven {
            handle: handle.clone(),
            stack: vec![routine],
            wake_at: 0,
        });
        handle
    }
}
