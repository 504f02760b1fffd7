//! Test support: a recording routine and a host that never steps anything.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lanequeue_core::routine::{from_fn, FromFn};
use lanequeue_core::{BoxRoutine, RoutineFault, Step};

use crate::host::{Host, TaskHandle};

/// Shared, ordered log of routine events.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<String>>>,
}

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.events.borrow_mut().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    /// Routine names in the order they took their first step.
    pub fn started_order(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| e.strip_suffix(":0"))
            .map(str::to_string)
            .collect()
    }
}

/// A routine that logs `name:<i>` as it returns its i-th step, and `name:done` when exhausted.
pub fn recorder(
    log: &EventLog,
    name: &str,
    steps: Vec<Step>,
) -> FromFn<impl FnMut() -> Result<Step, RoutineFault>> {
    let log = log.clone();
    let label = name.to_string();
    let mut steps = steps.into_iter().enumerate();
    from_fn(move || match steps.next() {
        Some((i, step)) => {
            log.push(format!("{}:{}", label, i));
            Ok(step)
        }
        None => {
            log.push(format!("{}:done", label));
            Ok(Step::Done)
        }
    })
    .named(name)
}

/// Host that records what it is asked to drive and never steps it.
#[derive(Default)]
pub struct ManualHost {
    driven: RefCell<Vec<BoxRoutine>>,
    next_id: Cell<u64>,
}

impl ManualHost {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Names of the routines currently held.
    pub fn driven_names(&self) -> Vec<String> {
        self.driven
            .borrow()
            .iter()
            .map(|r| r.name().to_string())
            .collect()
    }

    /// Take ownership of everything driven so far.
    pub fn take(&self) -> Vec<BoxRoutine> {
        std::mem::take(&mut *self.driven.borrow_mut())
    }
}

impl Host for ManualHost {
    fn drive(&self, routine: BoxRoutine) -> TaskHandle {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let handle = TaskHandle::new(id, routine.name());
        self.driven.borrow_mut().push(routine);
        handle
    }
}

/// Install a test subscriber so failing tests show scheduler logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
