//! Registry of lanes, keyed by owner and lane name.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, info};

use lanequeue_core::{BoxRoutine, CoreError, LaneName, OwnerId, Routine};

use crate::config::SchedulerConfig;
use crate::entry::CoroutineEntry;
use crate::host::Host;
use crate::queue::CoroutineQueue;

/// Key that scopes a set of lanes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OwnerKey {
    /// Lanes private to one module instance.
    Instance(OwnerId),
    /// Lanes shared by every instance of a module type.
    Type(String),
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerKey::Instance(id) => write!(f, "{}", id),
            OwnerKey::Type(name) => write!(f, "type:{}", name),
        }
    }
}

impl From<OwnerId> for OwnerKey {
    fn from(id: OwnerId) -> Self {
        OwnerKey::Instance(id)
    }
}

impl From<&str> for OwnerKey {
    fn from(s: &str) -> Self {
        OwnerKey::Instance(OwnerId::from(s))
    }
}

/// All lanes of all owners sharing one host.
///
/// The registry is what keeps the host alive; lanes only refer to it weakly.
pub struct QueueRegistry {
    config: SchedulerConfig,
    host: Rc<dyn Host>,
    lanes: RefCell<HashMap<OwnerKey, HashMap<LaneName, CoroutineQueue>>>,
}

impl QueueRegistry {
    /// Create a new QueueRegistry wrapped in Rc.
    pub fn new(host: Rc<dyn Host>, config: SchedulerConfig) -> Rc<Self> {
        Rc::new(Self {
            config,
            host,
            lanes: RefCell::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Get the lane for `(owner, lane)`, creating it on first use.
    pub fn get_queue(&self, owner: &OwnerKey, lane: &LaneName) -> CoroutineQueue {
        let mut lanes = self.lanes.borrow_mut();
        lanes
            .entry(owner.clone())
            .or_default()
            .entry(lane.clone())
            .or_insert_with(|| {
                debug!(owner = %owner, lane = %lane, "Created lane");
                CoroutineQueue::new(owner.clone(), lane.clone(), self.host.clone())
            })
            .clone()
    }

    /// Look up an existing lane without creating it.
    pub fn queue(&self, owner: &OwnerKey, lane: &LaneName) -> Option<CoroutineQueue> {
        self.lanes
            .borrow()
            .get(owner)
            .and_then(|lanes| lanes.get(lane))
            .cloned()
    }

    /// Enqueue `routines`, in order, on the named lane.
    ///
    /// The lane name is validated before anything is touched. Each routine becomes its own
    /// entry; the first one starts right away if the lane is idle.
    pub fn queue_routines<I, R>(
        &self,
        owner: &OwnerKey,
        lane: &str,
        split_yields: bool,
        routines: I,
    ) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = R>,
        R: Routine + 'static,
    {
        let lane = LaneName::parse(lane)?;
        let queue = self.get_queue(owner, &lane);
        for routine in routines {
            let routine: BoxRoutine = Box::new(routine);
            queue.append_and_dispatch(CoroutineEntry::new(routine, split_yields));
        }
        Ok(())
    }

    /// Reset every lane, then forget them all.
    ///
    /// Safe to call repeatedly and on an empty registry.
    pub fn reset_all(&self) {
        let drained = std::mem::take(&mut *self.lanes.borrow_mut());
        let mut count = 0;
        for queue in drained.values().flat_map(|lanes| lanes.values()) {
            queue.reset();
            count += 1;
        }
        if count > 0 {
            info!(lanes = count, "Reset all lanes");
        }
    }

    /// Total number of lanes across all owners.
    pub fn lane_count(&self) -> usize {
        self.lanes.borrow().values().map(HashMap::len).sum()
    }

    pub fn owner_count(&self) -> usize {
        self.lanes.borrow().len()
    }

    /// Lane names registered for `owner`, sorted.
    pub fn lanes_for(&self, owner: &OwnerKey) -> Vec<LaneName> {
        let mut names: Vec<LaneName> = self
            .lanes
            .borrow()
            .get(owner)
            .map(|lanes| lanes.keys().cloned().collect())
            .unwrap_or_default();
        names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        names
    }
}
