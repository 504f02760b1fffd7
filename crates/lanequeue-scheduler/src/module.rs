//! Embedding surface for a host module.

use std::rc::Rc;

use tracing::info;

use lanequeue_core::{CoreError, GameState, OwnerId, Routine};

use crate::config::OwnerScope;
use crate::registry::{OwnerKey, QueueRegistry};

/// A module's handle on the shared lane registry.
///
/// The owner key is fixed at construction from the registry's [`OwnerScope`].
pub struct ModuleContext {
    name: String,
    owner: OwnerKey,
    registry: Rc<QueueRegistry>,
}

impl ModuleContext {
    /// Create a context for a module called `name`.
    pub fn new(name: impl Into<String>, registry: Rc<QueueRegistry>) -> Self {
        let name = name.into();
        let owner = match registry.config().owner_scope {
            OwnerScope::Instance => OwnerKey::Instance(OwnerId::generate()),
            OwnerScope::Type => OwnerKey::Type(name.clone()),
        };
        Self {
            name,
            owner,
            registry,
        }
    }

    /// Create a context named after the module type `T`.
    ///
    /// The path of the outer type is dropped; generic arguments are kept verbatim.
    pub fn for_type<T: ?Sized + 'static>(registry: Rc<QueueRegistry>) -> Self {
        let full = std::any::type_name::<T>();
        let (base, args) = full.split_at(full.find('<').unwrap_or(full.len()));
        let short = base.rsplit("::").next().unwrap_or(base);
        Self::new(format!("{}{}", short, args), registry)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &OwnerKey {
        &self.owner
    }

    pub fn registry(&self) -> &Rc<QueueRegistry> {
        &self.registry
    }

    /// Enqueue routines on `lane`.
    ///
    /// With `split_yields`, every ordinary suspension of a routine sends the rest of it to the
    /// back of the lane.
    pub fn queue_routines<I, R>(
        &self,
        lane: &str,
        split_yields: bool,
        routines: I,
    ) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = R>,
        R: Routine + 'static,
    {
        self.registry
            .queue_routines(&self.owner, lane, split_yields, routines)
    }

    /// Enqueue on the default lane without splitting.
    pub fn queue<I, R>(&self, routines: I) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = R>,
        R: Routine + 'static,
    {
        let lane = self.registry.config().default_lane.clone();
        self.queue_routines(&lane, false, routines)
    }

    /// Enqueue on the default lane.
    pub fn queue_split<I, R>(&self, split_yields: bool, routines: I) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = R>,
        R: Routine + 'static,
    {
        let lane = self.registry.config().default_lane.clone();
        self.queue_routines(&lane, split_yields, routines)
    }

    /// Enqueue on `lane` without splitting.
    pub fn queue_on<I, R>(&self, lane: &str, routines: I) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = R>,
        R: Routine + 'static,
    {
        self.queue_routines(lane, false, routines)
    }

    /// Lifecycle reset signal from the host. Any phase change resets every lane.
    pub fn on_state_change(&self, state: GameState) {
        info!(module = %self.name, state = ?state, "Host state changed");
        self.registry.reset_all();
    }
}
