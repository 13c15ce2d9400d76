//! The central registry of simulated objects and the physics-tick orchestration around it.
//!
//! [`Registry`] owns every entity, allocates stable identities, owns the event bus and the
//! script runtime, and drives the update/physics-update passes. [`Universe`] bundles a
//! registry with the exclusively owned physics world and the stepping parameters, and exposes
//! the once-per-frame [`Universe::update`] entry point.
//!
//! The flow per frame is: tick non-entity simulated state, run the entity `update` pass,
//! then hand `dt` to the physics world. The world synchronously re-enters
//! [`Registry::physics_update`] once per sub-step it performs, which fans `physics_update`
//! out to every entity before that sub-step integrates. Mutations requested from inside a
//! pass never invalidate the pass: passes iterate a snapshot, creations become visible to
//! the next pass, and removals are deferred to the excision point after the step returns.

use log::{debug, trace};

use crate::entity::{make_type_str, Entity, EntityHandle, EntityId};
use crate::error::OrreryError;
use crate::event::{events, EventBus, EventHandler, SubscriberId};
use crate::persistence::SaveMetadata;
use crate::physics::{DynamicsWorld, FixedStepWorld, StepSettings};
use crate::script::{
    resolve_type, BehaviorBinding, NativeRuntime, NativeScript, ScriptEnv, ScriptRuntime,
};
use crate::value::Value;
use crate::{HashMap, HashSet};

use std::rc::Rc;

/// Non-entity simulated state (for example, the orbital elements of a planetary system).
/// Ticked once per frame with `physics_pass == false` and once per physics sub-step with
/// `physics_pass == true`, always before the entity fan-out of the same pass.
pub trait SystemModel {
    fn update(&mut self, world: &mut dyn DynamicsWorld, dt: f64, physics_pass: bool);
}

/// Owns all entities and mediates their lifecycle.
///
/// The two indexes are kept in exact bijection for live objects: every live id appears in
/// `by_id` and maps to its slot in `entities`; removed-but-not-yet-excised objects appear
/// in neither view (lookups fail as soon as removal is requested). Do not hold references
/// into the registry across frames; hold ids.
pub struct Registry {
    /// Insertion order == creation order. Slots of pending removals linger here until the
    /// next excision point so in-flight pass snapshots stay valid.
    entities: Vec<Entity>,
    by_id: HashMap<EntityId, usize>,
    next_id: i64,
    /// Should updates run?
    pub paused: bool,
    pending_removal: Vec<EntityId>,
    events: EventBus,
    runtime: Box<dyn ScriptRuntime>,
    system: Option<Box<dyn SystemModel>>,
    /// Save metadata carried through persistence round-trips.
    pub metadata: SaveMetadata,
}

impl Registry {
    #[must_use]
    pub fn new(runtime: Box<dyn ScriptRuntime>) -> Registry {
        Registry {
            entities: Vec::new(),
            by_id: HashMap::default(),
            next_id: 0,
            paused: false,
            pending_removal: Vec::new(),
            events: EventBus::new(),
            runtime,
            system: None,
            metadata: SaveMetadata::default(),
        }
    }

    // Increase BEFORE, id 0 is the "no entity" id.
    fn next_uid(&mut self) -> EntityId {
        self.next_id += 1;
        EntityId(self.next_id)
    }

    /// The highest id assigned so far; the persistence adapter stores this so restored
    /// registries never re-issue an id.
    #[must_use]
    pub fn highest_assigned_id(&self) -> i64 {
        self.next_id
    }

    /// The number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Ids of all live objects in creation order.
    #[must_use]
    pub fn object_ids(&self) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|e| e.exists())
            .map(Entity::id)
            .collect()
    }

    /// O(1) lookup. Returns `None` for unknown ids and for objects whose removal has been
    /// requested, never a dangling reference. Do not hold the reference for long; calling
    /// this each time you access the object is better.
    #[must_use]
    pub fn get_object(&self, id: EntityId) -> Option<&Entity> {
        self.by_id.get(&id).map(|&index| &self.entities[index])
    }

    pub fn get_object_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        match self.by_id.get(&id) {
            Some(&index) => Some(&mut self.entities[index]),
            None => None,
        }
    }

    /// A dispatch handle for a live object's behavior.
    #[must_use]
    pub fn handle(&self, id: EntityId) -> Option<EntityHandle> {
        self.get_object(id).map(Entity::handle)
    }

    /// Creates an object from the behavior script named by `path` (resolved against
    /// `current_package`), registers it, and runs its lifecycle hooks.
    ///
    /// The order is load → register → `core:new_object` → `init` → `create` (the last only
    /// with `is_create`), so any cross-object lookup performed inside `init`/`create` can
    /// already resolve this object's own id. A script load failure is fatal and nothing is
    /// registered; an id is only consumed once loading has succeeded.
    pub fn create_object(
        &mut self,
        world: &mut dyn DynamicsWorld,
        path: &str,
        current_package: &str,
        init_data: serde_json::Value,
        args: &[Value],
        is_create: bool,
    ) -> Result<EntityId, OrreryError> {
        let (package, name) = resolve_type(path, current_package)?;
        let env = self.runtime.load(&package, &name)?;
        let type_str = make_type_str(&package, &name);
        let id = self.next_uid();
        debug!("creating object {id} ({type_str})");

        let entity = Entity::new(id, BehaviorBinding::new(type_str, env), init_data);
        self.by_id.insert(id, self.entities.len());
        self.entities.push(entity);

        self.emit_event(world, events::NEW_OBJECT, &[Value::Id(id)]);

        // A `core:new_object` subscriber may already have removed the object; in that case
        // its setup never runs.
        if let Some(entity) = self.get_object_mut(id) {
            entity.mark_registered();
        }
        if let Some(handle) = self.handle(id) {
            handle.setup(self, world)?;
            if is_create {
                handle.created(self, world, args)?;
            }
        }
        Ok(id)
    }

    /// Requests removal of an object. Lookups for the id fail from this point on and
    /// `core:remove_object` fires immediately, but the owning slot survives until the next
    /// excision point so no snapshot taken for an in-flight pass observes a dangling
    /// binding. Returns false for unknown or already-removed ids.
    pub fn remove_object(&mut self, world: &mut dyn DynamicsWorld, id: EntityId) -> bool {
        let Some(index) = self.by_id.remove(&id) else {
            trace!("remove_object: no live object with id {id}");
            return false;
        };
        self.entities[index].mark_removed();
        self.pending_removal.push(id);
        debug!(
            "removing object {id} ({})",
            self.entities[index].entity_type()
        );
        self.emit_event(world, events::REMOVE_OBJECT, &[Value::Id(id)]);
        true
    }

    /// Excises every pending removal, releasing ownership. Called by
    /// [`Universe::update`] once the physics world has returned control; only call it
    /// yourself if you drive a bare `Registry` and are certain no pass is in flight.
    pub fn flush_removals(&mut self) {
        if self.pending_removal.is_empty() {
            return;
        }
        let pending: HashSet<EntityId> = self.pending_removal.drain(..).collect();
        self.entities.retain(|e| !pending.contains(&e.id()));
        // Excision compacts the arena, so every surviving index is recomputed.
        self.by_id.clear();
        for (index, entity) in self.entities.iter().enumerate() {
            self.by_id.insert(entity.id(), index);
        }
        trace!("excised {} object(s)", pending.len());
    }

    /// Subscribes `subscriber` to the named event. Dispatch order is subscription order.
    pub fn subscribe(
        &mut self,
        event: &str,
        subscriber: SubscriberId,
        handler: impl Fn(&mut Registry, &mut dyn DynamicsWorld, &[Value]) + 'static,
    ) {
        self.events.subscribe(event, subscriber, handler);
    }

    /// Removes every subscription held by `subscriber`.
    pub fn unsubscribe(&mut self, subscriber: SubscriberId) {
        self.events.unsubscribe(subscriber);
    }

    /// Removes `subscriber`'s subscriptions for a single event.
    pub fn unsubscribe_from(&mut self, event: &str, subscriber: SubscriberId) {
        self.events.unsubscribe_from(event, subscriber);
    }

    /// Synchronously dispatches `event` to its subscribers, in subscription order, on the
    /// calling thread. Handlers run against the handler list as it was when the emit
    /// started; re-entrant subscription changes affect only later emits.
    pub fn emit_event(&mut self, world: &mut dyn DynamicsWorld, event: &str, args: &[Value]) {
        let handlers: Vec<Rc<EventHandler>> = self.events.handlers(event);
        for handler in handlers {
            handler(self, world, args);
        }
    }

    /// The subscription table, for inspection.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Installs (or clears) the non-entity simulated state slot.
    pub fn set_system(&mut self, system: Option<Box<dyn SystemModel>>) {
        self.system = system;
    }

    pub(crate) fn tick_system(
        &mut self,
        world: &mut dyn DynamicsWorld,
        dt: f64,
        physics_pass: bool,
    ) {
        if let Some(system) = self.system.as_mut() {
            system.update(world, dt, physics_pass);
        }
    }

    /// A stable snapshot of the live objects for one pass. Entities created during the
    /// pass are not in it; entities removed during the pass stay in it until it ends.
    pub(crate) fn snapshot(&self) -> Vec<EntityHandle> {
        self.entities
            .iter()
            .filter(|e| e.exists())
            .map(Entity::handle)
            .collect()
    }

    /// The per-frame visual/logic pass. All entities observe the same `dt`.
    pub fn update_pass(
        &mut self,
        world: &mut dyn DynamicsWorld,
        dt: f64,
    ) -> Result<(), OrreryError> {
        for handle in self.snapshot() {
            handle.update(self, world, dt)?;
        }
        Ok(())
    }

    /// The per-sub-step physics pass. This is re-entered by the physics world from inside
    /// `step_simulation`, strictly before the sub-step integrates; entity state may be read
    /// and registry mutations requested from the hooks it dispatches.
    pub fn physics_update(
        &mut self,
        world: &mut dyn DynamicsWorld,
        pdt: f64,
    ) -> Result<(), OrreryError> {
        self.tick_system(world, pdt, true);
        for handle in self.snapshot() {
            handle.physics_update(self, world, pdt)?;
        }
        Ok(())
    }

    /// Flips an object's physics participation flag and invokes the matching
    /// `enable_physics`/`disable_physics` hook. Returns false for unknown ids.
    pub fn set_physics_enabled(
        &mut self,
        world: &mut dyn DynamicsWorld,
        id: EntityId,
        enabled: bool,
    ) -> Result<bool, OrreryError> {
        let Some(entity) = self.get_object_mut(id) else {
            return Ok(false);
        };
        entity.set_physics_flag(enabled);
        let handle = entity.handle();
        if enabled {
            handle.enable_physics(self, world)?;
        } else {
            handle.disable_physics(self, world)?;
        }
        Ok(true)
    }

    /// The script runtime collaborator.
    pub fn runtime_mut(&mut self) -> &mut dyn ScriptRuntime {
        self.runtime.as_mut()
    }

    pub(crate) fn load_env(
        &mut self,
        package: &str,
        name: &str,
    ) -> Result<Box<dyn ScriptEnv>, OrreryError> {
        self.runtime.load(package, name)
    }

    /// Bulk-registers already-instantiated entities and adopts `next_id`. Used by the
    /// persistence adapter's phase one, after every record has validated and loaded.
    pub(crate) fn commit_loaded(&mut self, entities: Vec<Entity>, next_id: i64) {
        for entity in entities {
            self.by_id.insert(entity.id(), self.entities.len());
            self.entities.push(entity);
        }
        self.next_id = next_id;
    }
}

/// The top-level simulation object: a [`Registry`] plus the exclusively owned physics
/// world and the stepping parameters.
///
/// A single logical thread drives everything: frame loop → [`Universe::update`] →
/// `step_simulation` → re-entrant [`Registry::physics_update`], all synchronous and
/// non-suspending. An entity hook that blocks stalls the whole simulation frame.
pub struct Universe {
    registry: Registry,
    world: Box<dyn DynamicsWorld>,
    settings: StepSettings,
}

impl Universe {
    /// A universe with the in-process script runtime and the reference stepping driver.
    #[must_use]
    pub fn new() -> Universe {
        Universe::with_parts(
            Box::new(NativeRuntime::new()),
            Box::new(FixedStepWorld::new()),
            StepSettings::default(),
        )
    }

    #[must_use]
    pub fn with_parts(
        runtime: Box<dyn ScriptRuntime>,
        world: Box<dyn DynamicsWorld>,
        settings: StepSettings,
    ) -> Universe {
        Universe {
            registry: Registry::new(runtime),
            world,
            settings,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    #[must_use]
    pub fn world(&self) -> &dyn DynamicsWorld {
        self.world.as_ref()
    }

    pub fn world_mut(&mut self) -> &mut dyn DynamicsWorld {
        self.world.as_mut()
    }

    /// Splits the universe into the registry and the world, borrowed simultaneously.
    /// This is the shape every hook dispatch wants.
    pub fn parts_mut(&mut self) -> (&mut Registry, &mut dyn DynamicsWorld) {
        (&mut self.registry, self.world.as_mut())
    }

    #[must_use]
    pub fn settings(&self) -> StepSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: StepSettings) {
        self.settings = settings;
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.registry.paused
    }

    /// While paused, the system tick, the update pass and physics stepping are all
    /// skipped; object existence, lookups, event traffic and deferred-removal excision
    /// continue.
    pub fn set_paused(&mut self, paused: bool) {
        self.registry.paused = paused;
    }

    /// Advances the simulation by one frame.
    ///
    /// A hook failure aborts the frame with the error tagged with the offending object;
    /// the universe should not be stepped further after that.
    pub fn update(&mut self, dt: f64) -> Result<(), OrreryError> {
        if !self.registry.paused {
            self.registry.tick_system(self.world.as_mut(), dt, false);
            self.registry.update_pass(self.world.as_mut(), dt)?;

            let StepSettings {
                fixed_timestep,
                max_substeps,
            } = self.settings;
            let registry = &mut self.registry;
            let mut pass_error: Option<OrreryError> = None;
            self.world.step_simulation(
                dt,
                max_substeps,
                fixed_timestep,
                &mut |world, pdt| {
                    if pass_error.is_none() {
                        if let Err(err) = registry.physics_update(world, pdt) {
                            pass_error = Some(err);
                        }
                    }
                },
            );
            if let Some(err) = pass_error {
                return Err(err);
            }
        }
        // The safe point: the world has returned control and no pass is in flight.
        self.registry.flush_removals();
        Ok(())
    }

    /// Advances the simulation by `frames` frames of `dt` each.
    pub fn run_frames(&mut self, frames: u32, dt: f64) -> Result<(), OrreryError> {
        for _ in 0..frames {
            self.update(dt)?;
        }
        Ok(())
    }

    /// See [`Registry::create_object`].
    pub fn create_object(
        &mut self,
        path: &str,
        current_package: &str,
        init_data: serde_json::Value,
        args: &[Value],
        is_create: bool,
    ) -> Result<EntityId, OrreryError> {
        self.registry.create_object(
            self.world.as_mut(),
            path,
            current_package,
            init_data,
            args,
            is_create,
        )
    }

    /// See [`Registry::remove_object`].
    pub fn remove_object(&mut self, id: EntityId) -> bool {
        self.registry.remove_object(self.world.as_mut(), id)
    }

    /// See [`Registry::get_object`].
    #[must_use]
    pub fn get_object(&self, id: EntityId) -> Option<&Entity> {
        self.registry.get_object(id)
    }

    /// See [`Registry::handle`].
    #[must_use]
    pub fn handle(&self, id: EntityId) -> Option<EntityHandle> {
        self.registry.handle(id)
    }

    pub fn subscribe(
        &mut self,
        event: &str,
        subscriber: SubscriberId,
        handler: impl Fn(&mut Registry, &mut dyn DynamicsWorld, &[Value]) + 'static,
    ) {
        self.registry.subscribe(event, subscriber, handler);
    }

    pub fn unsubscribe(&mut self, subscriber: SubscriberId) {
        self.registry.unsubscribe(subscriber);
    }

    pub fn emit_event(&mut self, event: &str, args: &[Value]) {
        self.registry
            .emit_event(self.world.as_mut(), event, args);
    }

    /// Registers a behavior with the in-process script runtime. Fails if the universe was
    /// built with a different [`ScriptRuntime`].
    pub fn register_native_script(
        &mut self,
        type_str: &str,
        factory: impl Fn() -> NativeScript + 'static,
    ) -> Result<(), OrreryError> {
        match self
            .registry
            .runtime_mut()
            .as_any_mut()
            .downcast_mut::<NativeRuntime>()
        {
            Some(runtime) => {
                runtime.register(type_str, factory);
                Ok(())
            }
            None => Err(OrreryError::Script(
                "script runtime is not the native runtime".into(),
            )),
        }
    }
}

impl Default for Universe {
    fn default() -> Self {
        Universe::new()
    }
}
