//! Simulated objects: identity, physics participation, behavior binding, optional trajectory.
//!
//! An [`Entity`] is something which exists in the universe and can exist in its physics
//! world. It can equally represent non-physical objects that are somehow related to the
//! simulation. Communication between entities is freely handled by the user; the recommended
//! architecture is the event publish/subscribe system.
//!
//! Entities must not retain references to each other across frame boundaries. The only
//! durable cross-entity reference is an [`EntityId`], re-resolved through
//! [`Registry::get_object`](crate::universe::Registry::get_object) on each use, because ids
//! stay stable while backing storage is compacted on removal.
//!
//! All entity behavior is dispatched through optional script hooks via [`EntityHandle`];
//! every getter has a documented default for behaviors that do not implement it, and never
//! fails.

use std::fmt;
use std::rc::Rc;

use glam::{DQuat, DVec3};

use crate::error::OrreryError;
use crate::physics::DynamicsWorld;
use crate::script::{hooks, BehaviorBinding};
use crate::universe::Registry;
use crate::value::Value;

/// A stable object identifier: 64-bit, monotonically increasing, assigned at registration
/// and never reused. `0` is reserved as "no entity".
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub i64);

impl EntityId {
    /// The reserved "no entity" id.
    pub const NONE: EntityId = EntityId(0);

    #[must_use]
    pub fn is_none(self) -> bool {
        self == EntityId::NONE
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One kinematic sample: position, velocity, orientation and angular velocity.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WorldState {
    pub pos: DVec3,
    pub vel: DVec3,
    pub rot: DQuat,
    pub ang_vel: DVec3,
}

impl Default for WorldState {
    fn default() -> Self {
        Self {
            pos: DVec3::ZERO,
            vel: DVec3::ZERO,
            rot: DQuat::IDENTITY,
            ang_vel: DVec3::ZERO,
        }
    }
}

/// An analytic propagator attached to an entity. Absence means the entity relies on
/// numerical integration. The registry does not tick trajectories; they exist for
/// timewarp and prediction, and whoever uses one must call `update` themselves.
pub trait Trajectory {
    fn update(&mut self, dt: f64);
    fn state_at(&self, t: f64) -> WorldState;
}

/// One simulated object owned by the registry.
///
/// The interesting state lives behind the behavior binding; the `Entity` itself carries
/// identity and lifecycle flags. Hook dispatch goes through [`EntityHandle`], obtained
/// from [`Registry::handle`](crate::universe::Registry::handle).
pub struct Entity {
    id: EntityId,
    behavior: BehaviorBinding,
    physics_enabled: bool,
    in_universe: bool,
    trajectory: Option<Box<dyn Trajectory>>,
    init_data: serde_json::Value,
}

impl Entity {
    pub(crate) fn new(
        id: EntityId,
        behavior: BehaviorBinding,
        init_data: serde_json::Value,
    ) -> Entity {
        Entity {
            id,
            behavior,
            physics_enabled: false,
            in_universe: false,
            trajectory: None,
            init_data,
        }
    }

    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// The `package:name` type naming this entity's behavior script.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        self.behavior.type_str()
    }

    /// Returns true if the object has not been removed. Useful if you keep references
    /// (not recommended, but required sometimes!).
    #[must_use]
    pub fn exists(&self) -> bool {
        self.in_universe
    }

    #[must_use]
    pub fn physics_enabled(&self) -> bool {
        self.physics_enabled
    }

    /// The opaque init blob this entity was created or restored with.
    #[must_use]
    pub fn init_data(&self) -> &serde_json::Value {
        &self.init_data
    }

    #[must_use]
    pub fn trajectory(&self) -> Option<&dyn Trajectory> {
        self.trajectory.as_deref()
    }

    pub fn trajectory_mut(&mut self) -> Option<&mut (dyn Trajectory + 'static)> {
        self.trajectory.as_deref_mut()
    }

    /// Attaches (or clears) the analytic propagator for this entity.
    pub fn set_trajectory(&mut self, trajectory: Option<Box<dyn Trajectory>>) {
        self.trajectory = trajectory;
    }

    /// A cloneable dispatch handle for this entity's behavior.
    #[must_use]
    pub fn handle(&self) -> EntityHandle {
        EntityHandle {
            id: self.id,
            binding: self.behavior.clone(),
        }
    }

    pub(crate) fn mark_registered(&mut self) {
        self.in_universe = true;
    }

    pub(crate) fn mark_removed(&mut self) {
        self.in_universe = false;
    }

    pub(crate) fn set_physics_flag(&mut self, enabled: bool) {
        self.physics_enabled = enabled;
    }
}

/// A transient dispatch handle: an entity's id plus its behavior binding.
///
/// Handles are what the registry's passes snapshot, and what host code uses to call hooks
/// while holding the registry and world mutably (see
/// [`Universe::parts_mut`](crate::universe::Universe::parts_mut)). Do not store handles
/// across frames; store the id.
#[derive(Clone)]
pub struct EntityHandle {
    id: EntityId,
    binding: BehaviorBinding,
}

impl EntityHandle {
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    #[must_use]
    pub fn entity_type(&self) -> &str {
        self.binding.type_str()
    }

    /// Raw hook dispatch. Prefer the typed wrappers below.
    pub fn call_hook(
        &self,
        registry: &mut Registry,
        world: &mut dyn DynamicsWorld,
        hook: &str,
        args: &[Value],
    ) -> Result<Option<Value>, OrreryError> {
        self.binding.call_hook(registry, world, self.id, hook, args)
    }

    /// Visual/logic tick, always realtime.
    pub fn update(
        &self,
        registry: &mut Registry,
        world: &mut dyn DynamicsWorld,
        dt: f64,
    ) -> Result<(), OrreryError> {
        self.call_hook(registry, world, hooks::UPDATE, &[Value::Float(dt)])
            .map(|_| ())
    }

    /// Physics tick. Runs once per sub-step, before the world integrates that sub-step.
    pub fn physics_update(
        &self,
        registry: &mut Registry,
        world: &mut dyn DynamicsWorld,
        pdt: f64,
    ) -> Result<(), OrreryError> {
        self.call_hook(registry, world, hooks::PHYSICS_UPDATE, &[Value::Float(pdt)])
            .map(|_| ())
    }

    /// The behavior should start simulating physics bodies here.
    pub fn enable_physics(
        &self,
        registry: &mut Registry,
        world: &mut dyn DynamicsWorld,
    ) -> Result<(), OrreryError> {
        self.call_hook(registry, world, hooks::ENABLE_PHYSICS, &[])
            .map(|_| ())
    }

    /// The behavior must stop simulating physics bodies here.
    pub fn disable_physics(
        &self,
        registry: &mut Registry,
        world: &mut dyn DynamicsWorld,
    ) -> Result<(), OrreryError> {
        self.call_hook(registry, world, hooks::DISABLE_PHYSICS, &[])
            .map(|_| ())
    }

    /// Current position; the origin is a representative point, for example the center of
    /// mass. With `physics` true, returns the unsmoothed value at simulation time; use
    /// that for physics-safe reads such as distance checks. Defaults to the zero vector.
    pub fn position(
        &self,
        registry: &mut Registry,
        world: &mut dyn DynamicsWorld,
        physics: bool,
    ) -> Result<DVec3, OrreryError> {
        Ok(self
            .call_hook(registry, world, hooks::GET_POSITION, &[Value::Bool(physics)])?
            .and_then(|v| v.as_vec3())
            .unwrap_or(DVec3::ZERO))
    }

    /// Current velocity. Defaults to the zero vector.
    pub fn velocity(
        &self,
        registry: &mut Registry,
        world: &mut dyn DynamicsWorld,
        physics: bool,
    ) -> Result<DVec3, OrreryError> {
        Ok(self
            .call_hook(registry, world, hooks::GET_VELOCITY, &[Value::Bool(physics)])?
            .and_then(|v| v.as_vec3())
            .unwrap_or(DVec3::ZERO))
    }

    /// Current orientation. Defaults to the identity quaternion.
    pub fn orientation(
        &self,
        registry: &mut Registry,
        world: &mut dyn DynamicsWorld,
        physics: bool,
    ) -> Result<DQuat, OrreryError> {
        Ok(self
            .call_hook(
                registry,
                world,
                hooks::GET_ORIENTATION,
                &[Value::Bool(physics)],
            )?
            .and_then(|v| v.as_quat())
            .unwrap_or(DQuat::IDENTITY))
    }

    /// Current angular velocity. Defaults to the zero vector.
    pub fn angular_velocity(
        &self,
        registry: &mut Registry,
        world: &mut dyn DynamicsWorld,
        physics: bool,
    ) -> Result<DVec3, OrreryError> {
        Ok(self
            .call_hook(
                registry,
                world,
                hooks::GET_ANGULAR_VELOCITY,
                &[Value::Bool(physics)],
            )?
            .and_then(|v| v.as_vec3())
            .unwrap_or(DVec3::ZERO))
    }

    /// An approximation of the object's size; behaviors should err high. `0.0` (the
    /// default) means no limit for physics loading.
    pub fn physics_radius(
        &self,
        registry: &mut Registry,
        world: &mut dyn DynamicsWorld,
    ) -> Result<f64, OrreryError> {
        Ok(self
            .call_hook(registry, world, hooks::GET_PHYSICS_RADIUS, &[])?
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0))
    }

    /// True if physics are required around this object. Defaults to false.
    pub fn is_physics_loader(
        &self,
        registry: &mut Registry,
        world: &mut dyn DynamicsWorld,
    ) -> Result<bool, OrreryError> {
        Ok(self
            .call_hook(registry, world, hooks::IS_PHYSICS_LOADER, &[])?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    /// True if the physics have stabilized enough for timewarp. Vehicles should return
    /// false close to surfaces or in atmospheric flight. Defaults to true.
    pub fn timewarp_safe(
        &self,
        registry: &mut Registry,
        world: &mut dyn DynamicsWorld,
    ) -> Result<bool, OrreryError> {
        Ok(self
            .call_hook(registry, world, hooks::TIMEWARP_SAFE, &[])?
            .and_then(|v| v.as_bool())
            .unwrap_or(true))
    }

    /// Custom debug rendering. The caller is expected to already be inside a debug
    /// surface; behaviors without the hook draw nothing.
    pub fn debug_draw(
        &self,
        registry: &mut Registry,
        world: &mut dyn DynamicsWorld,
    ) -> Result<(), OrreryError> {
        self.call_hook(registry, world, hooks::DEBUG_DRAW, &[])
            .map(|_| ())
    }

    /// Asks the behavior for its entity-specific persistent state. `None` means nothing
    /// beyond id and type is persisted.
    pub fn save(
        &self,
        registry: &mut Registry,
        world: &mut dyn DynamicsWorld,
    ) -> Result<Option<serde_json::Value>, OrreryError> {
        Ok(self
            .call_hook(registry, world, hooks::SAVE, &[])?
            .and_then(|v| v.as_data().cloned()))
    }

    /// Runs the `init` hook. Called when the entity is added to the universe, both on
    /// creation and on save-game load, once the entity is resolvable by id.
    pub(crate) fn setup(
        &self,
        registry: &mut Registry,
        world: &mut dyn DynamicsWorld,
    ) -> Result<(), OrreryError> {
        self.call_hook(registry, world, hooks::INIT, &[]).map(|_| ())
    }

    /// Runs the `create` hook with the creation arguments. Called only when the entity is
    /// first created, never on load.
    pub(crate) fn created(
        &self,
        registry: &mut Registry,
        world: &mut dyn DynamicsWorld,
        args: &[Value],
    ) -> Result<(), OrreryError> {
        self.call_hook(registry, world, hooks::CREATE, args)
            .map(|_| ())
    }
}

pub(crate) fn make_type_str(package: &str, name: &str) -> Rc<str> {
    Rc::from(format!("{package}:{name}"))
}

#[cfg(test)]
mod tests {
    use glam::{DQuat, DVec3};

    use super::*;
    use crate::physics::FixedStepWorld;
    use crate::script::{NativeRuntime, NativeScript};
    use crate::universe::Registry;

    fn registry_with(type_str: &str, factory: impl Fn() -> NativeScript + 'static) -> Registry {
        let mut runtime = NativeRuntime::new();
        runtime.register(type_str, factory);
        Registry::new(Box::new(runtime))
    }

    #[test]
    fn hookless_behavior_yields_documented_defaults() {
        let mut registry = registry_with("core:inert", NativeScript::new);
        let mut world = FixedStepWorld::new();
        let id = registry
            .create_object(&mut world, "core:inert", "core", serde_json::Value::Null, &[], true)
            .unwrap();
        let handle = registry.handle(id).unwrap();

        assert_eq!(
            handle.position(&mut registry, &mut world, true).unwrap(),
            DVec3::ZERO
        );
        assert_eq!(
            handle.velocity(&mut registry, &mut world, false).unwrap(),
            DVec3::ZERO
        );
        assert_eq!(
            handle.orientation(&mut registry, &mut world, true).unwrap(),
            DQuat::IDENTITY
        );
        assert_eq!(
            handle
                .angular_velocity(&mut registry, &mut world, true)
                .unwrap(),
            DVec3::ZERO
        );
        assert_eq!(
            handle.physics_radius(&mut registry, &mut world).unwrap(),
            0.0
        );
        assert!(!handle.is_physics_loader(&mut registry, &mut world).unwrap());
        assert!(handle.timewarp_safe(&mut registry, &mut world).unwrap());
        assert_eq!(handle.save(&mut registry, &mut world).unwrap(), None);
    }

    #[test]
    fn getters_see_the_physics_flag() {
        let mut registry = registry_with("core:station", || {
            NativeScript::new().on(hooks::GET_POSITION, |_, _, _, args| {
                let physics = args[0].as_bool().unwrap_or(false);
                // Unsmoothed physics-time reads differ from the interpolated render value.
                Ok(Value::Vec3(if physics {
                    DVec3::new(10.0, 0.0, 0.0)
                } else {
                    DVec3::new(9.5, 0.0, 0.0)
                }))
            })
        });
        let mut world = FixedStepWorld::new();
        let id = registry
            .create_object(
                &mut world,
                "core:station",
                "core",
                serde_json::Value::Null,
                &[],
                true,
            )
            .unwrap();
        let handle = registry.handle(id).unwrap();

        assert_eq!(
            handle.position(&mut registry, &mut world, true).unwrap(),
            DVec3::new(10.0, 0.0, 0.0)
        );
        assert_eq!(
            handle.position(&mut registry, &mut world, false).unwrap(),
            DVec3::new(9.5, 0.0, 0.0)
        );
    }

    #[test]
    fn mistyped_hook_results_fall_back_to_defaults() {
        let mut registry = registry_with("core:confused", || {
            NativeScript::new()
                .on(hooks::GET_POSITION, |_, _, _, _| Ok(Value::Str("here".into())))
                .on(hooks::TIMEWARP_SAFE, |_, _, _, _| Ok(Value::Int(1)))
        });
        let mut world = FixedStepWorld::new();
        let id = registry
            .create_object(
                &mut world,
                "core:confused",
                "core",
                serde_json::Value::Null,
                &[],
                true,
            )
            .unwrap();
        let handle = registry.handle(id).unwrap();

        assert_eq!(
            handle.position(&mut registry, &mut world, true).unwrap(),
            DVec3::ZERO
        );
        assert!(handle.timewarp_safe(&mut registry, &mut world).unwrap());
    }

    #[test]
    fn failing_hook_is_tagged_with_id_and_type() {
        let mut registry = registry_with("core:faulty", || {
            NativeScript::new().on(hooks::UPDATE, |_, _, _, _| {
                Err(OrreryError::Script("division by zero".into()))
            })
        });
        let mut world = FixedStepWorld::new();
        let id = registry
            .create_object(
                &mut world,
                "core:faulty",
                "core",
                serde_json::Value::Null,
                &[],
                true,
            )
            .unwrap();
        let handle = registry.handle(id).unwrap();

        let err = handle.update(&mut registry, &mut world, 0.1).unwrap_err();
        let message = err.to_string();
        assert!(message.contains(&id.to_string()));
        assert!(message.contains("core:faulty"));
        assert!(message.contains("update"));
    }

    #[test]
    fn trajectory_attachment() {
        struct Circular;
        impl Trajectory for Circular {
            fn update(&mut self, _dt: f64) {}
            fn state_at(&self, t: f64) -> WorldState {
                WorldState {
                    pos: DVec3::new(t.cos(), t.sin(), 0.0),
                    ..WorldState::default()
                }
            }
        }

        let mut registry = registry_with("core:moon", NativeScript::new);
        let mut world = FixedStepWorld::new();
        let id = registry
            .create_object(&mut world, "core:moon", "core", serde_json::Value::Null, &[], true)
            .unwrap();

        assert!(registry.get_object(id).unwrap().trajectory().is_none());
        registry
            .get_object_mut(id)
            .unwrap()
            .set_trajectory(Some(Box::new(Circular)));

        let state = registry
            .get_object(id)
            .unwrap()
            .trajectory()
            .unwrap()
            .state_at(0.0);
        assert_eq!(state.pos, DVec3::new(1.0, 0.0, 0.0));
        assert_eq!(state.rot, DQuat::IDENTITY);
    }

    #[test]
    fn entity_id_display_and_none() {
        assert_eq!(EntityId(42).to_string(), "42");
        assert!(EntityId::NONE.is_none());
        assert!(!EntityId(1).is_none());
        assert_eq!(EntityId::NONE, EntityId(0));
    }
}
