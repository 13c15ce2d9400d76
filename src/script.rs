//! Behavior bindings: the seam between the registry and the external scripting engine.
//!
//! Every object's real behavior is late-bound. A behavior is not a trait hierarchy but a
//! capability set: a table of named optional hooks (see [`hooks`]), each independently present
//! or absent. Calling an absent hook is not an error; the caller substitutes a documented
//! default value (see the typed wrappers on
//! [`EntityHandle`](crate::entity::EntityHandle)).
//!
//! The scripting engine itself is an external collaborator. It is modeled by two traits:
//! [`ScriptRuntime`], which loads a script environment for a resolved `package:name` type, and
//! [`ScriptEnv`], one loaded environment with its own state. Hosts that script in Rust (and
//! the test suite) use the in-process [`NativeRuntime`], which registers behaviors as tables
//! of closures.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use log::trace;

use crate::entity::EntityId;
use crate::error::OrreryError;
use crate::physics::DynamicsWorld;
use crate::universe::Registry;
use crate::value::Value;
use crate::HashMap;

/// Hook names with framework-defined meaning. A behavior may define any subset.
pub mod hooks {
    /// `update(dt)`: visual/logic tick, once per frame.
    pub const UPDATE: &str = "update";
    /// `physics_update(pdt)`: once per physics sub-step, before integration.
    pub const PHYSICS_UPDATE: &str = "physics_update";
    /// Called when the object should start simulating physics bodies in the world.
    pub const ENABLE_PHYSICS: &str = "enable_physics";
    /// Called when the object must stop simulating physics bodies in the world.
    pub const DISABLE_PHYSICS: &str = "disable_physics";
    /// `get_position(physics)`: defaults to the zero vector.
    pub const GET_POSITION: &str = "get_position";
    /// `get_velocity(physics)`: defaults to the zero vector.
    pub const GET_VELOCITY: &str = "get_velocity";
    /// `get_orientation(physics)`: defaults to the identity quaternion.
    pub const GET_ORIENTATION: &str = "get_orientation";
    /// `get_angular_velocity(physics)`: defaults to the zero vector.
    pub const GET_ANGULAR_VELOCITY: &str = "get_angular_velocity";
    /// Approximate object size for physics loading; `0.0` (the default) means no limit.
    pub const GET_PHYSICS_RADIUS: &str = "get_physics_radius";
    /// Whether physics must be loaded around this object. Defaults to `false`.
    pub const IS_PHYSICS_LOADER: &str = "is_physics_loader";
    /// Whether physics have stabilized enough for timewarp. Defaults to `true`.
    pub const TIMEWARP_SAFE: &str = "timewarp_safe";
    /// Returns the object's entity-specific persistent state as a data blob.
    pub const SAVE: &str = "save";
    /// Custom debug rendering; called from within an existing debug surface.
    pub const DEBUG_DRAW: &str = "debug_draw";
    /// Called when the object is added to the universe, including on save-game load.
    pub const INIT: &str = "init";
    /// Called once, when the object is first created, and never on load.
    pub const CREATE: &str = "create";
}

/// Splits a type path into `(package, name)`.
///
/// A path of the form `"pkg:name"` is absolute; a bare `"name"` resolves against
/// `current_package`, which callers thread through explicitly; there is no ambient
/// "current package" state.
pub fn resolve_type(path: &str, current_package: &str) -> Result<(String, String), OrreryError> {
    let (package, name) = match path.split_once(':') {
        Some((package, name)) => (package, name),
        None => (current_package, path),
    };
    if package.is_empty() || name.is_empty() {
        return Err(OrreryError::Script(format!(
            "cannot resolve type path '{path}' (package '{current_package}')"
        )));
    }
    Ok((package.to_string(), name.to_string()))
}

/// The external scripting engine: loads the script environment backing a resolved type.
/// A load or compile failure is fatal at object-creation time: the object is never
/// registered.
pub trait ScriptRuntime {
    fn load(&mut self, package: &str, name: &str) -> Result<Box<dyn ScriptEnv>, OrreryError>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// One loaded script environment, owning whatever state the script keeps.
///
/// `call_hook` returns `Ok(None)` when the environment does not define `hook`; absence is
/// expected, not an error. `Ok(Some(Value::Null))` is a present hook that returned nothing.
/// `Err` means the script failed mid-hook; the registry treats that as fatal for the object.
///
/// `me` is the id of the object the environment is bound to; the environment can read its
/// own init data and metadata back through `registry`.
pub trait ScriptEnv {
    fn call_hook(
        &mut self,
        registry: &mut Registry,
        world: &mut dyn DynamicsWorld,
        me: EntityId,
        hook: &str,
        args: &[Value],
    ) -> Result<Option<Value>, OrreryError>;
}

/// The binding between one entity and its loaded script environment.
///
/// Bindings are cheaply cloneable handles; the registry's passes snapshot them so a hook can
/// re-entrantly mutate the registry without invalidating the iteration. The environment holds
/// no engine state itself.
#[derive(Clone)]
pub struct BehaviorBinding {
    type_str: Rc<str>,
    env: Rc<RefCell<Box<dyn ScriptEnv>>>,
}

impl BehaviorBinding {
    pub(crate) fn new(type_str: Rc<str>, env: Box<dyn ScriptEnv>) -> BehaviorBinding {
        BehaviorBinding {
            type_str,
            env: Rc::new(RefCell::new(env)),
        }
    }

    /// The resolved `package:name` this binding was loaded for.
    #[must_use]
    pub fn type_str(&self) -> &str {
        &self.type_str
    }

    /// Invokes `hook` on the bound environment. Script failures come back tagged with the
    /// object's id and type, since an object in an unknown partial state cannot be safely
    /// continued.
    pub fn call_hook(
        &self,
        registry: &mut Registry,
        world: &mut dyn DynamicsWorld,
        me: EntityId,
        hook: &str,
        args: &[Value],
    ) -> Result<Option<Value>, OrreryError> {
        let result = self
            .env
            .borrow_mut()
            .call_hook(registry, world, me, hook, args);
        match result {
            Ok(None) => {
                trace!("object {me} ({}) has no '{hook}' hook", self.type_str);
                Ok(None)
            }
            Ok(value) => Ok(value),
            Err(err) => Err(OrreryError::Script(format!(
                "object {me} ({}) failed in hook '{hook}': {err}",
                self.type_str
            ))),
        }
    }
}

/// The signature of a hook registered with the in-process [`NativeRuntime`].
pub type NativeHookFn = dyn Fn(
    &mut Registry,
    &mut dyn DynamicsWorld,
    EntityId,
    &[Value],
) -> Result<Value, OrreryError>;

/// A behavior expressed as a table of named Rust closures. Each entity instance gets its own
/// `NativeScript` from its registered factory, so per-instance state lives in whatever the
/// factory's closures capture.
#[derive(Clone, Default)]
pub struct NativeScript {
    hooks: HashMap<String, Rc<NativeHookFn>>,
}

impl NativeScript {
    #[must_use]
    pub fn new() -> NativeScript {
        NativeScript::default()
    }

    /// Defines `hook`. Returns `self` so scripts read as a builder chain.
    #[must_use]
    pub fn on(
        mut self,
        hook: &str,
        f: impl Fn(
                &mut Registry,
                &mut dyn DynamicsWorld,
                EntityId,
                &[Value],
            ) -> Result<Value, OrreryError>
            + 'static,
    ) -> NativeScript {
        self.hooks.insert(hook.to_string(), Rc::new(f));
        self
    }
}

impl ScriptEnv for NativeScript {
    fn call_hook(
        &mut self,
        registry: &mut Registry,
        world: &mut dyn DynamicsWorld,
        me: EntityId,
        hook: &str,
        args: &[Value],
    ) -> Result<Option<Value>, OrreryError> {
        match self.hooks.get(hook) {
            Some(f) => {
                let f = Rc::clone(f);
                f(registry, world, me, args).map(Some)
            }
            None => Ok(None),
        }
    }
}

type ScriptFactory = dyn Fn() -> NativeScript;

/// The in-process [`ScriptRuntime`]: behaviors are registered under their full
/// `package:name` type string as factories producing a fresh [`NativeScript`] per object.
#[derive(Default)]
pub struct NativeRuntime {
    scripts: HashMap<String, Box<ScriptFactory>>,
}

impl NativeRuntime {
    #[must_use]
    pub fn new() -> NativeRuntime {
        NativeRuntime::default()
    }

    /// Registers `factory` for the type `type_str` (`"package:name"`), replacing any
    /// previous registration.
    pub fn register(&mut self, type_str: &str, factory: impl Fn() -> NativeScript + 'static) {
        self.scripts.insert(type_str.to_string(), Box::new(factory));
    }
}

impl ScriptRuntime for NativeRuntime {
    fn load(&mut self, package: &str, name: &str) -> Result<Box<dyn ScriptEnv>, OrreryError> {
        let key = format!("{package}:{name}");
        match self.scripts.get(&key) {
            Some(factory) => Ok(Box::new(factory())),
            None => Err(OrreryError::Script(format!(
                "no script registered for type '{key}'"
            ))),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::FixedStepWorld;

    #[test]
    fn resolve_qualified_paths() {
        assert_eq!(
            resolve_type("core:ship", "luna").unwrap(),
            ("core".to_string(), "ship".to_string())
        );
        // A bare name resolves against the threaded current package.
        assert_eq!(
            resolve_type("lander", "luna").unwrap(),
            ("luna".to_string(), "lander".to_string())
        );
        // Only the first ':' splits; the rest belongs to the name.
        assert_eq!(
            resolve_type("core:vehicles/ship:mk2", "core").unwrap(),
            ("core".to_string(), "vehicles/ship:mk2".to_string())
        );
    }

    #[test]
    fn resolve_rejects_empty_components() {
        assert!(resolve_type(":ship", "core").is_err());
        assert!(resolve_type("core:", "core").is_err());
        assert!(resolve_type("ship", "").is_err());
        assert!(resolve_type("", "core").is_err());
    }

    #[test]
    fn unknown_type_fails_to_load() {
        let mut runtime = NativeRuntime::new();
        let result = runtime.load("core", "missing");
        assert!(matches!(result, Err(OrreryError::Script(_))));
    }

    #[test]
    fn native_script_dispatches_by_name() {
        let mut runtime = NativeRuntime::new();
        runtime.register("core:probe", || {
            NativeScript::new().on(hooks::GET_PHYSICS_RADIUS, |_, _, _, _| Ok(Value::Float(2.5)))
        });

        let mut env = runtime.load("core", "probe").unwrap();
        let mut registry = Registry::new(Box::new(NativeRuntime::new()));
        let mut world = FixedStepWorld::new();

        let present = env
            .call_hook(
                &mut registry,
                &mut world,
                EntityId(1),
                hooks::GET_PHYSICS_RADIUS,
                &[],
            )
            .unwrap();
        assert_eq!(present, Some(Value::Float(2.5)));

        // Absent hooks are absent, not errors.
        let absent = env
            .call_hook(
                &mut registry,
                &mut world,
                EntityId(1),
                hooks::TIMEWARP_SAFE,
                &[],
            )
            .unwrap();
        assert_eq!(absent, None);
    }

    #[test]
    fn each_load_gets_a_fresh_environment() {
        let mut runtime = NativeRuntime::new();
        runtime.register("core:counter", || {
            let count = std::cell::Cell::new(0_i64);
            NativeScript::new().on(hooks::UPDATE, move |_, _, _, _| {
                count.set(count.get() + 1);
                Ok(Value::Int(count.get()))
            })
        });

        let mut registry = Registry::new(Box::new(NativeRuntime::new()));
        let mut world = FixedStepWorld::new();
        let mut first = runtime.load("core", "counter").unwrap();
        let mut second = runtime.load("core", "counter").unwrap();

        let args = [Value::Float(0.1)];
        first
            .call_hook(&mut registry, &mut world, EntityId(1), hooks::UPDATE, &args)
            .unwrap();
        let first_again = first
            .call_hook(&mut registry, &mut world, EntityId(1), hooks::UPDATE, &args)
            .unwrap();
        let second_once = second
            .call_hook(&mut registry, &mut world, EntityId(2), hooks::UPDATE, &args)
            .unwrap();

        // Instance state is per-environment, not shared through the factory.
        assert_eq!(first_again, Some(Value::Int(2)));
        assert_eq!(second_once, Some(Value::Int(1)));
    }
}
