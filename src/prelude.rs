pub use crate::entity::{Entity, EntityHandle, EntityId, Trajectory, WorldState};
pub use crate::error::OrreryError;
pub use crate::event::{events, EventBus, EventHandler, SubscriberId};
pub use crate::log::{debug, error, info, trace, warn};
pub use crate::persistence::{LoadOutcome, SaveDocument, SaveMetadata, SavedObject};
pub use crate::physics::{DynamicsWorld, FixedStepWorld, StepSettings};
pub use crate::runner::{run_with_args, run_with_custom_args, BaseArgs, SimulationConfig};
pub use crate::script::{
    hooks, resolve_type, BehaviorBinding, NativeRuntime, NativeScript, ScriptEnv, ScriptRuntime,
};
pub use crate::universe::{Registry, SystemModel, Universe};
pub use crate::value::Value;
