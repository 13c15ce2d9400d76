//! The physics engine collaborator seam.
//!
//! The registry never looks inside the physics engine: contact generation, constraint solving
//! and integration are the collaborator's business. What the registry relies on is the shape
//! of the stepping contract, modeled by [`DynamicsWorld`]: one `step_simulation` call may
//! perform zero or more fixed-size sub-steps, and synchronously re-enters the supplied tick
//! callback once per sub-step, before integrating that sub-step.
//!
//! [`FixedStepWorld`] is the reference driver implementing that accounting. Backends wrapping
//! a real rigid-body engine implement the same trait and forward the tick to the engine's
//! internal tick callback.

use std::any::Any;

use serde::{Deserialize, Serialize};

/// Fixed sub-step size used when the host does not configure one.
pub const DEFAULT_PHYSICS_STEPSIZE: f64 = 1.0 / 30.0;
/// Maximum sub-steps per `update` call used when the host does not configure one.
pub const DEFAULT_MAX_PHYSICS_STEPS: u32 = 1;

fn default_stepsize() -> f64 {
    DEFAULT_PHYSICS_STEPSIZE
}

fn default_max_steps() -> u32 {
    DEFAULT_MAX_PHYSICS_STEPS
}

/// Stepping parameters handed to [`DynamicsWorld::step_simulation`] every frame.
///
/// If the requested `dt` requires more sub-steps than `max_substeps`, the excess time is
/// dropped: simulation falls behind wall clock instead of spiraling into unbounded catch-up
/// work.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepSettings {
    #[serde(default = "default_stepsize")]
    pub fixed_timestep: f64,
    #[serde(default = "default_max_steps")]
    pub max_substeps: u32,
}

impl Default for StepSettings {
    fn default() -> Self {
        Self {
            fixed_timestep: DEFAULT_PHYSICS_STEPSIZE,
            max_substeps: DEFAULT_MAX_PHYSICS_STEPS,
        }
    }
}

/// The externally owned rigid-body world, reduced to the stepping contract.
///
/// `tick` is invoked once per performed sub-step, strictly before that sub-step is
/// integrated, and receives the world re-borrowed so hooks running inside the tick can
/// manipulate bodies. Returns the number of sub-steps performed.
pub trait DynamicsWorld {
    fn step_simulation(
        &mut self,
        dt: f64,
        max_substeps: u32,
        fixed_step: f64,
        tick: &mut dyn FnMut(&mut dyn DynamicsWorld, f64),
    ) -> u32;

    /// Accumulated simulation time, advanced only by performed sub-steps.
    fn sim_time(&self) -> f64;

    /// Downcast access for backends exposing engine-specific body APIs.
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Reference [`DynamicsWorld`]: performs the sub-step bookkeeping of a fixed-timestep
/// engine without simulating any bodies. Useful on its own for headless logic simulations,
/// and the world every test runs against.
#[derive(Default)]
pub struct FixedStepWorld {
    accumulator: f64,
    sim_time: f64,
}

impl FixedStepWorld {
    #[must_use]
    pub fn new() -> FixedStepWorld {
        FixedStepWorld::default()
    }
}

impl DynamicsWorld for FixedStepWorld {
    fn step_simulation(
        &mut self,
        dt: f64,
        max_substeps: u32,
        fixed_step: f64,
        tick: &mut dyn FnMut(&mut dyn DynamicsWorld, f64),
    ) -> u32 {
        if fixed_step <= 0.0 || !dt.is_finite() {
            return 0;
        }
        self.accumulator += dt;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let possible = (self.accumulator / fixed_step) as u32;
        let steps = possible.min(max_substeps);
        // Whole sub-steps leave the accumulator whether or not the cap lets them run;
        // capped-out time is dropped, not banked.
        self.accumulator -= f64::from(possible) * fixed_step;

        for _ in 0..steps {
            tick(&mut *self, fixed_step);
            self.sim_time += fixed_step;
        }
        steps
    }

    fn sim_time(&self) -> f64 {
        self.sim_time
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
    use assert_approx_eq::assert_approx_eq;

    use super::*;

    const STEP: f64 = 1.0 / 30.0;

    #[test]
    fn performs_whole_substeps_only() {
        let mut world = FixedStepWorld::new();
        let mut ticks = Vec::new();
        let steps = world.step_simulation(3.5 * STEP, 8, STEP, &mut |_, pdt| ticks.push(pdt));

        assert_eq!(steps, 3);
        assert_eq!(ticks, vec![STEP, STEP, STEP]);
        assert_approx_eq!(world.sim_time(), 3.0 * STEP);
    }

    #[test]
    fn substep_cap_dilates_time() {
        let mut world = FixedStepWorld::new();
        let steps = world.step_simulation(3.5 * STEP, 2, STEP, &mut |_, _| {});

        assert_eq!(steps, 2);
        // The capped-out sub-step is dropped entirely, so the next ordinary frame
        // does not inherit a backlog.
        assert_approx_eq!(world.sim_time(), 2.0 * STEP);
        let steps = world.step_simulation(STEP, 2, STEP, &mut |_, _| {});
        assert_eq!(steps, 1);
        assert_approx_eq!(world.sim_time(), 3.0 * STEP);
    }

    #[test]
    fn fractional_time_accumulates_across_calls() {
        let mut world = FixedStepWorld::new();
        assert_eq!(world.step_simulation(0.6 * STEP, 4, STEP, &mut |_, _| {}), 0);
        // The leftover 0.6 sub-steps combine with the next frame's 0.6.
        assert_eq!(world.step_simulation(0.6 * STEP, 4, STEP, &mut |_, _| {}), 1);
        assert_approx_eq!(world.sim_time(), STEP);
    }

    #[test]
    fn zero_dt_performs_no_substeps() {
        let mut world = FixedStepWorld::new();
        let mut ticked = false;
        let steps = world.step_simulation(0.0, 4, STEP, &mut |_, _| ticked = true);
        assert_eq!(steps, 0);
        assert!(!ticked);
        assert_approx_eq!(world.sim_time(), 0.0);
    }

    #[test]
    fn step_settings_deserialize_with_defaults() {
        let settings: StepSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, StepSettings::default());

        let settings: StepSettings =
            serde_json::from_str(r#"{ "fixed_timestep": 0.02, "max_substeps": 4 }"#).unwrap();
        assert_approx_eq!(settings.fixed_timestep, 0.02);
        assert_eq!(settings.max_substeps, 4);
    }
}
