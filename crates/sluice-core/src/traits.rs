//! Traits implemented by engine bindings and by external collaborators.
//!
//! The engine side mirrors a callback-driven runtime: [`Engine::run`] owns
//! the simulation loop and calls a [`TimestepCallback`] inline at the end of
//! every zone timestep, handing it an [`Exchange`] to query and steer the
//! live simulation state.

use std::ffi::OsString;
use std::path::PathBuf;

use crate::action::Action;
use crate::error::EngineFault;
use crate::id::Handle;
use crate::observation::{Observation, SimClock};
use crate::phase::SimulationKind;

/// Live data-exchange surface of a running engine.
///
/// Only valid for the duration of a single callback. Lookups return `None`
/// when the engine does not know the requested point.
pub trait Exchange {
    /// Whether the engine is in a warm-up pass.
    fn warmup_flag(&self) -> bool;

    /// What the engine is currently simulating.
    fn kind_of_sim(&self) -> SimulationKind;

    /// Current simulation clock.
    fn clock(&self) -> SimClock;

    /// Handle of an output variable for a given key (zone, `"Environment"`, ...).
    fn variable_handle(&self, variable: &str, key: &str) -> Option<Handle>;

    /// Handle of a meter.
    fn meter_handle(&self, meter: &str) -> Option<Handle>;

    /// Handle of an actuator.
    fn actuator_handle(&self, component_type: &str, control_type: &str, key: &str)
        -> Option<Handle>;

    /// Current value of a variable.
    fn variable_value(&self, handle: Handle) -> f64;

    /// Current value of a meter.
    fn meter_value(&self, handle: Handle) -> f64;

    /// Override an actuator for the coming timestep.
    fn set_actuator_value(&mut self, handle: Handle, value: f64);

    /// Ask the engine to end the run after the current callback returns.
    fn stop_simulation(&mut self);
}

/// Per-timestep callback registered with an engine.
pub trait TimestepCallback {
    /// Invoked synchronously on the engine's own thread.
    fn on_timestep(&mut self, exchange: &mut dyn Exchange);
}

/// Arguments for a single engine run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunArgs {
    /// Model definition file.
    pub model: PathBuf,
    /// Weather data file.
    pub weather: PathBuf,
    /// Directory the engine writes its outputs into.
    pub output_dir: PathBuf,
}

impl RunArgs {
    /// Command-line form understood by the engine runtime:
    /// `-w <weather> -d <output_dir> <model>`.
    pub fn cli_args(&self) -> Vec<OsString> {
        vec![
            "-w".into(),
            self.weather.clone().into_os_string(),
            "-d".into(),
            self.output_dir.clone().into_os_string(),
            self.model.clone().into_os_string(),
        ]
    }
}

/// A simulation engine that can execute one run.
///
/// `run` blocks for the whole simulation and invokes `callback` inline.
/// Implementations must be [`Send`]: the bridge moves the engine onto a
/// dedicated driver thread.
pub trait Engine: Send {
    /// Execute a full run and return the engine's exit code.
    ///
    /// # Errors
    ///
    /// Returns [`EngineFault`] if the engine raises during the run.
    fn run(&mut self, args: &RunArgs, callback: &mut dyn TimestepCallback)
        -> Result<i32, EngineFault>;
}

/// Builds a fresh engine state for every run.
///
/// Implemented for closures returning `Result<Box<dyn Engine>, EngineFault>`.
pub trait EngineFactory: Send + Sync {
    /// Construct a new, unstarted engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineFault`] if the engine state cannot be created.
    fn create(&self) -> Result<Box<dyn Engine>, EngineFault>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> Result<Box<dyn Engine>, EngineFault> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn Engine>, EngineFault> {
        self()
    }
}

/// External control policy: turns an observation into the next action.
pub trait Controller {
    /// Decide the action for the timestep following `observation`.
    fn act(&mut self, observation: &Observation) -> Action;
}

impl<F> Controller for F
where
    F: FnMut(&Observation) -> Action,
{
    fn act(&mut self, observation: &Observation) -> Action {
        self(observation)
    }
}

/// Scalar reward derived from an observation. The mapping is owned by the caller.
pub trait Reward: Send + Sync {
    /// Reward for reaching `observation`.
    fn reward(&self, observation: &Observation) -> f64;
}

impl<F> Reward for F
where
    F: Fn(&Observation) -> f64 + Send + Sync,
{
    fn reward(&self, observation: &Observation) -> f64 {
        self(observation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_args_order() {
        let args = RunArgs {
            model: "m.idf".into(),
            weather: "w.epw".into(),
            output_dir: "out".into(),
        };
        let rendered: Vec<String> = args
            .cli_args()
            .into_iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect();
        assert_eq!(rendered, ["-w", "w.epw", "-d", "out", "m.idf"]);
    }

    #[test]
    fn closures_are_controllers_and_rewards() {
        let mut controller = |obs: &Observation| {
            if obs.step > 1 {
                Action::Stop
            } else {
                Action::Noop
            }
        };
        let reward = |obs: &Observation| -(obs.step as f64);

        let mut obs = Observation::default();
        obs.step = 2;
        assert_eq!(controller.act(&obs), Action::Stop);
        assert_eq!(Reward::reward(&reward, &obs), -2.0);
    }
}
