//! Pull-based step bridge over callback-driven simulation engines.
//!
//! A callback-driven engine owns its simulation loop and calls back into
//! user code once per timestep. [`StepInterface`] inverts that into
//! `reset()` / `step(action)` / `close()`: the engine runs on a dedicated
//! driver thread, and a [`TimestepGate`] registered as its callback hands
//! each run-period observation to the consumer over a capacity-1
//! rendezvous and blocks for the answering action.
//!
//! # Example
//!
//! ```no_run
//! use sluice_bridge::{BridgeConfig, FixedSetpoints, StepInterface};
//! use sluice_core::{Controller, Engine, EngineFault};
//!
//! # fn engine() -> Result<Box<dyn Engine>, EngineFault> { unimplemented!() }
//! let config = BridgeConfig::new("model.idf", "weather.epw", "outputs/run");
//! let env = StepInterface::new(config, engine);
//! let mut controller = FixedSetpoints::default();
//!
//! let mut obs = env.reset()?;
//! loop {
//!     let out = env.step(Some(controller.act(&obs)))?;
//!     if out.done {
//!         break;
//!     }
//!     obs = out.observation;
//! }
//! env.close();
//! # Ok::<(), sluice_bridge::BridgeError>(())
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod controller;
pub mod driver;
pub mod episode;
pub mod error;
pub mod export;
pub mod gate;
pub mod interface;
pub mod metrics;
pub mod registry;
pub mod rendezvous;
pub mod reward;
pub mod state;

pub use config::{BridgeConfig, PointMap, ResolutionPolicy, SensorPoint, SensorSource};
pub use controller::FixedSetpoints;
pub use driver::{RunOutcome, SimulationDriver};
pub use episode::{run_episode, EpisodeOptions, EpisodeSummary, StepRecord};
pub use error::{BridgeError, ConfigError};
pub use export::{export_csv, write_csv};
pub use gate::{GateEvent, TimestepGate};
pub use interface::{CloseReport, StepInfo, StepInterface, StepOutcome, Termination};
pub use metrics::{BridgeMetrics, MetricsSnapshot};
pub use registry::{HandleRegistry, PointRequest, Resolution};
pub use reward::ScaledReading;
