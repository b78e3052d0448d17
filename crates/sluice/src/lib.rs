//! Sluice: a pull-based step interface over callback-driven building-energy
//! simulations.
//!
//! This is the top-level facade crate that re-exports the public API of the
//! Sluice sub-crates. For most users, adding `sluice` as a single dependency
//! is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use sluice::prelude::*;
//! use sluice_test_utils::{EngineScript, ScriptedFactory};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let model = dir.path().join("model.idf");
//! let weather = dir.path().join("weather.epw");
//! std::fs::write(&model, "Version,24.1;").unwrap();
//! std::fs::write(&weather, "LOCATION").unwrap();
//!
//! let mut config = BridgeConfig::new(&model, &weather, dir.path().join("out"));
//! config.points = config.points.with_zones(["Core_bottom", "Core_mid", "Core_top"]);
//!
//! let env = StepInterface::new(config, ScriptedFactory::new(EngineScript::run_period(3)));
//! let obs = env.reset().unwrap();
//! assert_eq!(obs.step, 1);
//!
//! let out = env.step(Some(Action::uniform(24.0, 21.0))).unwrap();
//! assert_eq!(out.observation.step, 2);
//! assert!(!out.done);
//!
//! let report = env.close();
//! assert!(report.joined);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `sluice-core` | Handles, actions, observations, engine traits |
//! | [`bridge`] | `sluice-bridge` | Step interface, gate, driver, config |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and engine traits (`sluice-core`).
///
/// Contains [`types::Action`], [`types::Observation`], the handle table and
/// the [`types::Engine`] / [`types::Exchange`] seam a real engine binding
/// implements.
pub use sluice_core as types;

/// The bridge itself (`sluice-bridge`).
///
/// [`bridge::StepInterface`] is the entry point; [`bridge::BridgeConfig`]
/// configures it and [`bridge::run_episode`] drives a closed loop.
pub use sluice_bridge as bridge;

/// Common imports for typical Sluice usage.
///
/// ```rust
/// use sluice::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use sluice_core::{
        Action, Controller, ControllerState, Engine, EngineFactory, EngineFault, Exchange,
        Observation, Reward, RunArgs, Setpoints, TimestepCallback,
    };

    // Bridge
    pub use sluice_bridge::{
        BridgeConfig, BridgeError, CloseReport, FixedSetpoints, ResolutionPolicy, RunOutcome,
        StepInfo, StepInterface, StepOutcome, Termination,
    };

    // Episodes
    pub use sluice_bridge::{export_csv, run_episode, EpisodeOptions, EpisodeSummary};
}
