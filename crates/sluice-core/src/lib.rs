//! Core types and traits for the Sluice step bridge.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! value types that cross the engine/consumer boundary ([`Observation`],
//! [`Action`]), the typed handle table, the simulation phase and controller
//! state enums, and the traits an engine binding implements.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod action;
pub mod error;
pub mod id;
pub mod observation;
pub mod phase;
pub mod space;
pub mod traits;

pub use action::{Action, Setpoints};
pub use error::EngineFault;
pub use id::{Handle, HandleCategory, HandleKey, HandleTable};
pub use observation::{Observation, SimClock};
pub use phase::{ControllerState, SimulationKind, SimulationPhase};
pub use space::FieldDescriptor;
pub use traits::{Controller, Engine, EngineFactory, Exchange, Reward, RunArgs, TimestepCallback};
