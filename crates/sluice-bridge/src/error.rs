//! Error types returned by the bridge.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use sluice_core::EngineFault;

use crate::driver::RunOutcome;

// ── ConfigError ──────────────────────────────────────────────────

/// Errors loading or validating a [`BridgeConfig`](crate::BridgeConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The config text is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A field value violates an invariant.
    #[error("{field}: {reason}")]
    Invalid {
        /// Offending field, dotted path.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

// ── BridgeError ──────────────────────────────────────────────────

/// Errors returned by [`StepInterface`](crate::StepInterface) operations.
///
/// Validation variants are returned before any thread is started.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The model input does not exist.
    #[error("model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),
    /// The weather input does not exist.
    #[error("weather file not found: {}", .0.display())]
    WeatherNotFound(PathBuf),
    /// The output directory could not be created.
    #[error("cannot create output directory {}: {source}", path.display())]
    OutputDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Another `step()` call is still waiting on the engine.
    #[error("step() called while another step is in flight")]
    StepInFlight,
    /// `step()` was called before the first `reset()`.
    #[error("no run in progress; call reset() first")]
    NotStarted,
    /// The run finished without producing a single run-period observation.
    #[error("simulation ended before the first observation: {0}")]
    EndedBeforeFirstObservation(RunOutcome),
    /// `close()` ran while `reset()` was waiting for the first observation.
    #[error("closed while waiting for the first observation")]
    Closed,
    /// No first observation arrived within the configured bound.
    #[error("no first observation within {0:?}")]
    ResetTimeout(Duration),
    /// The driver thread could not be spawned.
    #[error("failed to spawn driver thread: {0}")]
    ThreadSpawn(#[source] io::Error),
    /// The engine factory failed to build a fresh engine.
    #[error(transparent)]
    Engine(#[from] EngineFault),
}
