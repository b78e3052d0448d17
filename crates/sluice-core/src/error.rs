//! Engine-side error type.
//!
//! Bridge errors (validation, lifecycle) live in `sluice-bridge`; this crate
//! only defines what an engine binding can report.

/// A failure reported by an engine binding.
///
/// Returned by [`Engine::run`](crate::Engine::run) when the engine raises
/// during a run, and by [`EngineFactory::create`](crate::EngineFactory::create)
/// when a fresh engine state cannot be constructed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("engine fault: {reason}")]
pub struct EngineFault {
    /// Human-readable description of the failure.
    pub reason: String,
}

impl EngineFault {
    /// Build a fault from any displayable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
