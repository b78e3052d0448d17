//! Default reward.

use sluice_core::{Observation, Reward};

/// Negative scaled value of one scalar reading.
///
/// The default reads `total_power` with scale `1e-6`, so a facility
/// drawing 120 kW earns `-0.12`. A missing reading yields `0.0`.
#[derive(Clone, Debug, PartialEq)]
pub struct ScaledReading {
    /// Reading to penalize.
    pub reading: String,
    /// Multiplier applied before negation.
    pub scale: f64,
}

impl ScaledReading {
    /// Penalize `reading` scaled by `scale`.
    pub fn new(reading: impl Into<String>, scale: f64) -> Self {
        Self {
            reading: reading.into(),
            scale,
        }
    }
}

impl Default for ScaledReading {
    fn default() -> Self {
        Self::new("total_power", 1e-6)
    }
}

impl Reward for ScaledReading {
    fn reward(&self, observation: &Observation) -> f64 {
        observation
            .reading(&self.reading)
            .map_or(0.0, |v| -v * self.scale)
    }
}
