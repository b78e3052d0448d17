//! Observation snapshots published by the timestep gate.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Simulation clock at the timestep an [`Observation`] was taken.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimClock {
    /// Calendar year reported by the engine.
    pub year: i32,
    /// Month, 1-12.
    pub month: u8,
    /// Day of month, 1-31.
    pub day: u8,
    /// Hour of day, 0-24.
    pub hour: u8,
    /// Minute within the hour.
    pub minute: u8,
}

/// Immutable snapshot of one run-period timestep.
///
/// All readings are copied out of the engine while the callback runs, so an
/// `Observation` never refers to engine-owned memory and stays valid after
/// the engine moves on.
///
/// Map equality ignores insertion order.
///
/// # Examples
///
/// ```
/// use sluice_core::Observation;
///
/// let mut obs = Observation::default();
/// obs.readings.insert("total_power".into(), 120_000.0);
/// obs.zones.insert("Core_mid".into(), 22.5);
///
/// assert_eq!(obs.reading("total_power"), Some(120_000.0));
/// assert_eq!(obs.zone("Core_mid"), Some(22.5));
/// assert_eq!(obs.zone("Core_top"), None);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Run-period step counter, starting at 1 for the first observation of a run.
    pub step: u64,
    /// Simulation clock.
    pub clock: SimClock,
    /// Named scalar sensor readings (e.g. `outdoor_temp`, `total_power`).
    pub readings: IndexMap<String, f64>,
    /// Per-zone readings keyed by zone name.
    pub zones: IndexMap<String, f64>,
}

impl Observation {
    /// A named scalar reading, if it was resolved for this run.
    pub fn reading(&self, name: &str) -> Option<f64> {
        self.readings.get(name).copied()
    }

    /// A zone reading, if the zone was resolved for this run.
    pub fn zone(&self, zone: &str) -> Option<f64> {
        self.zones.get(zone).copied()
    }

    /// Mean over all zone readings; `None` when no zone was resolved.
    pub fn mean_zone_reading(&self) -> Option<f64> {
        if self.zones.is_empty() {
            return None;
        }
        Some(self.zones.values().sum::<f64>() / self.zones.len() as f64)
    }
}
