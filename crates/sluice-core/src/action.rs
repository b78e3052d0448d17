//! Actions sent by the consumer back to the timestep gate.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Cooling/heating setpoint pair. An unset side leaves that actuator unchanged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Setpoints {
    /// Cooling setpoint (°C).
    pub cooling: Option<f64>,
    /// Heating setpoint (°C).
    pub heating: Option<f64>,
}

impl Setpoints {
    /// Both setpoints set.
    pub fn new(cooling: f64, heating: f64) -> Self {
        Self {
            cooling: Some(cooling),
            heating: Some(heating),
        }
    }

    /// Only the cooling setpoint set.
    pub fn cooling(value: f64) -> Self {
        Self {
            cooling: Some(value),
            heating: None,
        }
    }

    /// Only the heating setpoint set.
    pub fn heating(value: f64) -> Self {
        Self {
            cooling: None,
            heating: Some(value),
        }
    }

    /// Whether neither setpoint is set.
    pub fn is_empty(&self) -> bool {
        self.cooling.is_none() && self.heating.is_none()
    }
}

/// Instruction for one timestep.
///
/// The closed set of variants replaces free-form option maps: every field
/// that can be honored is named here, and nothing else is.
///
/// # Examples
///
/// ```
/// use sluice_core::{Action, Setpoints};
///
/// let all_zones = Action::uniform(24.0, 21.0);
/// let one_zone = Action::per_entity([("Core_mid", Setpoints::cooling(25.0))]);
///
/// assert!(!all_zones.is_noop());
/// assert!(matches!(one_zone, Action::PerEntity(ref m) if m.len() == 1));
/// assert!(Action::default().is_noop());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "setpoints", rename_all = "snake_case")]
pub enum Action {
    /// Ask the engine to stop the run.
    Stop,
    /// Apply the same setpoints to every resolved zone.
    Uniform(Setpoints),
    /// Apply setpoints zone by zone. Unresolved zones are ignored.
    PerEntity(IndexMap<String, Setpoints>),
    /// Leave every actuator unchanged.
    #[default]
    Noop,
}

impl Action {
    /// Uniform action with both setpoints set.
    pub fn uniform(cooling: f64, heating: f64) -> Self {
        Self::Uniform(Setpoints::new(cooling, heating))
    }

    /// Per-entity action from `(entity, setpoints)` pairs.
    pub fn per_entity<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Setpoints)>,
    {
        Self::PerEntity(entries.into_iter().map(|(k, s)| (k.into(), s)).collect())
    }

    /// Whether this is the stop sentinel.
    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stop)
    }

    /// Variant name as used in serialized form.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Uniform(_) => "uniform",
            Self::PerEntity(_) => "per_entity",
            Self::Noop => "noop",
        }
    }

    /// Whether applying this action writes nothing.
    pub fn is_noop(&self) -> bool {
        match self {
            Self::Noop => true,
            Self::Uniform(s) => s.is_empty(),
            Self::PerEntity(m) => m.values().all(Setpoints::is_empty),
            Self::Stop => false,
        }
    }
}

impl From<Option<Action>> for Action {
    fn from(action: Option<Action>) -> Self {
        action.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_action_is_noop() {
        assert_eq!(Action::from(None), Action::Noop);
        assert_eq!(Action::from(Some(Action::Stop)), Action::Stop);
    }

    #[test]
    fn empty_setpoints_are_noop() {
        assert!(Action::Uniform(Setpoints::default()).is_noop());
        assert!(Action::per_entity([("a", Setpoints::default())]).is_noop());
        assert!(!Action::per_entity([("a", Setpoints::heating(20.0))]).is_noop());
        assert!(!Action::Stop.is_noop());
    }

    #[test]
    fn kind_matches_serde_tag() {
        assert_eq!(Action::uniform(24.0, 21.0).kind(), "uniform");
        assert_eq!(Action::per_entity([("a", Setpoints::cooling(25.0))]).kind(), "per_entity");
        assert_eq!(Action::Noop.kind(), "noop");
    }
}
