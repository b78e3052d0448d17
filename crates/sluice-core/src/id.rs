//! Engine handles and the typed `(category, entity)` handle table.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Opaque handle issued by the engine for a sensor, meter, or actuator.
///
/// Engines report a failed lookup with a non-positive integer; such values
/// never become a `Handle` (see [`Handle::from_raw`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle(pub i32);

impl Handle {
    /// Convert a raw engine handle, rejecting the engine's "not found" values.
    pub fn from_raw(raw: i32) -> Option<Self> {
        (raw > 0).then_some(Self(raw))
    }

    /// The raw integer the engine issued.
    pub fn raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a resolved handle refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleCategory {
    /// A named scalar reading (variable or meter), e.g. outdoor temperature.
    Sensor,
    /// A per-zone reading, reported in [`Observation::zones`](crate::Observation).
    ZoneSensor,
    /// A per-zone cooling setpoint actuator.
    CoolingSetpoint,
    /// A per-zone heating setpoint actuator.
    HeatingSetpoint,
}

impl HandleCategory {
    /// Whether handles of this category are written rather than read.
    pub fn is_actuator(self) -> bool {
        matches!(self, Self::CoolingSetpoint | Self::HeatingSetpoint)
    }
}

impl fmt::Display for HandleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sensor => "sensor",
            Self::ZoneSensor => "zone_sensor",
            Self::CoolingSetpoint => "cooling_setpoint",
            Self::HeatingSetpoint => "heating_setpoint",
        };
        f.write_str(name)
    }
}

/// Lookup key of the [`HandleTable`]: a category plus a logical entity name.
///
/// For sensors the entity is the reading label (`"outdoor_temp"`); for
/// zone sensors and actuators it is the zone name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleKey {
    /// What the handle refers to.
    pub category: HandleCategory,
    /// Logical entity name.
    pub entity: String,
}

impl HandleKey {
    /// Build a key from its parts.
    pub fn new(category: HandleCategory, entity: impl Into<String>) -> Self {
        Self {
            category,
            entity: entity.into(),
        }
    }

    /// Key for a named scalar sensor.
    pub fn sensor(label: impl Into<String>) -> Self {
        Self::new(HandleCategory::Sensor, label)
    }

    /// Key for a zone reading.
    pub fn zone(zone: impl Into<String>) -> Self {
        Self::new(HandleCategory::ZoneSensor, zone)
    }

    /// Key for a zone's cooling setpoint actuator.
    pub fn cooling(zone: impl Into<String>) -> Self {
        Self::new(HandleCategory::CoolingSetpoint, zone)
    }

    /// Key for a zone's heating setpoint actuator.
    pub fn heating(zone: impl Into<String>) -> Self {
        Self::new(HandleCategory::HeatingSetpoint, zone)
    }
}

impl fmt::Display for HandleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.entity)
    }
}

/// Resolved handles keyed by `(category, entity)`.
///
/// Built once per run by the handle registry and read-only afterwards.
/// Entities whose resolution failed are simply absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HandleTable {
    entries: IndexMap<HandleKey, Handle>,
}

impl HandleTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resolved handle. Returns the previous handle for the key, if any.
    pub fn insert(&mut self, key: HandleKey, handle: Handle) -> Option<Handle> {
        self.entries.insert(key, handle)
    }

    /// Look up a handle by key.
    pub fn get(&self, key: &HandleKey) -> Option<Handle> {
        self.entries.get(key).copied()
    }

    /// Look up a handle by category and entity name.
    pub fn lookup(&self, category: HandleCategory, entity: &str) -> Option<Handle> {
        self.entries
            .iter()
            .find(|(k, _)| k.category == category && k.entity == entity)
            .map(|(_, h)| *h)
    }

    /// Whether a handle was resolved for `key`.
    pub fn contains(&self, key: &HandleKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of resolved handles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no handle was resolved.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = (&HandleKey, Handle)> {
        self.entries.iter().map(|(k, h)| (k, *h))
    }

    /// Entities and handles of one category, in resolution order.
    pub fn entities(&self, category: HandleCategory) -> impl Iterator<Item = (&str, Handle)> {
        self.entries
            .iter()
            .filter(move |(k, _)| k.category == category)
            .map(|(k, h)| (k.entity.as_str(), *h))
    }
}

impl FromIterator<(HandleKey, Handle)> for HandleTable {
    fn from_iter<I: IntoIterator<Item = (HandleKey, Handle)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
