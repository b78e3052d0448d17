//! Descriptive (not enforced) contracts for observation and action fields.

use serde::Serialize;

/// One recognized field of an observation or action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    /// Field name as it appears in the value.
    pub name: String,
    /// Value type, e.g. `"int"`, `"float"`, `"map<zone, float>"`.
    pub kind: &'static str,
    /// Human-readable description.
    pub description: String,
}

impl FieldDescriptor {
    /// Build a descriptor.
    pub fn new(name: impl Into<String>, kind: &'static str, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
        }
    }
}

/// Clock and step-counter fields present on every observation.
pub fn clock_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new("step", "int", "run-period step counter, 1-based"),
        FieldDescriptor::new("year", "int", "simulation year"),
        FieldDescriptor::new("month", "int", "simulation month, 1-12"),
        FieldDescriptor::new("day", "int", "day of month"),
        FieldDescriptor::new("hour", "int", "hour of day"),
        FieldDescriptor::new("minute", "int", "minute within the hour"),
    ]
}

/// Fields of the recognized action variants.
pub fn action_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new(
            "uniform.cooling",
            "float?",
            "cooling setpoint for all zones (°C)",
        ),
        FieldDescriptor::new(
            "uniform.heating",
            "float?",
            "heating setpoint for all zones (°C)",
        ),
        FieldDescriptor::new(
            "per_entity",
            "map<zone, {cooling?, heating?}>",
            "per-zone setpoints (°C); unresolved zones are ignored",
        ),
        FieldDescriptor::new("stop", "sentinel", "stop the simulation run"),
        FieldDescriptor::new("noop", "sentinel", "leave all actuators unchanged"),
    ]
}
