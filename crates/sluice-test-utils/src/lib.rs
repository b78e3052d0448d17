//! Test utilities and fixture engines for Sluice development.
//!
//! Provides [`MockExchange`], an in-memory implementation of the engine
//! [`Exchange`] surface, and (in [`fixtures`]) a scripted engine that drives
//! a callback through warm-up, sizing and run-period timesteps.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{EngineRecorder, EngineScript, ScriptedEngine, ScriptedFactory};

use std::cell::Cell;
use std::collections::HashMap;

use sluice_core::{Exchange, Handle, SimClock, SimulationKind};

/// Variable queried for zone readings by the default point map.
pub const ZONE_TEMPERATURE: &str = "Zone Mean Air Temperature";
/// Variable behind the default `outdoor_temp` sensor.
pub const OUTDOOR_TEMPERATURE: &str = "Site Outdoor Air Drybulb Temperature";
/// Key of site-level variables.
pub const ENVIRONMENT: &str = "Environment";
/// Meter behind the default `total_power` sensor.
pub const FACILITY_ELECTRICITY: &str = "Electricity:Facility";
/// Component type of the default setpoint actuators.
pub const ZONE_TEMPERATURE_CONTROL: &str = "Zone Temperature Control";
/// Control type of the default cooling actuator.
pub const COOLING_SETPOINT: &str = "Cooling Setpoint";
/// Control type of the default heating actuator.
pub const HEATING_SETPOINT: &str = "Heating Setpoint";

/// In-memory [`Exchange`].
///
/// Register points with the `with_*` builders, then hand it to code under
/// test. Handles are allocated sequentially from 1. Every handle lookup is
/// counted so tests can assert that resolution happened at most once.
pub struct MockExchange {
    pub warmup: bool,
    pub kind: SimulationKind,
    pub clock: SimClock,
    next_handle: i32,
    variables: HashMap<(String, String), Handle>,
    meters: HashMap<String, Handle>,
    actuators: HashMap<(String, String, String), Handle>,
    values: HashMap<Handle, f64>,
    writes: Vec<(Handle, f64)>,
    stop_requests: u32,
    queries: Cell<u32>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            warmup: false,
            kind: SimulationKind::RunPeriod,
            clock: SimClock::default(),
            next_handle: 1,
            variables: HashMap::new(),
            meters: HashMap::new(),
            actuators: HashMap::new(),
            values: HashMap::new(),
            writes: Vec::new(),
            stop_requests: 0,
            queries: Cell::new(0),
        }
    }

    fn allocate(&mut self, value: f64) -> Handle {
        let handle = Handle(self.next_handle);
        self.next_handle += 1;
        self.values.insert(handle, value);
        handle
    }

    /// Register an output variable with an initial value.
    pub fn with_variable(mut self, variable: &str, key: &str, value: f64) -> Self {
        self.add_variable(variable, key, value);
        self
    }

    /// Register a meter with an initial value.
    pub fn with_meter(mut self, meter: &str, value: f64) -> Self {
        self.add_meter(meter, value);
        self
    }

    /// Register an actuator.
    pub fn with_actuator(mut self, component_type: &str, control_type: &str, key: &str) -> Self {
        self.add_actuator(component_type, control_type, key);
        self
    }

    pub fn add_variable(&mut self, variable: &str, key: &str, value: f64) -> Handle {
        let handle = self.allocate(value);
        self.variables
            .insert((variable.to_string(), key.to_string()), handle);
        handle
    }

    pub fn add_meter(&mut self, meter: &str, value: f64) -> Handle {
        let handle = self.allocate(value);
        self.meters.insert(meter.to_string(), handle);
        handle
    }

    pub fn add_actuator(&mut self, component_type: &str, control_type: &str, key: &str) -> Handle {
        let handle = self.allocate(0.0);
        self.actuators.insert(
            (
                component_type.to_string(),
                control_type.to_string(),
                key.to_string(),
            ),
            handle,
        );
        handle
    }

    /// Register a site sensor, a facility meter and one zone reading plus
    /// both setpoint actuators per zone, using the default point names.
    pub fn with_default_points(mut self, zones: &[&str]) -> Self {
        self.add_variable(OUTDOOR_TEMPERATURE, ENVIRONMENT, 10.0);
        self.add_meter(FACILITY_ELECTRICITY, 100_000.0);
        for zone in zones {
            self.add_variable(ZONE_TEMPERATURE, zone, 21.0);
            self.add_actuator(ZONE_TEMPERATURE_CONTROL, COOLING_SETPOINT, zone);
            self.add_actuator(ZONE_TEMPERATURE_CONTROL, HEATING_SETPOINT, zone);
        }
        self
    }

    /// Overwrite the value behind a variable. No-op for unknown points.
    pub fn set_variable(&mut self, variable: &str, key: &str, value: f64) {
        if let Some(h) = self
            .variables
            .get(&(variable.to_string(), key.to_string()))
        {
            self.values.insert(*h, value);
        }
    }

    /// Overwrite the value behind a meter. No-op for unknown meters.
    pub fn set_meter(&mut self, meter: &str, value: f64) {
        if let Some(h) = self.meters.get(meter) {
            self.values.insert(*h, value);
        }
    }

    /// Handle registered for an actuator, bypassing the query counter.
    pub fn actuator(&self, component_type: &str, control_type: &str, key: &str) -> Option<Handle> {
        self.actuators
            .get(&(
                component_type.to_string(),
                control_type.to_string(),
                key.to_string(),
            ))
            .copied()
    }

    /// Last value written to or registered for a handle.
    pub fn value(&self, handle: Handle) -> Option<f64> {
        self.values.get(&handle).copied()
    }

    /// Actuator writes recorded since the last [`take_writes`](Self::take_writes).
    pub fn writes(&self) -> &[(Handle, f64)] {
        &self.writes
    }

    /// Drain the recorded actuator writes.
    pub fn take_writes(&mut self) -> Vec<(Handle, f64)> {
        std::mem::take(&mut self.writes)
    }

    /// Number of `stop_simulation` calls.
    pub fn stop_requests(&self) -> u32 {
        self.stop_requests
    }

    /// Number of handle lookups performed so far.
    pub fn queries(&self) -> u32 {
        self.queries.get()
    }

    fn count_query(&self) {
        self.queries.set(self.queries.get() + 1);
    }
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl Exchange for MockExchange {
    fn warmup_flag(&self) -> bool {
        self.warmup
    }

    fn kind_of_sim(&self) -> SimulationKind {
        self.kind
    }

    fn clock(&self) -> SimClock {
        self.clock
    }

    fn variable_handle(&self, variable: &str, key: &str) -> Option<Handle> {
        self.count_query();
        self.variables
            .get(&(variable.to_string(), key.to_string()))
            .copied()
    }

    fn meter_handle(&self, meter: &str) -> Option<Handle> {
        self.count_query();
        self.meters.get(meter).copied()
    }

    fn actuator_handle(
        &self,
        component_type: &str,
        control_type: &str,
        key: &str,
    ) -> Option<Handle> {
        self.count_query();
        self.actuator(component_type, control_type, key)
    }

    fn variable_value(&self, handle: Handle) -> f64 {
        self.values.get(&handle).copied().unwrap_or(0.0)
    }

    fn meter_value(&self, handle: Handle) -> f64 {
        self.values.get(&handle).copied().unwrap_or(0.0)
    }

    fn set_actuator_value(&mut self, handle: Handle, value: f64) {
        self.values.insert(handle, value);
        self.writes.push((handle, value));
    }

    fn stop_simulation(&mut self) {
        self.stop_requests += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_sequential_and_counted() {
        let ex = MockExchange::new().with_default_points(&["a"]);
        assert_eq!(ex.queries(), 0);
        let oat = ex.variable_handle(OUTDOOR_TEMPERATURE, ENVIRONMENT);
        let power = ex.meter_handle(FACILITY_ELECTRICITY);
        assert_eq!(oat, Some(Handle(1)));
        assert_eq!(power, Some(Handle(2)));
        assert_eq!(ex.variable_handle(ZONE_TEMPERATURE, "missing"), None);
        assert_eq!(ex.queries(), 3);
    }

    #[test]
    fn writes_are_recorded_and_drained() {
        let mut ex = MockExchange::new().with_default_points(&["a"]);
        let h = ex
            .actuator(ZONE_TEMPERATURE_CONTROL, COOLING_SETPOINT, "a")
            .unwrap();
        ex.set_actuator_value(h, 24.0);
        assert_eq!(ex.writes(), &[(h, 24.0)]);
        assert_eq!(ex.value(h), Some(24.0));
        assert_eq!(ex.take_writes().len(), 1);
        assert!(ex.writes().is_empty());
    }
}
