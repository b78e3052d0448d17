//! One-shot resolution of logical points to engine handles.
//!
//! The engine only issues handles once its data exchange is live, which is
//! first guaranteed inside a run-period callback. [`HandleRegistry`] defers
//! all lookups until then and stores the result in a write-once cell shared
//! with the consumer side.

use std::sync::{Arc, OnceLock};

use sluice_core::{Exchange, Handle, HandleCategory, HandleKey, HandleTable};
use tracing::{info, warn};

use crate::config::{PointMap, SensorSource};

/// The engine lookup that fills one [`HandleTable`] entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineQuery {
    /// Output variable lookup.
    Variable {
        /// Variable name.
        variable: String,
        /// Variable key.
        key: String,
    },
    /// Meter lookup.
    Meter {
        /// Meter name.
        meter: String,
    },
    /// Actuator lookup.
    Actuator {
        /// Component type.
        component_type: String,
        /// Control type.
        control_type: String,
        /// Actuator key (zone name).
        key: String,
    },
}

impl EngineQuery {
    fn run(&self, exchange: &dyn Exchange) -> Option<Handle> {
        match self {
            Self::Variable { variable, key } => exchange.variable_handle(variable, key),
            Self::Meter { meter } => exchange.meter_handle(meter),
            Self::Actuator {
                component_type,
                control_type,
                key,
            } => exchange.actuator_handle(component_type, control_type, key),
        }
    }
}

/// A table key and the lookup that resolves it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointRequest {
    /// Where the handle is stored.
    pub key: HandleKey,
    /// How the handle is obtained.
    pub query: EngineQuery,
}

impl PointRequest {
    /// Expand a [`PointMap`] into requests: sensors first, then per zone the
    /// zone reading and both setpoint actuators.
    pub fn from_point_map(points: &PointMap) -> Vec<Self> {
        let mut requests = Vec::with_capacity(points.sensors.len() + points.zones.len() * 3);
        for sensor in &points.sensors {
            let query = match &sensor.source {
                SensorSource::Variable { variable, key } => EngineQuery::Variable {
                    variable: variable.clone(),
                    key: key.clone(),
                },
                SensorSource::Meter { meter } => EngineQuery::Meter {
                    meter: meter.clone(),
                },
            };
            requests.push(Self {
                key: HandleKey::sensor(&sensor.label),
                query,
            });
        }
        for zone in &points.zones {
            requests.push(Self {
                key: HandleKey::zone(zone),
                query: EngineQuery::Variable {
                    variable: points.zone_variable.clone(),
                    key: zone.clone(),
                },
            });
            for (key, control) in [
                (HandleKey::cooling(zone), &points.cooling_control),
                (HandleKey::heating(zone), &points.heating_control),
            ] {
                requests.push(Self {
                    key,
                    query: EngineQuery::Actuator {
                        component_type: points.actuator_component.clone(),
                        control_type: control.clone(),
                        key: zone.clone(),
                    },
                });
            }
        }
        requests
    }
}

/// Outcome of handle resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Resolved handles.
    pub table: HandleTable,
    /// Requested keys that did not resolve, in request order.
    pub missing: Vec<HandleKey>,
}

/// Resolves point requests at most once per run.
///
/// A zone is only controllable when both its cooling and heating actuators
/// resolve; a zone with just one of them loses both and both are reported
/// missing.
#[derive(Debug)]
pub struct HandleRegistry {
    requests: Vec<PointRequest>,
    resolved: Arc<OnceLock<Resolution>>,
}

impl HandleRegistry {
    /// Registry for the given requests with an empty, unshared cell.
    pub fn new(requests: Vec<PointRequest>) -> Self {
        Self {
            requests,
            resolved: Arc::new(OnceLock::new()),
        }
    }

    /// Registry for every point of `points`.
    pub fn for_points(points: &PointMap) -> Self {
        Self::new(PointRequest::from_point_map(points))
    }

    /// Requests in resolution order.
    pub fn requests(&self) -> &[PointRequest] {
        &self.requests
    }

    /// Shared handle to the write-once result, for readers on other threads.
    pub fn shared(&self) -> Arc<OnceLock<Resolution>> {
        Arc::clone(&self.resolved)
    }

    /// Whether resolution already happened.
    pub fn is_initialized(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// Resolve every request against `exchange`, or return the existing
    /// result without querying the engine again.
    pub fn resolve(&self, exchange: &dyn Exchange) -> &Resolution {
        self.resolved.get_or_init(|| self.resolve_now(exchange))
    }

    fn resolve_now(&self, exchange: &dyn Exchange) -> Resolution {
        let mut table = HandleTable::new();
        let mut missing = Vec::new();
        for request in &self.requests {
            match request.query.run(exchange) {
                Some(handle) => {
                    table.insert(request.key.clone(), handle);
                }
                None => missing.push(request.key.clone()),
            }
        }

        // Half-resolved actuator pairs are dropped.
        let orphans: Vec<HandleKey> = table
            .iter()
            .filter_map(|(key, _)| {
                let companion = match key.category {
                    HandleCategory::CoolingSetpoint => HandleCategory::HeatingSetpoint,
                    HandleCategory::HeatingSetpoint => HandleCategory::CoolingSetpoint,
                    _ => return None,
                };
                let companion = HandleKey::new(companion, key.entity.clone());
                (!table.contains(&companion)).then(|| key.clone())
            })
            .collect();
        if !orphans.is_empty() {
            table = table
                .iter()
                .filter(|(key, _)| !orphans.contains(key))
                .map(|(key, handle)| (key.clone(), handle))
                .collect();
            missing.extend(orphans);
        }

        for key in &missing {
            warn!(point = %key, "handle not resolved");
        }
        info!(
            resolved = table.len(),
            missing = missing.len(),
            "handle table initialized"
        );
        Resolution { table, missing }
    }
}
