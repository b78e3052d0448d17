//! Bridge configuration, point map and run-argument validation.
//!
//! [`BridgeConfig`] is a plain struct with defaults matching the reference
//! medium-office model. Load it from TOML with
//! [`from_toml_file`](BridgeConfig::from_toml_file) or build it in code;
//! [`validate()`](BridgeConfig::validate) checks structural invariants and
//! [`prepare_run()`](BridgeConfig::prepare_run) checks the input files right
//! before a run starts.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sluice_core::RunArgs;

use crate::error::{BridgeError, ConfigError};

/// Zones of the reference medium-office model.
pub const MEDIUM_OFFICE_ZONES: [&str; 15] = [
    "Core_bottom",
    "Core_mid",
    "Core_top",
    "Perimeter_bot_ZN_1",
    "Perimeter_bot_ZN_2",
    "Perimeter_bot_ZN_3",
    "Perimeter_bot_ZN_4",
    "Perimeter_mid_ZN_1",
    "Perimeter_mid_ZN_2",
    "Perimeter_mid_ZN_3",
    "Perimeter_mid_ZN_4",
    "Perimeter_top_ZN_1",
    "Perimeter_top_ZN_2",
    "Perimeter_top_ZN_3",
    "Perimeter_top_ZN_4",
];

// ── PointMap ─────────────────────────────────────────────────────

/// Where a named scalar sensor reads from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorSource {
    /// An output variable for a key (`"Environment"`, a zone name, ...).
    Variable {
        /// Variable name as the engine reports it.
        variable: String,
        /// Variable key.
        key: String,
    },
    /// A meter.
    Meter {
        /// Meter name as the engine reports it.
        meter: String,
    },
}

/// A named scalar sensor, reported in [`Observation::readings`](sluice_core::Observation).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensorPoint {
    /// Reading name in the observation.
    pub label: String,
    /// Engine point behind the reading.
    pub source: SensorSource,
}

impl SensorPoint {
    /// Sensor backed by an output variable.
    pub fn variable(label: impl Into<String>, variable: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            source: SensorSource::Variable {
                variable: variable.into(),
                key: key.into(),
            },
        }
    }

    /// Sensor backed by a meter.
    pub fn meter(label: impl Into<String>, meter: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            source: SensorSource::Meter {
                meter: meter.into(),
            },
        }
    }
}

/// Logical points the bridge resolves against the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PointMap {
    /// Named scalar sensors.
    pub sensors: Vec<SensorPoint>,
    /// Variable read once per zone.
    pub zone_variable: String,
    /// Component type of the setpoint actuators.
    pub actuator_component: String,
    /// Control type of the cooling actuator.
    pub cooling_control: String,
    /// Control type of the heating actuator.
    pub heating_control: String,
    /// Zones to observe and control.
    pub zones: Vec<String>,
}

impl Default for PointMap {
    fn default() -> Self {
        Self {
            sensors: vec![
                SensorPoint::variable(
                    "outdoor_temp",
                    "Site Outdoor Air Drybulb Temperature",
                    "Environment",
                ),
                SensorPoint::meter("total_power", "Electricity:Facility"),
            ],
            zone_variable: "Zone Mean Air Temperature".into(),
            actuator_component: "Zone Temperature Control".into(),
            cooling_control: "Cooling Setpoint".into(),
            heating_control: "Heating Setpoint".into(),
            zones: MEDIUM_OFFICE_ZONES.iter().map(|z| z.to_string()).collect(),
        }
    }
}

impl PointMap {
    /// Replace the zone list.
    pub fn with_zones<S: Into<String>>(mut self, zones: impl IntoIterator<Item = S>) -> Self {
        self.zones = zones.into_iter().map(Into::into).collect();
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut labels = HashSet::new();
        for sensor in &self.sensors {
            if sensor.label.is_empty() {
                return Err(ConfigError::Invalid {
                    field: "points.sensors",
                    reason: "sensor label must not be empty".into(),
                });
            }
            if !labels.insert(sensor.label.as_str()) {
                return Err(ConfigError::Invalid {
                    field: "points.sensors",
                    reason: format!("duplicate sensor label {:?}", sensor.label),
                });
            }
        }
        let mut zones = HashSet::new();
        for zone in &self.zones {
            if zone.is_empty() {
                return Err(ConfigError::Invalid {
                    field: "points.zones",
                    reason: "zone name must not be empty".into(),
                });
            }
            if !zones.insert(zone.as_str()) {
                return Err(ConfigError::Invalid {
                    field: "points.zones",
                    reason: format!("duplicate zone {zone:?}"),
                });
            }
        }
        Ok(())
    }
}

// ── ResolutionPolicy ─────────────────────────────────────────────

/// What to do when a requested point does not resolve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Log and omit unresolved points; the run continues.
    #[default]
    Lenient,
    /// Stop the run; the terminal outcome lists what is missing.
    Strict,
}

// ── BridgeConfig ─────────────────────────────────────────────────

/// Configuration for [`StepInterface`](crate::StepInterface).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Model definition file.
    pub model: PathBuf,
    /// Weather data file.
    pub weather: PathBuf,
    /// Output directory, created if absent. Default: `outputs/step_sim`.
    pub output_dir: PathBuf,
    /// How long the engine-side callback waits for an action before
    /// substituting a no-op. Default: 60 000.
    pub engine_action_timeout_ms: u64,
    /// How long `step()` waits for the next observation. Default: 120 000.
    pub consumer_timeout_ms: u64,
    /// Bound on joining the driver thread in `close()`. Default: 10 000.
    pub join_timeout_ms: u64,
    /// Bound on `reset()` waiting for the first observation. `None` waits
    /// until the run ends or is cancelled.
    pub first_observation_timeout_ms: Option<u64>,
    /// Unresolved point policy. Default: lenient.
    pub resolution: ResolutionPolicy,
    /// Points to resolve.
    pub points: PointMap,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::new(),
            weather: PathBuf::new(),
            output_dir: PathBuf::from("outputs/step_sim"),
            engine_action_timeout_ms: 60_000,
            consumer_timeout_ms: 120_000,
            join_timeout_ms: 10_000,
            first_observation_timeout_ms: None,
            resolution: ResolutionPolicy::Lenient,
            points: PointMap::default(),
        }
    }
}

impl BridgeConfig {
    /// Config for the given inputs with every other field defaulted.
    pub fn new(
        model: impl Into<PathBuf>,
        weather: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            model: model.into(),
            weather: weather.into(),
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML document and validate it.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Check structural invariants. Does not touch the filesystem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("engine_action_timeout_ms", self.engine_action_timeout_ms),
            ("consumer_timeout_ms", self.consumer_timeout_ms),
            ("join_timeout_ms", self.join_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be at least 1 ms".into(),
                });
            }
        }
        if self.first_observation_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid {
                field: "first_observation_timeout_ms",
                reason: "must be at least 1 ms when set".into(),
            });
        }
        self.points.validate()
    }

    /// Validate the config and the input files, create the output directory
    /// and return absolute engine arguments.
    pub fn prepare_run(&self) -> Result<RunArgs, BridgeError> {
        self.validate()?;
        if !self.model.is_file() {
            return Err(BridgeError::ModelNotFound(self.model.clone()));
        }
        if !self.weather.is_file() {
            return Err(BridgeError::WeatherNotFound(self.weather.clone()));
        }
        fs::create_dir_all(&self.output_dir).map_err(|source| BridgeError::OutputDir {
            path: self.output_dir.clone(),
            source,
        })?;
        Ok(RunArgs {
            model: absolute(&self.model),
            weather: absolute(&self.weather),
            output_dir: absolute(&self.output_dir),
        })
    }

    /// `engine_action_timeout_ms` as a [`Duration`].
    pub fn engine_action_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_action_timeout_ms)
    }

    /// `consumer_timeout_ms` as a [`Duration`].
    pub fn consumer_timeout(&self) -> Duration {
        Duration::from_millis(self.consumer_timeout_ms)
    }

    /// `join_timeout_ms` as a [`Duration`].
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// `first_observation_timeout_ms` as a [`Duration`].
    pub fn first_observation_timeout(&self) -> Option<Duration> {
        self.first_observation_timeout_ms.map(Duration::from_millis)
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
