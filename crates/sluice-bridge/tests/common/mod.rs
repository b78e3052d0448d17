//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use sluice_bridge::BridgeConfig;

/// Zones of the default scripted engine.
pub const ZONES: [&str; 3] = ["Core_bottom", "Core_mid", "Core_top"];

/// Model and weather files in a temp directory.
pub struct Inputs {
    pub dir: tempfile::TempDir,
    pub model: PathBuf,
    pub weather: PathBuf,
}

impl Inputs {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("MediumOffice_Control.idf");
        let weather = dir.path().join("weather.epw");
        fs::write(&model, "Version,24.1;").unwrap();
        fs::write(&weather, "LOCATION,Chicago").unwrap();
        Self {
            dir,
            model,
            weather,
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    /// Config over the fixture zones with timeouts short enough for tests
    /// but far above the scripted engine's per-step cost.
    pub fn config(&self) -> BridgeConfig {
        let mut cfg = BridgeConfig::new(&self.model, &self.weather, self.output_dir());
        cfg.engine_action_timeout_ms = 5_000;
        cfg.consumer_timeout_ms = 10_000;
        cfg.join_timeout_ms = 5_000;
        cfg.points = cfg.points.with_zones(ZONES);
        cfg
    }
}
