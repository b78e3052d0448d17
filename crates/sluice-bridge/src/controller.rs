//! Reference controller.

use sluice_core::{Action, Controller, Observation};

/// Applies the same uniform setpoints every step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedSetpoints {
    /// Cooling setpoint (°C).
    pub cooling: f64,
    /// Heating setpoint (°C).
    pub heating: f64,
}

impl FixedSetpoints {
    /// Controller holding `cooling` / `heating`.
    pub fn new(cooling: f64, heating: f64) -> Self {
        Self { cooling, heating }
    }
}

impl Default for FixedSetpoints {
    /// 24 °C cooling, 21 °C heating.
    fn default() -> Self {
        Self::new(24.0, 21.0)
    }
}

impl Controller for FixedSetpoints {
    fn act(&mut self, _observation: &Observation) -> Action {
        Action::uniform(self.cooling, self.heating)
    }
}
