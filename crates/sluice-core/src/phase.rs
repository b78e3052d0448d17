//! Simulation phases and the consumer-facing controller state.

use std::fmt;

/// What the engine is currently simulating, as reported by its
/// kind-of-simulation query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SimulationKind {
    /// Design-day simulation (including HVAC sizing design days).
    DesignDay,
    /// Any other non-weather-file pass, e.g. a sizing run period.
    SizingPeriod,
    /// The weather-file run period.
    RunPeriod,
}

impl SimulationKind {
    /// Engine code for the weather-file run period.
    pub const RUN_PERIOD_CODE: i32 = 3;

    /// Map the engine's integer kind-of-simulation code.
    ///
    /// `1` and `4` are design days, `3` is the weather-file run period;
    /// everything else is treated as a sizing pass.
    pub fn from_code(code: i32) -> Self {
        match code {
            Self::RUN_PERIOD_CODE => Self::RunPeriod,
            1 | 4 => Self::DesignDay,
            _ => Self::SizingPeriod,
        }
    }
}

/// Classification of a single engine callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SimulationPhase {
    /// Warm-up days before a period begins.
    WarmingUp,
    /// Any non run-period pass (sizing, design days).
    SizingPeriod,
    /// A real timestep presented to the consumer.
    RunPeriod,
}

impl SimulationPhase {
    /// Classify a callback from the engine's warm-up flag and simulation kind.
    ///
    /// Warm-up wins over the simulation kind: warm-up days of the run period
    /// are still not presented.
    pub fn classify(warmup: bool, kind: SimulationKind) -> Self {
        if warmup {
            Self::WarmingUp
        } else if kind == SimulationKind::RunPeriod {
            Self::RunPeriod
        } else {
            Self::SizingPeriod
        }
    }
}

/// Lifecycle of a step interface session.
///
/// Transitions are monotonic (`Idle → Running → Stopping → Done`); the
/// ordering of the variants is the ordering of the lifecycle. `Done` is
/// terminal until the next reset starts a fresh session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ControllerState {
    /// No run has been started.
    Idle = 0,
    /// The first observation has been delivered.
    Running = 1,
    /// A stop was requested (close or `Stop` action); the engine is winding down.
    Stopping = 2,
    /// The run finished, failed, timed out, or was closed.
    Done = 3,
}

impl ControllerState {
    /// Encode for atomic storage.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode from atomic storage. Out-of-range values saturate to `Done`.
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Done,
        }
    }

    /// Whether this is the terminal state.
    pub fn is_done(self) -> bool {
        self == Self::Done
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn kind_codes() {
        assert_eq!(SimulationKind::from_code(3), SimulationKind::RunPeriod);
        assert_eq!(SimulationKind::from_code(1), SimulationKind::DesignDay);
        assert_eq!(SimulationKind::from_code(4), SimulationKind::DesignDay);
        assert_eq!(SimulationKind::from_code(2), SimulationKind::SizingPeriod);
        assert_eq!(SimulationKind::from_code(6), SimulationKind::SizingPeriod);
    }

    #[test]
    fn warmup_takes_precedence() {
        assert_eq!(
            SimulationPhase::classify(true, SimulationKind::RunPeriod),
            SimulationPhase::WarmingUp
        );
        assert_eq!(
            SimulationPhase::classify(false, SimulationKind::DesignDay),
            SimulationPhase::SizingPeriod
        );
        assert_eq!(
            SimulationPhase::classify(false, SimulationKind::RunPeriod),
            SimulationPhase::RunPeriod
        );
    }

    #[test]
    fn lifecycle_is_ordered() {
        assert!(ControllerState::Idle < ControllerState::Running);
        assert!(ControllerState::Running < ControllerState::Stopping);
        assert!(ControllerState::Stopping < ControllerState::Done);
    }

    proptest! {
        #[test]
        fn out_of_range_saturates_to_done(v in 4u8..) {
            prop_assert_eq!(ControllerState::from_u8(v), ControllerState::Done);
        }
    }
}
