//! The timestep gate: the callback the engine invokes every zone timestep.
//!
//! Per callback, in order:
//!
//! 1. If a stop was requested (consumer `Stop` or session cancellation),
//!    tell the engine to stop and return.
//! 2. Warm-up and non-run-period timesteps return without side effects.
//! 3. On the first run-period timestep, resolve handles (once).
//! 4. Snapshot an [`Observation`] and publish it, waiting at most the
//!    engine-side timeout for the channel slot.
//! 5. Wait for the answering action with the same bound; on timeout leave
//!    every actuator unchanged and carry on.
//! 6. `Stop` stops the engine; anything else is applied to the resolved
//!    actuators.
//!
//! The gate never blocks longer than two engine-side timeouts per callback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sluice_core::{
    Action, ControllerState, EngineFault, Exchange, HandleCategory, HandleKey, HandleTable,
    Observation, SimulationPhase, TimestepCallback,
};
use tracing::{debug, info, trace, warn};

use crate::config::ResolutionPolicy;
use crate::driver::RunOutcome;
use crate::metrics::BridgeMetrics;
use crate::registry::{EngineQuery, HandleRegistry, PointRequest};
use crate::rendezvous::{EngineSide, GateMessage, RecvStatus, SendStatus};
use crate::state::StateCell;

/// What a single callback did. Returned by [`TimestepGate::advance`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateEvent {
    /// Warm-up timestep, ignored.
    SkippedWarmup,
    /// Sizing or design-day timestep, ignored.
    SkippedSizing,
    /// The engine was told to stop.
    Stopped,
    /// Strict resolution failed; the engine was told to stop.
    Unresolved,
    /// An action was received for `step` and wrote `writes` actuators.
    Applied {
        /// Observation step the action answered.
        step: u64,
        /// Number of actuator writes.
        writes: usize,
    },
    /// No action arrived for `step`; actuators were left unchanged.
    ActionTimedOut {
        /// Observation step that went unanswered.
        step: u64,
    },
    /// The observation for `step` could not be published and was dropped.
    ObservationDropped {
        /// Dropped observation step.
        step: u64,
    },
}

/// Engine-side state machine for one run.
pub struct TimestepGate {
    registry: HandleRegistry,
    channels: EngineSide,
    state: Arc<StateCell>,
    metrics: Arc<BridgeMetrics>,
    action_timeout: Duration,
    policy: ResolutionPolicy,
    step: u64,
    stop_requested: bool,
    unresolved: Option<Vec<HandleKey>>,
}

impl TimestepGate {
    /// Gate for a fresh run.
    pub fn new(
        registry: HandleRegistry,
        channels: EngineSide,
        state: Arc<StateCell>,
        metrics: Arc<BridgeMetrics>,
        action_timeout: Duration,
        policy: ResolutionPolicy,
    ) -> Self {
        Self {
            registry,
            channels,
            state,
            metrics,
            action_timeout,
            policy,
            step: 0,
            stop_requested: false,
            unresolved: None,
        }
    }

    /// Run-period steps seen so far.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Whether the gate asked the engine to stop.
    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Handle one engine callback.
    pub fn advance(&mut self, ex: &mut dyn Exchange) -> GateEvent {
        if self.stop_requested || self.channels.is_cancelled() {
            return self.stop(ex);
        }

        match SimulationPhase::classify(ex.warmup_flag(), ex.kind_of_sim()) {
            SimulationPhase::WarmingUp => {
                self.metrics.record_skipped_warmup();
                trace!("skipping warm-up timestep");
                return GateEvent::SkippedWarmup;
            }
            SimulationPhase::SizingPeriod => {
                self.metrics.record_skipped_sizing();
                trace!(kind = ?ex.kind_of_sim(), "skipping non-run-period timestep");
                return GateEvent::SkippedSizing;
            }
            SimulationPhase::RunPeriod => {}
        }

        if !self.registry.is_initialized() {
            info!("first run-period timestep");
            let resolution = self.registry.resolve(&*ex);
            self.metrics.record_unresolved(resolution.missing.len());
            if self.policy == ResolutionPolicy::Strict && !resolution.missing.is_empty() {
                warn!(
                    missing = resolution.missing.len(),
                    "strict resolution failed; stopping run"
                );
                self.unresolved = Some(resolution.missing.clone());
                self.stop(ex);
                return GateEvent::Unresolved;
            }
        }

        self.step += 1;
        let step = self.step;
        let resolution = self.registry.resolve(&*ex);
        let observation = snapshot(self.registry.requests(), &resolution.table, &*ex, step);

        match self
            .channels
            .publish(GateMessage::Observation(observation), self.action_timeout)
        {
            SendStatus::Sent => self.metrics.record_published(),
            SendStatus::TimedOut => {
                warn!(step, "consumer is not draining observations; dropping one");
                self.metrics.record_dropped();
                return GateEvent::ObservationDropped { step };
            }
            SendStatus::Cancelled | SendStatus::Disconnected => return self.stop(ex),
        }

        let deadline = Instant::now() + self.action_timeout;
        loop {
            match self.channels.await_action(deadline) {
                RecvStatus::Received(msg) if msg.action.is_stop() => {
                    debug!(step, "stop received");
                    return self.stop(ex);
                }
                RecvStatus::Received(msg) if msg.step < step => {
                    self.metrics.record_stale_action();
                    debug!(step, answered = msg.step, "discarding stale action");
                }
                RecvStatus::Received(msg) => {
                    let resolution = self.registry.resolve(&*ex);
                    let writes = apply(&resolution.table, ex, &msg.action);
                    if writes > 0 {
                        self.metrics.record_applied();
                    }
                    return GateEvent::Applied { step, writes };
                }
                RecvStatus::TimedOut => {
                    warn!(
                        step,
                        timeout_ms = self.action_timeout.as_millis() as u64,
                        "no action received; leaving actuators unchanged"
                    );
                    self.metrics.record_engine_timeout();
                    return GateEvent::ActionTimedOut { step };
                }
                RecvStatus::Cancelled | RecvStatus::Disconnected => return self.stop(ex),
            }
        }
    }

    fn stop(&mut self, ex: &mut dyn Exchange) -> GateEvent {
        ex.stop_simulation();
        if !self.stop_requested {
            debug!(step = self.step, "asking engine to stop");
        }
        self.stop_requested = true;
        self.state.advance(ControllerState::Stopping);
        GateEvent::Stopped
    }

    /// Terminal outcome of the run, given what the engine's run returned.
    pub fn outcome(&self, result: Result<i32, EngineFault>) -> RunOutcome {
        match result {
            Err(fault) => RunOutcome::Faulted {
                reason: fault.reason,
            },
            Ok(_) if self.unresolved.is_some() => RunOutcome::Unresolved {
                missing: self.unresolved.clone().unwrap_or_default(),
            },
            Ok(exit_code) if self.stop_requested => RunOutcome::Stopped { exit_code },
            Ok(exit_code) => RunOutcome::Completed { exit_code },
        }
    }

    /// Publish the terminal marker. Dropped with a warning if the channel
    /// stays full for the engine-side timeout.
    pub fn publish_done(&self, outcome: RunOutcome) {
        match self
            .channels
            .publish(GateMessage::Done(outcome), self.action_timeout)
        {
            SendStatus::Sent => {}
            SendStatus::TimedOut => warn!("consumer is not draining; done marker dropped"),
            SendStatus::Cancelled | SendStatus::Disconnected => {
                debug!("session closed before done marker");
            }
        }
    }
}

impl TimestepCallback for TimestepGate {
    fn on_timestep(&mut self, exchange: &mut dyn Exchange) {
        self.advance(exchange);
    }
}

/// Copy every resolved reading out of the engine.
fn snapshot(
    requests: &[PointRequest],
    table: &HandleTable,
    ex: &dyn Exchange,
    step: u64,
) -> Observation {
    let mut obs = Observation {
        step,
        clock: ex.clock(),
        ..Observation::default()
    };
    for request in requests {
        let Some(handle) = table.get(&request.key) else {
            continue;
        };
        let value = match request.query {
            EngineQuery::Variable { .. } => ex.variable_value(handle),
            EngineQuery::Meter { .. } => ex.meter_value(handle),
            EngineQuery::Actuator { .. } => continue,
        };
        match request.key.category {
            HandleCategory::Sensor => {
                obs.readings.insert(request.key.entity.clone(), value);
            }
            HandleCategory::ZoneSensor => {
                obs.zones.insert(request.key.entity.clone(), value);
            }
            HandleCategory::CoolingSetpoint | HandleCategory::HeatingSetpoint => {}
        }
    }
    obs
}

/// Write an action's setpoints. Returns the number of actuator writes.
fn apply(table: &HandleTable, ex: &mut dyn Exchange, action: &Action) -> usize {
    let mut writes = 0;
    let mut write = |category, zone: &str, value: Option<f64>| {
        if let (Some(value), Some(handle)) = (value, table.lookup(category, zone)) {
            ex.set_actuator_value(handle, value);
            writes += 1;
        }
    };
    match action {
        Action::Stop | Action::Noop => {}
        Action::Uniform(setpoints) => {
            for (zone, _) in table.entities(HandleCategory::CoolingSetpoint) {
                write(HandleCategory::CoolingSetpoint, zone, setpoints.cooling);
                write(HandleCategory::HeatingSetpoint, zone, setpoints.heating);
            }
        }
        Action::PerEntity(zones) => {
            for (zone, setpoints) in zones {
                if !table.contains(&HandleKey::cooling(zone)) {
                    debug!(zone = %zone, "ignoring setpoints for unresolved zone");
                    continue;
                }
                write(HandleCategory::CoolingSetpoint, zone, setpoints.cooling);
                write(HandleCategory::HeatingSetpoint, zone, setpoints.heating);
            }
        }
    }
    writes
}
