//! User-facing [`StepInterface`]: `reset` / `step` / `close`.
//!
//! # Architecture
//!
//! ```text
//! Consumer thread                 Driver thread ("sluice-driver")
//!     |                               |
//!     |--reset()                      |
//!     |   prepare_run(), factory      |
//!     |   spawn ---------------------->| engine.run(args, gate)
//!     |<--Observation(1)--------------| gate: resolve, snapshot, publish
//!     |--step(a1)-------------------->| gate: apply a1
//!     |<--Observation(2)--------------|
//!     |   ...                         |
//!     |--step(aK)-------------------->| gate: apply aK, run ends
//!     |<--Done(RunOutcome)------------| driver
//!     |--close()                      |
//!     |   cancel, Stop, join -------->| (exited)
//! ```
//!
//! Each `reset()` builds a fresh session: channels, cancel signal, state
//! cell, handle registry, gate and driver. Nothing is reused across runs.
//!
//! Cancellation is cooperative. An engine that never calls back again
//! cannot be stopped; `close()` then gives up after the join timeout and
//! leaves the thread detached.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use sluice_core::space::{action_fields, clock_fields};
use sluice_core::{
    Action, ControllerState, EngineFactory, FieldDescriptor, HandleTable, Observation, Reward,
};
use tracing::{debug, info, warn};

use crate::config::{BridgeConfig, SensorSource};
use crate::driver::{RunOutcome, SimulationDriver};
use crate::error::BridgeError;
use crate::gate::TimestepGate;
use crate::metrics::{BridgeMetrics, MetricsSnapshot};
use crate::registry::{HandleRegistry, Resolution};
use crate::rendezvous::{
    cancel_pair, channel_pair, ActionMessage, CancelTrigger, ConsumerSide, GateMessage,
    RecvStatus, SendStatus,
};
use crate::reward::ScaledReading;
use crate::state::StateCell;

// ── Step results ─────────────────────────────────────────────────

/// Why a run stopped producing observations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The engine returned; carries its outcome.
    Finished(RunOutcome),
    /// `step()` gave up waiting for the engine.
    ConsumerTimeout,
    /// `close()` (or a later `reset()`) ended the session.
    Closed,
}

/// Auxiliary step information. Empty while the run is live.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepInfo {
    /// Set once the run is done.
    pub termination: Option<Termination>,
}

impl StepInfo {
    /// Whether the run ended abnormally (consumer timeout, engine fault,
    /// strict resolution failure).
    pub fn is_error(&self) -> bool {
        match &self.termination {
            Some(Termination::ConsumerTimeout) => true,
            Some(Termination::Finished(outcome)) => outcome.is_error(),
            Some(Termination::Closed) | None => false,
        }
    }
}

/// Result of [`StepInterface::step`].
#[derive(Clone, Debug, PartialEq)]
pub struct StepOutcome {
    /// The new observation, or the last one once the run is done.
    pub observation: Observation,
    /// Reward for `observation`; `0.0` once the run is done.
    pub reward: f64,
    /// Whether the run is over. Call `reset()` to start another.
    pub done: bool,
    /// Termination details.
    pub info: StepInfo,
}

// ── CloseReport ──────────────────────────────────────────────────

/// Report from [`StepInterface::close`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseReport {
    /// Time spent in `close()`.
    pub total_ms: u64,
    /// Whether the driver thread was still running when `close()` started.
    pub was_running: bool,
    /// Whether the driver thread was joined within the join timeout.
    pub joined: bool,
    /// Whether there was nothing left to close.
    pub already_closed: bool,
}

impl CloseReport {
    fn noop() -> Self {
        Self {
            total_ms: 0,
            was_running: false,
            joined: true,
            already_closed: true,
        }
    }
}

// ── Session ──────────────────────────────────────────────────────

/// Everything owned by one run.
struct Session {
    episode: u64,
    consumer: ConsumerSide,
    trigger: CancelTrigger,
    state: Arc<StateCell>,
    driver: SimulationDriver,
    handles: Arc<OnceLock<Resolution>>,
    last_observation: Observation,
    info: StepInfo,
    closed: bool,
}

impl Session {
    /// Move to `Done`, keeping the first recorded termination.
    fn finish(&mut self, termination: Termination) {
        self.state.advance(ControllerState::Done);
        if self.info.termination.is_none() {
            self.info.termination = Some(termination);
        }
    }

    /// The idempotent read returned by every `step()` once done.
    fn terminal_read(&self) -> StepOutcome {
        StepOutcome {
            observation: self.last_observation.clone(),
            reward: 0.0,
            done: true,
            info: self.info.clone(),
        }
    }

    /// Outcome reported by the driver, or a fault if it vanished silently.
    fn driver_outcome(&self) -> RunOutcome {
        self.driver.outcome().unwrap_or_else(|| RunOutcome::Faulted {
            reason: "driver exited without a done marker".into(),
        })
    }

    fn shutdown(&mut self, join_timeout: Duration) -> CloseReport {
        if self.closed {
            return CloseReport::noop();
        }
        let start = Instant::now();
        let was_running = !self.driver.is_finished();

        self.trigger.cancel();
        if was_running {
            self.consumer.try_send_action(ActionMessage {
                step: self.last_observation.step,
                action: Action::Stop,
            });
        }
        let joined = self.driver.join_timeout(join_timeout);
        self.finish(Termination::Closed);
        self.closed = true;

        let report = CloseReport {
            total_ms: start.elapsed().as_millis() as u64,
            was_running,
            joined,
            already_closed: false,
        };
        info!(
            episode = self.episode,
            was_running,
            joined,
            total_ms = report.total_ms,
            "session closed"
        );
        report
    }
}

/// Single-flight guard: at most one `step()` or `reset()` at a time.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, BridgeError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| BridgeError::StepInFlight)
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ── StepInterface ────────────────────────────────────────────────

/// Pull-based step interface over a callback-driven engine.
///
/// All methods take `&self`; the interface is `Sync` and can be shared
/// across threads, so `close()` can interrupt a blocked `step()`. A second
/// concurrent `step()` is rejected with [`BridgeError::StepInFlight`].
///
/// Dropping the interface closes it.
pub struct StepInterface {
    config: BridgeConfig,
    factory: Box<dyn EngineFactory>,
    reward: Box<dyn Reward>,
    metrics: Arc<BridgeMetrics>,
    session: Mutex<Option<Session>>,
    in_flight: AtomicBool,
    episodes: AtomicU64,
}

impl StepInterface {
    /// Interface over engines built by `factory`. Nothing starts until
    /// [`reset`](Self::reset).
    pub fn new(config: BridgeConfig, factory: impl EngineFactory + 'static) -> Self {
        Self {
            config,
            factory: Box::new(factory),
            reward: Box::new(ScaledReading::default()),
            metrics: Arc::new(BridgeMetrics::default()),
            session: Mutex::new(None),
            in_flight: AtomicBool::new(false),
            episodes: AtomicU64::new(0),
        }
    }

    /// Replace the reward function.
    pub fn with_reward(mut self, reward: impl Reward + 'static) -> Self {
        self.reward = Box::new(reward);
        self
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close any previous run, validate inputs, start a fresh run and block
    /// for its first run-period observation.
    ///
    /// # Errors
    ///
    /// Validation errors ([`BridgeError::ModelNotFound`],
    /// [`BridgeError::WeatherNotFound`], [`BridgeError::OutputDir`],
    /// [`BridgeError::Config`]) are returned before any thread starts.
    /// [`BridgeError::EndedBeforeFirstObservation`] carries the outcome of a
    /// run that produced no observation.
    pub fn reset(&self) -> Result<Observation, BridgeError> {
        let _flight = FlightGuard::acquire(&self.in_flight)?;

        let (consumer, episode) = {
            let mut guard = self.lock_session();
            if let Some(previous) = guard.as_mut() {
                previous.shutdown(self.config.join_timeout());
            }
            *guard = None;

            let args = self.config.prepare_run()?;
            let engine = self.factory.create()?;
            let episode = self.episodes.fetch_add(1, Ordering::Relaxed) + 1;

            let (trigger, signal) = cancel_pair();
            let (engine_side, consumer) = channel_pair(signal);
            let state = Arc::new(StateCell::new());
            let registry = HandleRegistry::for_points(&self.config.points);
            let handles = registry.shared();
            let gate = TimestepGate::new(
                registry,
                engine_side,
                Arc::clone(&state),
                Arc::clone(&self.metrics),
                self.config.engine_action_timeout(),
                self.config.resolution,
            );
            let driver = SimulationDriver::spawn(engine, args, gate, episode)?;
            info!(episode, "run started");

            *guard = Some(Session {
                episode,
                consumer: consumer.clone(),
                trigger,
                state,
                driver,
                handles,
                last_observation: Observation::default(),
                info: StepInfo::default(),
                closed: false,
            });
            (consumer, episode)
        };

        let first = consumer.await_message(self.config.first_observation_timeout());

        let mut guard = self.lock_session();
        let Some(session) = guard.as_mut().filter(|s| s.episode == episode) else {
            return Err(BridgeError::Closed);
        };
        if session.closed {
            return Err(BridgeError::Closed);
        }
        match first {
            RecvStatus::Received(GateMessage::Observation(obs)) => {
                session.state.advance(ControllerState::Running);
                session.last_observation = obs.clone();
                Ok(obs)
            }
            RecvStatus::Received(GateMessage::Done(outcome)) => {
                warn!(episode, %outcome, "run ended before the first observation");
                session.finish(Termination::Finished(outcome.clone()));
                session.driver.join_timeout(self.config.join_timeout());
                Err(BridgeError::EndedBeforeFirstObservation(outcome))
            }
            RecvStatus::Disconnected => {
                let outcome = session.driver_outcome();
                session.finish(Termination::Finished(outcome.clone()));
                session.driver.join_timeout(self.config.join_timeout());
                Err(BridgeError::EndedBeforeFirstObservation(outcome))
            }
            RecvStatus::TimedOut => {
                let timeout = self
                    .config
                    .first_observation_timeout()
                    .unwrap_or(Duration::ZERO);
                warn!(episode, timeout_ms = timeout.as_millis() as u64, "no first observation");
                session.shutdown(self.config.join_timeout());
                Err(BridgeError::ResetTimeout(timeout))
            }
            RecvStatus::Cancelled => Err(BridgeError::Closed),
        }
    }

    /// Send `action` (absent means [`Action::Noop`]) for the current
    /// observation and block for the next one.
    ///
    /// Once the run is done every call returns the last observation with
    /// `done = true` and the same info, without side effects.
    ///
    /// # Errors
    ///
    /// [`BridgeError::StepInFlight`] if another `step()` or `reset()` is
    /// running, [`BridgeError::NotStarted`] before the first `reset()`.
    pub fn step(&self, action: Option<Action>) -> Result<StepOutcome, BridgeError> {
        let _flight = FlightGuard::acquire(&self.in_flight)?;

        let (consumer, episode, last) = {
            let guard = self.lock_session();
            let session = guard.as_ref().ok_or(BridgeError::NotStarted)?;
            if session.state.is_done() {
                return Ok(session.terminal_read());
            }
            if action.as_ref().is_some_and(Action::is_stop) {
                session.state.advance(ControllerState::Stopping);
            }
            (
                session.consumer.clone(),
                session.episode,
                session.last_observation.clone(),
            )
        };

        let timeout = self.config.consumer_timeout();
        let started = Instant::now();
        let msg = ActionMessage {
            step: last.step,
            action: Action::from(action),
        };
        let received = match consumer.send_action(msg, timeout) {
            SendStatus::Sent | SendStatus::Disconnected => {
                consumer.await_message(Some(timeout.saturating_sub(started.elapsed())))
            }
            SendStatus::TimedOut => RecvStatus::TimedOut,
            SendStatus::Cancelled => RecvStatus::Cancelled,
        };

        let mut guard = self.lock_session();
        let Some(session) = guard.as_mut().filter(|s| s.episode == episode) else {
            // A concurrent reset replaced this run.
            return Ok(StepOutcome {
                observation: last,
                reward: 0.0,
                done: true,
                info: StepInfo {
                    termination: Some(Termination::Closed),
                },
            });
        };
        // `close()` may have finished while this call waited for the lock;
        // whatever was received belongs to a run that is already over.
        if session.closed || session.state.is_done() {
            return Ok(session.terminal_read());
        }

        match received {
            RecvStatus::Received(GateMessage::Observation(obs)) => {
                self.metrics.record_consumer_step();
                let reward = self.reward.reward(&obs);
                session.last_observation = obs.clone();
                return Ok(StepOutcome {
                    observation: obs,
                    reward,
                    done: false,
                    info: StepInfo::default(),
                });
            }
            RecvStatus::Received(GateMessage::Done(outcome)) => {
                info!(episode, %outcome, steps = session.last_observation.step, "run finished");
                session.finish(Termination::Finished(outcome));
            }
            RecvStatus::Disconnected => {
                let outcome = session.driver_outcome();
                session.finish(Termination::Finished(outcome));
            }
            RecvStatus::TimedOut => {
                warn!(
                    episode,
                    timeout_ms = timeout.as_millis() as u64,
                    "engine did not produce an observation in time"
                );
                self.metrics.record_consumer_timeout();
                session.finish(Termination::ConsumerTimeout);
                session.trigger.cancel();
            }
            RecvStatus::Cancelled => {
                debug!(episode, "step interrupted by close");
                session.finish(Termination::Closed);
            }
        }
        Ok(session.terminal_read())
    }

    /// Cancel the run, ask the engine to stop and join the driver thread
    /// within the join timeout. Idempotent; a join failure is reported, not
    /// escalated.
    pub fn close(&self) -> CloseReport {
        match self.lock_session().as_mut() {
            Some(session) => session.shutdown(self.config.join_timeout()),
            None => CloseReport::noop(),
        }
    }

    /// Controller state of the current run (`Idle` before the first reset).
    pub fn state(&self) -> ControllerState {
        self.lock_session()
            .as_ref()
            .map_or(ControllerState::Idle, |s| s.state.get())
    }

    /// Whether the current run is done.
    pub fn is_done(&self) -> bool {
        self.state().is_done()
    }

    /// Last observation returned by `reset()` or `step()`.
    pub fn last_observation(&self) -> Option<Observation> {
        self.lock_session()
            .as_ref()
            .map(|s| s.last_observation.clone())
    }

    /// Outcome of the current run, once the engine has returned.
    pub fn outcome(&self) -> Option<RunOutcome> {
        self.lock_session().as_ref().and_then(|s| s.driver.outcome())
    }

    /// Resolved handles of the current run, once resolution happened.
    pub fn handle_table(&self) -> Option<HandleTable> {
        self.lock_session()
            .as_ref()
            .and_then(|s| s.handles.get().map(|r| r.table.clone()))
    }

    /// Whether the driver thread of the current run is still running.
    pub fn driver_alive(&self) -> bool {
        self.lock_session()
            .as_ref()
            .is_some_and(|s| !s.driver.is_finished())
    }

    /// Whether a `step()` or `reset()` is currently blocked.
    pub fn is_step_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Number of runs started so far.
    pub fn episode(&self) -> u64 {
        self.episodes.load(Ordering::Relaxed)
    }

    /// Cumulative counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The configuration this interface runs with.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Fields an observation may carry. Descriptive only.
    pub fn observation_space(&self) -> Vec<FieldDescriptor> {
        let points = &self.config.points;
        let mut fields = clock_fields();
        for sensor in &points.sensors {
            let source = match &sensor.source {
                SensorSource::Variable { variable, key } => format!("{variable} [{key}]"),
                SensorSource::Meter { meter } => format!("meter {meter}"),
            };
            fields.push(FieldDescriptor::new(
                format!("readings.{}", sensor.label),
                "float",
                source,
            ));
        }
        fields.push(FieldDescriptor::new(
            "zones",
            "map<zone, float>",
            format!("{} for {} zones", points.zone_variable, points.zones.len()),
        ));
        fields
    }

    /// Recognized action fields. Descriptive only.
    pub fn action_space(&self) -> Vec<FieldDescriptor> {
        action_fields()
    }
}

impl Drop for StepInterface {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use sluice_core::{Engine, EngineFault};
    use sluice_test_utils::{EngineScript, ScriptedFactory};

    fn inputs() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model.idf");
        let weather = dir.path().join("weather.epw");
        fs::write(&model, "model").unwrap();
        fs::write(&weather, "weather").unwrap();
        (dir, model, weather)
    }

    fn config(dir: &tempfile::TempDir, model: PathBuf, weather: PathBuf) -> BridgeConfig {
        let mut cfg = BridgeConfig::new(model, weather, dir.path().join("out"));
        cfg.engine_action_timeout_ms = 2_000;
        cfg.consumer_timeout_ms = 5_000;
        cfg.join_timeout_ms = 5_000;
        cfg.points = cfg.points.with_zones(["Core_bottom", "Core_mid", "Core_top"]);
        cfg
    }

    #[test]
    fn step_before_reset_is_an_error() {
        let (dir, model, weather) = inputs();
        let env = StepInterface::new(
            config(&dir, model, weather),
            ScriptedFactory::new(EngineScript::run_period(3)),
        );
        assert!(matches!(env.step(None), Err(BridgeError::NotStarted)));
        assert_eq!(env.state(), ControllerState::Idle);
        assert!(env.close().already_closed);
    }

    #[test]
    fn reset_returns_first_observation() {
        let (dir, model, weather) = inputs();
        let env = StepInterface::new(
            config(&dir, model, weather),
            ScriptedFactory::new(EngineScript::run_period(3).with_warmup(2).with_sizing(1)),
        );
        let obs = env.reset().unwrap();
        assert_eq!(obs.step, 1);
        assert_eq!(obs.zones.len(), 3);
        assert_eq!(env.state(), ControllerState::Running);
        assert_eq!(env.episode(), 1);
        assert_eq!(env.handle_table().map(|t| t.len()), Some(2 + 3 * 3));
        assert_eq!(env.metrics().skipped_warmup, 2);
        assert_eq!(env.metrics().skipped_sizing, 1);
        let report = env.close();
        assert!(report.joined);
        assert!(!report.already_closed);
    }

    #[test]
    fn factory_error_is_returned() {
        let (dir, model, weather) = inputs();
        let failing = || -> Result<Box<dyn Engine>, EngineFault> {
            Err(EngineFault::new("no engine state"))
        };
        let env = StepInterface::new(config(&dir, model, weather), failing);
        assert!(matches!(env.reset(), Err(BridgeError::Engine(_))));
        assert!(!env.driver_alive());
    }

    #[test]
    fn custom_reward_is_used() {
        let (dir, model, weather) = inputs();
        let env = StepInterface::new(
            config(&dir, model, weather),
            ScriptedFactory::new(EngineScript::run_period(3)),
        )
        .with_reward(|obs: &Observation| obs.step as f64);
        env.reset().unwrap();
        let out = env.step(None).unwrap();
        assert_eq!(out.reward, 2.0);
        assert!(!out.done);
        assert_eq!(out.info, StepInfo::default());
    }

    #[test]
    fn spaces_describe_configured_points() {
        let (dir, model, weather) = inputs();
        let env = StepInterface::new(
            config(&dir, model, weather),
            ScriptedFactory::new(EngineScript::run_period(1)),
        );
        let obs_fields: Vec<String> = env
            .observation_space()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert!(obs_fields.contains(&"step".to_string()));
        assert!(obs_fields.contains(&"readings.outdoor_temp".to_string()));
        assert!(obs_fields.contains(&"readings.total_power".to_string()));
        assert_eq!(obs_fields.last().map(String::as_str), Some("zones"));
        assert!(env.action_space().iter().any(|f| f.name == "per_entity"));
    }

    #[test]
    fn step_info_error_flags() {
        assert!(!StepInfo::default().is_error());
        assert!(StepInfo {
            termination: Some(Termination::ConsumerTimeout)
        }
        .is_error());
        assert!(!StepInfo {
            termination: Some(Termination::Finished(RunOutcome::Completed { exit_code: 0 }))
        }
        .is_error());
        assert!(!StepInfo {
            termination: Some(Termination::Closed)
        }
        .is_error());
    }
}
