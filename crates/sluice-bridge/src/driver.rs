//! Background thread that runs the engine for one episode.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use sluice_core::{Engine, HandleKey, RunArgs};
use tracing::{info, info_span, warn};

use crate::error::BridgeError;
use crate::gate::TimestepGate;

// ── RunOutcome ───────────────────────────────────────────────────

/// How a run ended. Carried by the terminal `Done` message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The engine ran to the end of the run period.
    Completed {
        /// Engine exit code.
        exit_code: i32,
    },
    /// The engine stopped early on request (`Stop` or close).
    Stopped {
        /// Engine exit code.
        exit_code: i32,
    },
    /// The engine raised or panicked.
    Faulted {
        /// Error description.
        reason: String,
    },
    /// Strict resolution failed and the run was stopped.
    Unresolved {
        /// Points that did not resolve.
        missing: Vec<HandleKey>,
    },
}

impl RunOutcome {
    /// Whether the run ended because something went wrong.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Faulted { .. } | Self::Unresolved { .. })
    }

    /// Engine exit code, when the engine returned normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Completed { exit_code } | Self::Stopped { exit_code } => Some(*exit_code),
            Self::Faulted { .. } | Self::Unresolved { .. } => None,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { exit_code } => write!(f, "completed (exit code {exit_code})"),
            Self::Stopped { exit_code } => write!(f, "stopped (exit code {exit_code})"),
            Self::Faulted { reason } => write!(f, "engine fault: {reason}"),
            Self::Unresolved { missing } => {
                write!(f, "unresolved points:")?;
                for key in missing {
                    write!(f, " {key}")?;
                }
                Ok(())
            }
        }
    }
}

// ── SimulationDriver ─────────────────────────────────────────────

/// Owns the thread running one engine run. Never restarted; a new run
/// gets a new driver.
#[derive(Debug)]
pub struct SimulationDriver {
    handle: Option<JoinHandle<()>>,
    exited: Receiver<()>,
    outcome: Arc<OnceLock<RunOutcome>>,
}

impl SimulationDriver {
    /// Start `engine` on a dedicated thread with `gate` as its callback.
    ///
    /// When the run returns (normally, with a fault, or by panicking) the
    /// thread records the [`RunOutcome`] and publishes it as the terminal
    /// `Done` message.
    pub fn spawn(
        engine: Box<dyn Engine>,
        args: RunArgs,
        gate: TimestepGate,
        episode: u64,
    ) -> Result<Self, BridgeError> {
        // Never sent on; disconnects when the thread exits.
        let (exit_tx, exited) = crossbeam_channel::bounded::<()>(0);
        let outcome = Arc::new(OnceLock::new());
        let outcome_cell = Arc::clone(&outcome);

        let handle = thread::Builder::new()
            .name("sluice-driver".into())
            .spawn(move || {
                let _exit = exit_tx;
                let span = info_span!("driver", episode);
                let _enter = span.enter();

                let mut gate = gate;
                let outcome = run_engine(engine, &args, &mut gate);
                let _ = outcome_cell.set(outcome.clone());
                gate.publish_done(outcome);
            })
            .map_err(BridgeError::ThreadSpawn)?;

        Ok(Self {
            handle: Some(handle),
            exited,
            outcome,
        })
    }

    /// Whether the driver thread has exited (or was already joined).
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Outcome of the run, once the engine has returned.
    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome.get().cloned()
    }

    /// Join the thread, waiting at most `timeout` for it to exit. Returns
    /// `false` (and keeps the thread detached-but-tracked) on timeout.
    pub fn join_timeout(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    warn!("driver thread panicked outside the engine run");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "driver thread did not exit in time; engine may be wedged"
                );
                self.handle = Some(handle);
                false
            }
        }
    }
}

fn run_engine(mut engine: Box<dyn Engine>, args: &RunArgs, gate: &mut TimestepGate) -> RunOutcome {
    info!(model = %args.model.display(), weather = %args.weather.display(), "engine run starting");
    let result = panic::catch_unwind(AssertUnwindSafe(|| engine.run(args, gate)));
    let outcome = match result {
        Ok(result) => gate.outcome(result),
        Err(payload) => RunOutcome::Faulted {
            reason: panic_message(payload.as_ref()),
        },
    };
    info!(steps = gate.step(), %outcome, "engine run finished");
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("engine panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("engine panicked: {s}")
    } else {
        "engine panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PointMap, ResolutionPolicy};
    use crate::metrics::BridgeMetrics;
    use crate::registry::HandleRegistry;
    use crate::rendezvous::{
        cancel_pair, channel_pair, CancelTrigger, ConsumerSide, GateMessage, RecvStatus,
    };
    use crate::state::StateCell;
    use sluice_core::EngineFactory;
    use sluice_test_utils::{EngineScript, ScriptedFactory};

    fn start(script: EngineScript) -> (SimulationDriver, ConsumerSide, CancelTrigger) {
        let (trigger, signal) = cancel_pair();
        let (engine_side, consumer) = channel_pair(signal);
        let gate = TimestepGate::new(
            HandleRegistry::for_points(&PointMap::default()),
            engine_side,
            Arc::new(StateCell::new()),
            Arc::new(BridgeMetrics::default()),
            Duration::from_millis(50),
            ResolutionPolicy::Lenient,
        );
        let engine = ScriptedFactory::new(script).create().unwrap();
        let args = RunArgs {
            model: "m.idf".into(),
            weather: "w.epw".into(),
            output_dir: "out".into(),
        };
        let driver = SimulationDriver::spawn(engine, args, gate, 1).unwrap();
        (driver, consumer, trigger)
    }

    fn expect_done(consumer: &ConsumerSide) -> RunOutcome {
        loop {
            match consumer.await_message(Some(Duration::from_secs(5))) {
                RecvStatus::Received(GateMessage::Done(outcome)) => return outcome,
                RecvStatus::Received(GateMessage::Observation(_)) => continue,
                other => panic!("expected done marker, got {other:?}"),
            }
        }
    }

    #[test]
    fn empty_run_publishes_completed() {
        let (mut driver, consumer, _trigger) = start(EngineScript::run_period(0).with_exit_code(3));
        assert_eq!(expect_done(&consumer), RunOutcome::Completed { exit_code: 3 });
        assert!(driver.join_timeout(Duration::from_secs(5)));
        assert!(driver.is_finished());
        assert_eq!(driver.outcome(), Some(RunOutcome::Completed { exit_code: 3 }));
    }

    #[test]
    fn engine_panic_becomes_fault() {
        let (mut driver, consumer, _trigger) = start(EngineScript::run_period(5).panicking_after(1));
        match expect_done(&consumer) {
            RunOutcome::Faulted { reason } => assert!(reason.contains("scripted panic")),
            other => panic!("expected fault, got {other:?}"),
        }
        assert!(driver.join_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn join_times_out_on_slow_engine() {
        let (mut driver, consumer, _trigger) =
            start(EngineScript::run_period(1).with_step_delay(Duration::from_millis(300)));
        assert!(!driver.join_timeout(Duration::from_millis(10)));
        assert!(!driver.is_finished());
        expect_done(&consumer);
        assert!(driver.join_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn outcome_display() {
        assert_eq!(
            RunOutcome::Unresolved {
                missing: vec![HandleKey::zone("a"), HandleKey::cooling("a")]
            }
            .to_string(),
            "unresolved points: zone_sensor:a cooling_setpoint:a"
        );
        assert!(RunOutcome::Faulted { reason: "x".into() }.is_error());
        assert_eq!(RunOutcome::Stopped { exit_code: 1 }.exit_code(), Some(1));
    }
}
