//! Lifecycle edge cases: idempotent close and terminal reads, repeated
//! resets, runs that end early, faults, resolution policies and timeouts.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use common::{Inputs, ZONES};
use sluice_bridge::{BridgeError, ResolutionPolicy, RunOutcome, StepInterface, Termination};
use sluice_core::{Action, ControllerState, HandleKey, Setpoints};
use sluice_test_utils::{EngineScript, ScriptedFactory};

// ── Close and terminal reads ─────────────────────────────────────

#[test]
fn close_is_idempotent() {
    let inputs = Inputs::new();
    let env = StepInterface::new(
        inputs.config(),
        ScriptedFactory::new(EngineScript::run_period(5)),
    );
    env.reset().unwrap();

    let first = env.close();
    assert!(!first.already_closed);
    assert!(first.joined);

    let second = env.close();
    assert!(second.already_closed);
    assert_eq!(second.total_ms, 0);
    assert!(env.is_done());
}

#[test]
fn steps_after_done_repeat_the_terminal_read() {
    let inputs = Inputs::new();
    let factory = ScriptedFactory::new(EngineScript::run_period(2));
    let recorder = factory.recorder();
    let env = StepInterface::new(inputs.config(), factory);
    env.reset().unwrap();
    env.step(None).unwrap();

    let done = env.step(None).unwrap();
    assert!(done.done);
    let callbacks = recorder.snapshot().callbacks;

    for _ in 0..3 {
        let again = env.step(Some(Action::uniform(22.0, 18.0))).unwrap();
        assert_eq!(again, done);
    }
    assert_eq!(recorder.snapshot().callbacks, callbacks);
    assert_eq!(
        env.outcome(),
        Some(RunOutcome::Completed { exit_code: 0 })
    );
    assert_eq!(env.last_observation().map(|o| o.step), Some(2));
}

#[test]
fn step_after_close_is_done_and_closed() {
    let inputs = Inputs::new();
    let env = StepInterface::new(
        inputs.config(),
        ScriptedFactory::new(EngineScript::run_period(5)),
    );
    let first = env.reset().unwrap();
    env.close();

    let out = env.step(None).unwrap();
    assert!(out.done);
    assert_eq!(out.observation, first);
    assert_eq!(out.info.termination, Some(Termination::Closed));
}

#[test]
fn close_racing_a_stepping_thread_keeps_the_run_closed() {
    let inputs = Inputs::new();
    for i in 0..100u64 {
        let env = StepInterface::new(
            inputs.config(),
            ScriptedFactory::new(EngineScript::run_period(1_000_000)),
        );
        env.reset().unwrap();

        thread::scope(|s| {
            let stepper = s.spawn(|| {
                let mut live_steps = Vec::new();
                loop {
                    let out = env.step(None).unwrap();
                    if out.done {
                        return (live_steps, out);
                    }
                    live_steps.push(out.observation.step);
                }
            });

            thread::sleep(Duration::from_micros(200 + (i % 4) * 100));
            let report = env.close();
            assert!(report.joined);
            let at_close = env.last_observation().unwrap().step;

            let (live_steps, terminal) = stepper.join().unwrap();
            assert!(
                live_steps.iter().all(|&step| step <= at_close),
                "iteration {i}: observation past step {at_close} delivered after close"
            );
            assert_eq!(terminal.observation.step, at_close, "iteration {i}");
            assert_eq!(terminal.info.termination, Some(Termination::Closed));
            assert_eq!(env.last_observation().unwrap().step, at_close);
            assert_eq!(env.state(), ControllerState::Done);
        });
    }
}

// ── Controller state ─────────────────────────────────────────────

#[test]
fn stop_request_moves_to_stopping_before_the_engine_sees_it() {
    let inputs = Inputs::new();
    let mut config = inputs.config();
    config.engine_action_timeout_ms = 50;
    let env = StepInterface::new(
        config,
        ScriptedFactory::new(
            EngineScript::run_period(5).with_delay_at(2, Duration::from_millis(500)),
        ),
    );
    assert_eq!(env.state(), ControllerState::Idle);
    env.reset().unwrap();
    assert_eq!(env.state(), ControllerState::Running);

    // Let the gate give up on step 1; the engine then sleeps before step 2.
    thread::sleep(Duration::from_millis(120));
    let issued = AtomicBool::new(false);
    thread::scope(|s| {
        let pending = s.spawn(|| {
            issued.store(true, Ordering::Release);
            env.step(Some(Action::Stop))
        });
        let deadline = Instant::now() + Duration::from_secs(5);
        while !(issued.load(Ordering::Acquire) && env.is_step_in_flight()) {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(1));
        }
        thread::sleep(Duration::from_millis(20));
        assert_eq!(env.state(), ControllerState::Stopping);
        pending.join().unwrap().unwrap();
    });

    let mut out = env.step(None).unwrap();
    for _ in 0..5 {
        if out.done {
            break;
        }
        out = env.step(None).unwrap();
    }
    assert!(out.done);
    assert!(matches!(
        out.info.termination,
        Some(Termination::Finished(RunOutcome::Stopped { .. }))
    ));
    assert_eq!(env.state(), ControllerState::Done);
}

// ── Repeated resets ──────────────────────────────────────────────

#[test]
fn reset_mid_run_starts_a_fresh_engine() {
    let inputs = Inputs::new();
    let factory = ScriptedFactory::new(EngineScript::run_period(10));
    let recorder = factory.recorder();
    let env = StepInterface::new(inputs.config(), factory);

    env.reset().unwrap();
    env.step(None).unwrap();
    env.step(None).unwrap();

    let obs = env.reset().unwrap();
    assert_eq!(obs.step, 1);
    assert_eq!(env.episode(), 2);
    assert_eq!(recorder.engines_created(), 2);
    assert_eq!(recorder.runs_finished(), 1);
    assert_eq!(env.state(), ControllerState::Running);

    let out = env.step(None).unwrap();
    assert_eq!(out.observation.step, 2);
    env.close();
    assert_eq!(recorder.runs_finished(), 2);
}

#[test]
fn reset_after_done_runs_again() {
    let inputs = Inputs::new();
    let env = StepInterface::new(
        inputs.config(),
        ScriptedFactory::new(EngineScript::run_period(1)),
    );
    env.reset().unwrap();
    assert!(env.step(None).unwrap().done);

    let obs = env.reset().unwrap();
    assert_eq!(obs.step, 1);
    assert!(!env.is_done());
    assert_eq!(env.episode(), 2);
}

// ── Runs that end early ──────────────────────────────────────────

#[test]
fn empty_run_period_ends_before_first_observation() {
    let inputs = Inputs::new();
    let env = StepInterface::new(
        inputs.config(),
        ScriptedFactory::new(EngineScript::run_period(0).with_warmup(3).with_sizing(2)),
    );
    let err = env.reset().unwrap_err();
    assert!(matches!(
        err,
        BridgeError::EndedBeforeFirstObservation(RunOutcome::Completed { exit_code: 0 })
    ));
    assert!(env.is_done());
    assert_eq!(env.metrics().observations_published, 0);
    assert_eq!(env.metrics().skipped_warmup, 3);
    assert_eq!(env.metrics().skipped_sizing, 2);
}

#[test]
fn engine_fault_finishes_run_with_error() {
    let inputs = Inputs::new();
    let env = StepInterface::new(
        inputs.config(),
        ScriptedFactory::new(EngineScript::run_period(10).failing_after(2)),
    );
    env.reset().unwrap();
    assert!(!env.step(None).unwrap().done);

    let out = env.step(None).unwrap();
    assert!(out.done);
    assert!(out.info.is_error());
    match out.info.termination {
        Some(Termination::Finished(RunOutcome::Faulted { reason })) => {
            assert!(reason.contains("after step 2"), "{reason}");
        }
        other => panic!("unexpected termination: {other:?}"),
    }
}

#[test]
fn engine_panic_is_reported_as_fault() {
    let inputs = Inputs::new();
    let env = StepInterface::new(
        inputs.config(),
        ScriptedFactory::new(EngineScript::run_period(10).panicking_after(1)),
    );
    env.reset().unwrap();

    let out = env.step(None).unwrap();
    assert!(out.done);
    assert!(out.info.is_error());
    let Some(Termination::Finished(RunOutcome::Faulted { reason })) = out.info.termination else {
        panic!("expected a fault");
    };
    assert!(reason.starts_with("engine panicked"), "{reason}");
    assert!(env.close().joined);
}

#[test]
fn stop_action_stops_the_engine() {
    let inputs = Inputs::new();
    let factory = ScriptedFactory::new(EngineScript::run_period(10).with_exit_code(3));
    let recorder = factory.recorder();
    let env = StepInterface::new(inputs.config(), factory);
    env.reset().unwrap();

    let out = env.step(Some(Action::Stop)).unwrap();
    assert!(out.done);
    assert!(!out.info.is_error());
    assert_eq!(
        out.info.termination,
        Some(Termination::Finished(RunOutcome::Stopped { exit_code: 3 }))
    );
    assert_eq!(recorder.snapshot().stopped_at, Some(1));
    assert!(recorder.writes_at(1).is_empty());
}

// ── Resolution ───────────────────────────────────────────────────

#[test]
fn strict_resolution_stops_on_missing_zone() {
    let inputs = Inputs::new();
    let mut config = inputs.config();
    config.resolution = ResolutionPolicy::Strict;
    config.points = config
        .points
        .with_zones(ZONES.iter().copied().chain(["Perimeter_1"]));
    let factory = ScriptedFactory::new(EngineScript::run_period(5));
    let recorder = factory.recorder();
    let env = StepInterface::new(config, factory);

    let Err(BridgeError::EndedBeforeFirstObservation(RunOutcome::Unresolved { missing })) =
        env.reset()
    else {
        panic!("expected an unresolved outcome");
    };
    assert_eq!(missing.len(), 3);
    assert!(missing.contains(&HandleKey::zone("Perimeter_1")));
    assert!(missing.contains(&HandleKey::cooling("Perimeter_1")));
    assert!(missing.contains(&HandleKey::heating("Perimeter_1")));
    assert_eq!(recorder.snapshot().stopped_at, Some(1));
}

#[test]
fn lenient_resolution_skips_missing_points() {
    let inputs = Inputs::new();
    let mut config = inputs.config();
    config.points = config
        .points
        .with_zones(ZONES.iter().copied().chain(["Perimeter_1"]));
    let env = StepInterface::new(
        config,
        ScriptedFactory::new(EngineScript::run_period(5)),
    );

    let obs = env.reset().unwrap();
    assert_eq!(obs.zones.len(), 3);
    assert_eq!(obs.zone("Perimeter_1"), None);
    assert_eq!(env.metrics().unresolved_handles, 3);
    assert_eq!(env.handle_table().map(|t| t.len()), Some(2 + 3 * 3));
    env.close();
}

#[test]
fn zone_without_actuators_is_read_but_not_written() {
    let inputs = Inputs::new();
    let mut config = inputs.config();
    config.points = config
        .points
        .with_zones(ZONES.iter().copied().chain(["Plenum"]));
    let factory =
        ScriptedFactory::new(EngineScript::run_period(3).with_sensor_only_zone("Plenum"));
    let recorder = factory.recorder();
    let env = StepInterface::new(config, factory);

    let obs = env.reset().unwrap();
    assert!(obs.zone("Plenum").is_some());
    assert_eq!(env.metrics().unresolved_handles, 2);

    env.step(Some(Action::uniform(24.0, 21.0))).unwrap();
    assert_eq!(recorder.writes_at(1).len(), 6);
    env.close();
}

#[test]
fn per_entity_action_writes_named_zones_only() {
    let inputs = Inputs::new();
    let factory = ScriptedFactory::new(EngineScript::run_period(3));
    let recorder = factory.recorder();
    let env = StepInterface::new(inputs.config(), factory);
    env.reset().unwrap();

    let action = Action::per_entity([
        ("Core_mid", Setpoints::new(23.0, 20.0)),
        ("Nowhere", Setpoints::new(23.0, 20.0)),
    ]);
    env.step(Some(action)).unwrap();

    let writes = recorder.writes_at(1);
    assert_eq!(writes.len(), 2);
    let mut values: Vec<f64> = writes.iter().map(|(_, v)| *v).collect();
    values.sort_by(f64::total_cmp);
    assert_eq!(values, vec![20.0, 23.0]);
    env.close();
}

// ── Timeouts ─────────────────────────────────────────────────────

#[test]
fn consumer_timeout_ends_run_with_error() {
    let inputs = Inputs::new();
    let mut config = inputs.config();
    config.consumer_timeout_ms = 100;
    let factory = ScriptedFactory::new(
        EngineScript::run_period(5).with_delay_at(2, Duration::from_millis(600)),
    );
    let recorder = factory.recorder();
    let env = StepInterface::new(config, factory);
    env.reset().unwrap();

    let out = env.step(None).unwrap();
    assert!(out.done);
    assert!(out.info.is_error());
    assert_eq!(out.info.termination, Some(Termination::ConsumerTimeout));
    assert_eq!(out.observation.step, 1);
    assert_eq!(env.metrics().consumer_timeouts, 1);

    assert_eq!(env.step(None).unwrap(), out);

    let report = env.close();
    assert!(report.joined);
    assert_eq!(recorder.snapshot().stopped_at, Some(2));
    assert_eq!(
        env.step(None).unwrap().info.termination,
        Some(Termination::ConsumerTimeout)
    );
}

#[test]
fn first_observation_timeout_fails_reset() {
    let inputs = Inputs::new();
    let mut config = inputs.config();
    config.first_observation_timeout_ms = Some(50);
    let env = StepInterface::new(
        config,
        ScriptedFactory::new(
            EngineScript::run_period(3).with_delay_at(1, Duration::from_millis(400)),
        ),
    );

    assert!(matches!(env.reset(), Err(BridgeError::ResetTimeout(d)) if d == Duration::from_millis(50)));
    assert!(env.is_done());
    assert!(!env.driver_alive());
}
