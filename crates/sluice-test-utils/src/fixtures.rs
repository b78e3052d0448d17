//! Scripted fixture engine.
//!
//! [`ScriptedEngine`] plays a fixed schedule of warm-up, sizing and
//! run-period timesteps against a [`MockExchange`], calling the registered
//! callback inline like a real engine does. Faults, panics and slow steps
//! can be injected at chosen run-period steps. An [`EngineRecorder`] shared
//! with the test records what the callback did.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use sluice_core::{
    Engine, EngineFactory, EngineFault, Handle, RunArgs, SimClock, SimulationKind,
    TimestepCallback,
};

use crate::{
    MockExchange, COOLING_SETPOINT, ENVIRONMENT, FACILITY_ELECTRICITY, HEATING_SETPOINT,
    OUTDOOR_TEMPERATURE, ZONE_TEMPERATURE, ZONE_TEMPERATURE_CONTROL,
};

/// Schedule and failure injection for a [`ScriptedEngine`].
#[derive(Clone, Debug)]
pub struct EngineScript {
    pub warmup_steps: u32,
    pub sizing_steps: u32,
    pub run_steps: u64,
    /// Zones with a temperature reading and both setpoint actuators.
    pub zones: Vec<String>,
    /// Zones with a temperature reading but no actuators.
    pub sensor_only_zones: Vec<String>,
    /// Sleep before every run-period callback.
    pub step_delay: Duration,
    /// Extra sleep before the callback of specific run-period steps.
    pub delays: Vec<(u64, Duration)>,
    /// Return an [`EngineFault`] right after this run-period step.
    pub fail_after: Option<u64>,
    /// Panic right after this run-period step.
    pub panic_after: Option<u64>,
    pub exit_code: i32,
    pub minutes_per_step: u32,
}

impl EngineScript {
    /// `run_steps` run-period timesteps with no warm-up or sizing, three zones.
    pub fn run_period(run_steps: u64) -> Self {
        Self {
            warmup_steps: 0,
            sizing_steps: 0,
            run_steps,
            zones: vec!["Core_bottom".into(), "Core_mid".into(), "Core_top".into()],
            sensor_only_zones: Vec::new(),
            step_delay: Duration::ZERO,
            delays: Vec::new(),
            fail_after: None,
            panic_after: None,
            exit_code: 0,
            minutes_per_step: 15,
        }
    }

    pub fn with_warmup(mut self, steps: u32) -> Self {
        self.warmup_steps = steps;
        self
    }

    pub fn with_sizing(mut self, steps: u32) -> Self {
        self.sizing_steps = steps;
        self
    }

    pub fn with_zones<S: Into<String>>(mut self, zones: impl IntoIterator<Item = S>) -> Self {
        self.zones = zones.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sensor_only_zone(mut self, zone: impl Into<String>) -> Self {
        self.sensor_only_zones.push(zone.into());
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Sleep for `delay` before the callback of run-period step `step`.
    pub fn with_delay_at(mut self, step: u64, delay: Duration) -> Self {
        self.delays.push((step, delay));
        self
    }

    pub fn failing_after(mut self, step: u64) -> Self {
        self.fail_after = Some(step);
        self
    }

    pub fn panicking_after(mut self, step: u64) -> Self {
        self.panic_after = Some(step);
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    fn delay_before(&self, step: u64) -> Duration {
        self.step_delay
            + self
                .delays
                .iter()
                .filter(|(s, _)| *s == step)
                .map(|(_, d)| *d)
                .sum::<Duration>()
    }
}

/// What a scripted engine observed its callback doing.
#[derive(Clone, Debug, Default)]
pub struct RecordedLog {
    pub engines_created: usize,
    pub runs_started: u32,
    pub last_args: Option<RunArgs>,
    /// Callbacks of any phase.
    pub callbacks: u64,
    /// Run-period steps whose callback has returned.
    pub run_steps_completed: u64,
    /// Cumulative handle lookups of the current run.
    pub handle_queries: u32,
    /// Actuator writes as `(run step, handle, value)`.
    pub writes: Vec<(u64, Handle, f64)>,
    /// Run-period step (0 outside the run period) at which a stop was requested.
    pub stopped_at: Option<u64>,
    pub runs_finished: u32,
}

impl RecordedLog {
    /// Writes made during the callback of run-period step `step`.
    pub fn writes_at(&self, step: u64) -> Vec<(Handle, f64)> {
        self.writes
            .iter()
            .filter(|(s, _, _)| *s == step)
            .map(|(_, h, v)| (*h, *v))
            .collect()
    }
}

/// Shared, cloneable view of a [`RecordedLog`].
#[derive(Clone, Debug, Default)]
pub struct EngineRecorder(Arc<Mutex<RecordedLog>>);

impl EngineRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, RecordedLog> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of the current log.
    pub fn snapshot(&self) -> RecordedLog {
        self.log().clone()
    }

    pub fn engines_created(&self) -> usize {
        self.log().engines_created
    }

    pub fn runs_finished(&self) -> u32 {
        self.log().runs_finished
    }

    pub fn writes_at(&self, step: u64) -> Vec<(Handle, f64)> {
        self.log().writes_at(step)
    }
}

/// A deterministic engine that replays an [`EngineScript`].
pub struct ScriptedEngine {
    script: EngineScript,
    recorder: EngineRecorder,
}

impl ScriptedEngine {
    pub fn new(script: EngineScript, recorder: EngineRecorder) -> Self {
        Self { script, recorder }
    }

    fn build_exchange(&self) -> MockExchange {
        let mut ex = MockExchange::new()
            .with_variable(OUTDOOR_TEMPERATURE, ENVIRONMENT, 0.0)
            .with_meter(FACILITY_ELECTRICITY, 0.0);
        for zone in &self.script.zones {
            ex.add_variable(ZONE_TEMPERATURE, zone, 21.0);
            ex.add_actuator(ZONE_TEMPERATURE_CONTROL, COOLING_SETPOINT, zone);
            ex.add_actuator(ZONE_TEMPERATURE_CONTROL, HEATING_SETPOINT, zone);
        }
        for zone in &self.script.sensor_only_zones {
            ex.add_variable(ZONE_TEMPERATURE, zone, 21.0);
        }
        ex
    }

    /// Advance clock and readings to run-period step `step`.
    fn update_readings(&self, ex: &mut MockExchange, step: u64) {
        let minutes = step * u64::from(self.script.minutes_per_step);
        let day_index = minutes / 1440;
        ex.clock = SimClock {
            year: 2024,
            month: (1 + day_index / 31).min(12) as u8,
            day: (1 + day_index % 31) as u8,
            hour: ((minutes % 1440) / 60) as u8,
            minute: (minutes % 60) as u8,
        };
        ex.set_variable(
            OUTDOOR_TEMPERATURE,
            ENVIRONMENT,
            5.0 + (step % 96) as f64 * 0.25,
        );
        ex.set_meter(FACILITY_ELECTRICITY, 80_000.0 + 500.0 * step as f64);
        for zone in self
            .script
            .zones
            .iter()
            .chain(&self.script.sensor_only_zones)
        {
            ex.set_variable(ZONE_TEMPERATURE, zone, 21.0 + 0.01 * step as f64);
        }
    }

    /// Invoke the callback once and record its effects. Returns `true` if
    /// the callback asked the engine to stop.
    fn tick(&self, ex: &mut MockExchange, callback: &mut dyn TimestepCallback, step: u64) -> bool {
        callback.on_timestep(ex);
        let writes = ex.take_writes();
        let stopped = ex.stop_requests() > 0;

        let mut log = self.recorder.log();
        log.callbacks += 1;
        log.handle_queries = ex.queries();
        if step > 0 {
            log.run_steps_completed = step;
        }
        log.writes
            .extend(writes.into_iter().map(|(h, v)| (step, h, v)));
        if stopped && log.stopped_at.is_none() {
            log.stopped_at = Some(step);
        }
        stopped
    }

    fn finish(&self) {
        self.recorder.log().runs_finished += 1;
    }
}

impl Engine for ScriptedEngine {
    fn run(
        &mut self,
        args: &RunArgs,
        callback: &mut dyn TimestepCallback,
    ) -> Result<i32, EngineFault> {
        {
            let mut log = self.recorder.log();
            log.runs_started += 1;
            log.last_args = Some(args.clone());
        }
        let mut ex = self.build_exchange();
        let exit_code = self.script.exit_code;

        ex.warmup = true;
        ex.kind = SimulationKind::RunPeriod;
        for _ in 0..self.script.warmup_steps {
            if self.tick(&mut ex, callback, 0) {
                self.finish();
                return Ok(exit_code);
            }
        }

        ex.warmup = false;
        ex.kind = SimulationKind::SizingPeriod;
        for _ in 0..self.script.sizing_steps {
            if self.tick(&mut ex, callback, 0) {
                self.finish();
                return Ok(exit_code);
            }
        }

        ex.kind = SimulationKind::RunPeriod;
        for step in 1..=self.script.run_steps {
            let delay = self.script.delay_before(step);
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            self.update_readings(&mut ex, step);
            if self.tick(&mut ex, callback, step) {
                break;
            }
            if self.script.fail_after == Some(step) {
                self.finish();
                return Err(EngineFault::new(format!(
                    "scripted fault after step {step}"
                )));
            }
            if self.script.panic_after == Some(step) {
                self.finish();
                panic!("scripted panic after step {step}");
            }
        }

        self.finish();
        Ok(exit_code)
    }
}

/// Creates a fresh [`ScriptedEngine`] per call, all sharing one recorder.
pub struct ScriptedFactory {
    script: EngineScript,
    recorder: EngineRecorder,
}

impl ScriptedFactory {
    pub fn new(script: EngineScript) -> Self {
        Self {
            script,
            recorder: EngineRecorder::new(),
        }
    }

    /// Recorder shared by every engine this factory creates.
    pub fn recorder(&self) -> EngineRecorder {
        self.recorder.clone()
    }
}

impl EngineFactory for ScriptedFactory {
    fn create(&self) -> Result<Box<dyn Engine>, EngineFault> {
        self.recorder.log().engines_created += 1;
        Ok(Box::new(ScriptedEngine::new(
            self.script.clone(),
            self.recorder.clone(),
        )))
    }
}
