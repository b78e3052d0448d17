//! Closed-loop episode runner.

use indexmap::IndexMap;
use sluice_core::{Controller, Observation, SimClock};
use tracing::info;

use crate::error::BridgeError;
use crate::interface::{CloseReport, StepInterface, Termination};

/// Knobs for [`run_episode`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EpisodeOptions {
    /// Stop after this many steps (then close the run). `None` runs to the end.
    pub max_steps: Option<u64>,
    /// Log progress every this many steps. `0` disables progress logs.
    pub log_interval: u64,
}

impl Default for EpisodeOptions {
    fn default() -> Self {
        Self {
            max_steps: None,
            log_interval: 96,
        }
    }
}

/// One row of the step log: the action taken and what followed.
#[derive(Clone, Debug, PartialEq)]
pub struct StepRecord {
    /// Step counter of the resulting observation.
    pub step: u64,
    /// Clock of the resulting observation.
    pub clock: SimClock,
    /// Scalar readings of the resulting observation.
    pub readings: IndexMap<String, f64>,
    /// Mean zone reading of the resulting observation.
    pub mean_zone: Option<f64>,
    /// Reward of the resulting observation.
    pub reward: f64,
    /// Kind of the action that led here.
    pub action: &'static str,
}

impl StepRecord {
    fn new(observation: &Observation, reward: f64, action: &'static str) -> Self {
        Self {
            step: observation.step,
            clock: observation.clock,
            readings: observation.readings.clone(),
            mean_zone: observation.mean_zone_reading(),
            reward,
            action,
        }
    }
}

/// Result of [`run_episode`].
#[derive(Clone, Debug, PartialEq)]
pub struct EpisodeSummary {
    /// Episode number assigned by the interface.
    pub episode: u64,
    /// Steps that produced an observation.
    pub steps: u64,
    /// Sum of per-step rewards.
    pub total_reward: f64,
    /// Why the run ended; `None` when cut short by `max_steps`.
    pub termination: Option<Termination>,
    /// Whether `max_steps` cut the run short.
    pub truncated: bool,
    /// Report of the closing `close()`.
    pub close: CloseReport,
    /// Per-step log.
    pub records: Vec<StepRecord>,
}

/// Run one episode: `reset()`, then `act` / `step` until done or
/// `max_steps`, then `close()`.
///
/// # Errors
///
/// Propagates errors from `reset()` and `step()`. The run is closed in
/// either case.
pub fn run_episode(
    env: &StepInterface,
    controller: &mut dyn Controller,
    options: &EpisodeOptions,
) -> Result<EpisodeSummary, BridgeError> {
    let result = drive(env, controller, options);
    let close = env.close();
    let (records, termination, truncated) = result?;
    let total_reward = records.iter().map(|r| r.reward).sum();
    info!(
        episode = env.episode(),
        steps = records.len(),
        total_reward,
        truncated,
        "episode finished"
    );
    Ok(EpisodeSummary {
        episode: env.episode(),
        steps: records.len() as u64,
        total_reward,
        termination,
        truncated,
        close,
        records,
    })
}

type Drive = (Vec<StepRecord>, Option<Termination>, bool);

fn drive(
    env: &StepInterface,
    controller: &mut dyn Controller,
    options: &EpisodeOptions,
) -> Result<Drive, BridgeError> {
    let mut observation = env.reset()?;
    let mut records = Vec::new();
    loop {
        if options.max_steps.is_some_and(|max| records.len() as u64 >= max) {
            return Ok((records, None, true));
        }
        let action = controller.act(&observation);
        let kind = action.kind();
        let out = env.step(Some(action))?;
        if out.done {
            return Ok((records, out.info.termination, false));
        }
        records.push(StepRecord::new(&out.observation, out.reward, kind));
        let n = records.len() as u64;
        if options.log_interval > 0 && n % options.log_interval == 0 {
            info!(
                step = n,
                outdoor_temp = out.observation.reading("outdoor_temp"),
                total_power_kw = out.observation.reading("total_power").map(|w| w / 1000.0),
                "progress"
            );
        }
        observation = out.observation;
    }
}
