//! Bridge counters.
//!
//! [`BridgeMetrics`] is shared between the gate (driver thread) and the
//! step interface (consumer thread) and is only ever incremented.
//! [`MetricsSnapshot`] is the plain copy handed to callers.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of [`BridgeMetrics`]. Counters are cumulative over
/// the lifetime of a [`StepInterface`](crate::StepInterface), across resets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Run-period observations handed to the consumer channel.
    pub observations_published: u64,
    /// Observations dropped because the channel stayed full.
    pub observations_dropped: u64,
    /// Actions that wrote at least one actuator.
    pub actions_applied: u64,
    /// Engine-side waits that ended without an action (no-op substituted).
    pub engine_action_timeouts: u64,
    /// Actions discarded because they answered an older observation.
    pub stale_actions_discarded: u64,
    /// Callbacks skipped during warm-up.
    pub skipped_warmup: u64,
    /// Callbacks skipped outside the run period (sizing, design days).
    pub skipped_sizing: u64,
    /// Points that failed to resolve.
    pub unresolved_handles: u64,
    /// Completed `step()` calls that reached the engine.
    pub consumer_steps: u64,
    /// `step()` calls that timed out waiting for the engine.
    pub consumer_timeouts: u64,
}

/// Shared atomic counters.
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    observations_published: AtomicU64,
    observations_dropped: AtomicU64,
    actions_applied: AtomicU64,
    engine_action_timeouts: AtomicU64,
    stale_actions_discarded: AtomicU64,
    skipped_warmup: AtomicU64,
    skipped_sizing: AtomicU64,
    unresolved_handles: AtomicU64,
    consumer_steps: AtomicU64,
    consumer_timeouts: AtomicU64,
}

macro_rules! counters {
    ($($field:ident => $inc:ident),* $(,)?) => {
        impl BridgeMetrics {
            $(
                #[doc = concat!("Increment `", stringify!($field), "`.")]
                pub fn $inc(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*
        }
    };
}

counters! {
    observations_published => record_published,
    observations_dropped => record_dropped,
    actions_applied => record_applied,
    engine_action_timeouts => record_engine_timeout,
    stale_actions_discarded => record_stale_action,
    skipped_warmup => record_skipped_warmup,
    skipped_sizing => record_skipped_sizing,
    consumer_steps => record_consumer_step,
    consumer_timeouts => record_consumer_timeout,
}

impl BridgeMetrics {
    /// Add `n` unresolved points.
    pub fn record_unresolved(&self, n: usize) {
        self.unresolved_handles
            .fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Copy every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            observations_published: load(&self.observations_published),
            observations_dropped: load(&self.observations_dropped),
            actions_applied: load(&self.actions_applied),
            engine_action_timeouts: load(&self.engine_action_timeouts),
            stale_actions_discarded: load(&self.stale_actions_discarded),
            skipped_warmup: load(&self.skipped_warmup),
            skipped_sizing: load(&self.skipped_sizing),
            unresolved_handles: load(&self.unresolved_handles),
            consumer_steps: load(&self.consumer_steps),
            consumer_timeouts: load(&self.consumer_timeouts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        assert_eq!(BridgeMetrics::default().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn counters_are_independent() {
        let m = BridgeMetrics::default();
        m.record_published();
        m.record_published();
        m.record_engine_timeout();
        m.record_unresolved(3);

        let s = m.snapshot();
        assert_eq!(s.observations_published, 2);
        assert_eq!(s.engine_action_timeouts, 1);
        assert_eq!(s.unresolved_handles, 3);
        assert_eq!(s.actions_applied, 0);
        assert_eq!(s.consumer_timeouts, 0);
    }
}
