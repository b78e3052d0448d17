//! Capacity-1 rendezvous channels between the engine and the consumer.
//!
//! ```text
//! Consumer thread                         Driver thread (engine callback)
//!     |                                        |
//!     |<--GateMessage::Observation-------------| publish()       [obs: bounded(1)]
//!     |--ActionMessage------------------------>| await_action()  [action: bounded(1)]
//!     |<--GateMessage::Observation-------------|
//!     |   ...                                  |
//!     |<--GateMessage::Done(RunOutcome)--------| driver, after run returns
//! ```
//!
//! Every blocking operation also watches a [`CancelSignal`] and a timeout,
//! so neither side can be parked forever by the other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use sluice_core::{Action, Observation};

use crate::driver::RunOutcome;

// ── Messages ─────────────────────────────────────────────────────

/// Engine-to-consumer message.
#[derive(Clone, Debug, PartialEq)]
pub enum GateMessage {
    /// A run-period observation.
    Observation(Observation),
    /// The run is over. Always the last message of a run.
    Done(RunOutcome),
}

/// Consumer-to-engine message: an action and the observation step it answers.
///
/// The gate discards actions answering an older step than the one it is
/// waiting on, except [`Action::Stop`], which is always honored.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionMessage {
    /// Step counter of the observation this action responds to.
    pub step: u64,
    /// The action.
    pub action: Action,
}

/// Result of a bounded send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendStatus {
    /// The message is in the channel.
    Sent,
    /// The channel stayed full for the whole timeout.
    TimedOut,
    /// Cancellation was requested while waiting.
    Cancelled,
    /// The other side is gone.
    Disconnected,
}

/// Result of a bounded receive.
#[derive(Clone, Debug, PartialEq)]
pub enum RecvStatus<T> {
    /// A message arrived.
    Received(T),
    /// Nothing arrived within the timeout.
    TimedOut,
    /// Cancellation was requested while waiting.
    Cancelled,
    /// The other side is gone and the channel is drained.
    Disconnected,
}

// ── Cancellation ─────────────────────────────────────────────────

/// Write side of a cancellation signal. Owned by the consumer session.
///
/// Dropping the trigger cancels.
#[derive(Debug)]
pub struct CancelTrigger {
    flag: Arc<AtomicBool>,
    wake: Option<Sender<()>>,
}

impl CancelTrigger {
    /// Request cancellation. Wakes every operation blocked on the paired
    /// [`CancelSignal`]. Idempotent.
    pub fn cancel(&mut self) {
        self.flag.store(true, Ordering::Release);
        // Dropping the only sender disconnects the wake channel, which makes
        // every `recv` on it ready.
        self.wake.take();
    }

    /// Whether [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl Drop for CancelTrigger {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Read side of a cancellation signal.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
    wake: Receiver<()>,
}

impl CancelSignal {
    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// A fresh, unset cancellation signal.
pub fn cancel_pair() -> (CancelTrigger, CancelSignal) {
    let flag = Arc::new(AtomicBool::new(false));
    let (tx, rx) = crossbeam_channel::bounded(0);
    (
        CancelTrigger {
            flag: Arc::clone(&flag),
            wake: Some(tx),
        },
        CancelSignal { flag, wake: rx },
    )
}

// ── Channel pair ─────────────────────────────────────────────────

/// Engine end of the rendezvous, owned by the timestep gate.
#[derive(Debug)]
pub struct EngineSide {
    obs_tx: Sender<GateMessage>,
    action_rx: Receiver<ActionMessage>,
    cancel: CancelSignal,
}

/// Consumer end of the rendezvous. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ConsumerSide {
    obs_rx: Receiver<GateMessage>,
    action_tx: Sender<ActionMessage>,
    cancel: CancelSignal,
}

/// Build both ends: two capacity-1 channels and a shared cancel signal.
pub fn channel_pair(cancel: CancelSignal) -> (EngineSide, ConsumerSide) {
    let (obs_tx, obs_rx) = crossbeam_channel::bounded(1);
    let (action_tx, action_rx) = crossbeam_channel::bounded(1);
    (
        EngineSide {
            obs_tx,
            action_rx,
            cancel: cancel.clone(),
        },
        ConsumerSide {
            obs_rx,
            action_tx,
            cancel,
        },
    )
}

impl EngineSide {
    /// Whether the consumer cancelled the session.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Publish a message, waiting at most `timeout` for the slot to free up.
    pub fn publish(&self, msg: GateMessage, timeout: Duration) -> SendStatus {
        crossbeam_channel::select! {
            send(self.obs_tx, msg) -> res => match res {
                Ok(()) => SendStatus::Sent,
                Err(_) => SendStatus::Disconnected,
            },
            recv(self.cancel.wake) -> _ => SendStatus::Cancelled,
            default(timeout) => SendStatus::TimedOut,
        }
    }

    /// Wait for the next action until `deadline`.
    pub fn await_action(&self, deadline: Instant) -> RecvStatus<ActionMessage> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        crossbeam_channel::select! {
            recv(self.action_rx) -> msg => match msg {
                Ok(m) => RecvStatus::Received(m),
                Err(_) => RecvStatus::Disconnected,
            },
            recv(self.cancel.wake) -> _ => RecvStatus::Cancelled,
            default(timeout) => RecvStatus::TimedOut,
        }
    }
}

impl ConsumerSide {
    /// Send an action, waiting at most `timeout` for the slot to free up.
    pub fn send_action(&self, msg: ActionMessage, timeout: Duration) -> SendStatus {
        crossbeam_channel::select! {
            send(self.action_tx, msg) -> res => match res {
                Ok(()) => SendStatus::Sent,
                Err(_) => SendStatus::Disconnected,
            },
            recv(self.cancel.wake) -> _ => SendStatus::Cancelled,
            default(timeout) => SendStatus::TimedOut,
        }
    }

    /// Non-blocking send. Returns `true` if the action was queued.
    pub fn try_send_action(&self, msg: ActionMessage) -> bool {
        self.action_tx.try_send(msg).is_ok()
    }

    /// Wait for the next engine message. `None` waits until a message,
    /// cancellation or disconnection.
    pub fn await_message(&self, timeout: Option<Duration>) -> RecvStatus<GateMessage> {
        let on_msg = |msg: Result<GateMessage, _>| match msg {
            Ok(m) => RecvStatus::Received(m),
            Err(crossbeam_channel::RecvError) => RecvStatus::Disconnected,
        };
        match timeout {
            Some(timeout) => crossbeam_channel::select! {
                recv(self.obs_rx) -> msg => on_msg(msg),
                recv(self.cancel.wake) -> _ => RecvStatus::Cancelled,
                default(timeout) => RecvStatus::TimedOut,
            },
            None => crossbeam_channel::select! {
                recv(self.obs_rx) -> msg => on_msg(msg),
                recv(self.cancel.wake) -> _ => RecvStatus::Cancelled,
            },
        }
    }

    /// Take a message that is already waiting, if any.
    pub fn try_message(&self) -> Option<GateMessage> {
        self.obs_rx.try_recv().ok()
    }
}
