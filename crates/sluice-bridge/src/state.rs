//! Monotonic controller state shared between the gate and the consumer.

use std::sync::atomic::{AtomicU8, Ordering};

use sluice_core::ControllerState;

/// Lock-free [`ControllerState`] cell that only ever moves forward
/// (`Idle → Running → Stopping → Done`).
///
/// A backwards transition is ignored. A fresh cell is created for every run.
#[derive(Debug, Default)]
pub struct StateCell(AtomicU8);

impl StateCell {
    /// New cell in [`ControllerState::Idle`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn get(&self) -> ControllerState {
        ControllerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `next` if it is ahead of the current state. Returns the
    /// state before the call.
    pub fn advance(&self, next: ControllerState) -> ControllerState {
        ControllerState::from_u8(self.0.fetch_max(next.as_u8(), Ordering::AcqRel))
    }

    /// Whether the run reached [`ControllerState::Done`].
    pub fn is_done(&self) -> bool {
        self.get().is_done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn starts_idle_and_never_goes_back() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), ControllerState::Idle);
        assert_eq!(cell.advance(ControllerState::Stopping), ControllerState::Idle);
        assert_eq!(cell.advance(ControllerState::Running), ControllerState::Stopping);
        assert_eq!(cell.get(), ControllerState::Stopping);
        cell.advance(ControllerState::Done);
        assert!(cell.is_done());
    }

    fn state() -> impl Strategy<Value = ControllerState> {
        prop_oneof![
            Just(ControllerState::Idle),
            Just(ControllerState::Running),
            Just(ControllerState::Stopping),
            Just(ControllerState::Done),
        ]
    }

    proptest! {
        #[test]
        fn state_is_max_of_transitions(seq in proptest::collection::vec(state(), 0..16)) {
            let cell = StateCell::new();
            for s in &seq {
                cell.advance(*s);
            }
            let expected = seq.iter().copied().max().unwrap_or(ControllerState::Idle);
            prop_assert_eq!(cell.get(), expected);
        }
    }
}
