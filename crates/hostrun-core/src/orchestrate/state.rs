use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of one orchestrated run.
///
/// `Received → LockAcquired → Dispatched → (Completed | TimedOut)`. The two
/// terminal states race; whichever transition wins from `Dispatched`
/// decides whether the real result reaches the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Received = 0,
    LockAcquired = 1,
    Dispatched = 2,
    Completed = 3,
    TimedOut = 4,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RunState::Received,
            1 => RunState::LockAcquired,
            2 => RunState::Dispatched,
            3 => RunState::Completed,
            _ => RunState::TimedOut,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::TimedOut)
    }
}

/// Atomic holder for a [`RunState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(RunState::Received as u8))
    }

    pub fn get(&self) -> RunState {
        RunState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`. Fails if the state is no longer `from`.
    pub fn advance(&self, from: RunState, to: RunState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_one_terminal_transition_wins() {
        let cell = StateCell::new();
        assert!(cell.advance(RunState::Received, RunState::LockAcquired));
        assert!(cell.advance(RunState::LockAcquired, RunState::Dispatched));
        assert!(cell.advance(RunState::Dispatched, RunState::TimedOut));
        assert!(!cell.advance(RunState::Dispatched, RunState::Completed));
        assert_eq!(cell.get(), RunState::TimedOut);
        assert!(cell.get().is_terminal());
    }

    #[test]
    fn test_out_of_order_transition_is_rejected() {
        let cell = StateCell::new();
        assert!(!cell.advance(RunState::Dispatched, RunState::Completed));
        assert_eq!(cell.get(), RunState::Received);
    }
}
