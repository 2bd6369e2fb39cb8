//! Processor state machine: Idle → Paused ⇄ Active → Stopped → ... → Destroyed.
//! Transitions are validated; subscribers observe changes through a watch channel.

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

/// All possible states of the consumer stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProcessorState {
    /// Constructed, worker thread never started.
    Idle,
    /// Worker alive, draining the queue and copying.
    Active,
    /// Worker alive, queue left untouched.
    Paused,
    /// Worker joined; may be started again.
    Stopped,
    /// Processor torn down.
    Destroyed,
}

impl std::fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessorState::Idle => write!(f, "Idle"),
            ProcessorState::Active => write!(f, "Active"),
            ProcessorState::Paused => write!(f, "Paused"),
            ProcessorState::Stopped => write!(f, "Stopped"),
            ProcessorState::Destroyed => write!(f, "Destroyed"),
        }
    }
}

impl ProcessorState {
    /// Returns whether transitioning from `self` to `next` is valid.
    pub fn can_transition_to(self, next: ProcessorState) -> bool {
        matches!(
            (self, next),
            (ProcessorState::Idle, ProcessorState::Active)
                | (ProcessorState::Idle, ProcessorState::Paused)
                | (ProcessorState::Active, ProcessorState::Paused)
                | (ProcessorState::Paused, ProcessorState::Active)
                | (ProcessorState::Active, ProcessorState::Stopped)
                | (ProcessorState::Paused, ProcessorState::Stopped)
                // restart after a full stop
                | (ProcessorState::Stopped, ProcessorState::Active)
                | (ProcessorState::Stopped, ProcessorState::Paused)
                | (ProcessorState::Idle, ProcessorState::Destroyed)
                | (ProcessorState::Stopped, ProcessorState::Destroyed)
        )
    }

    /// Whether the worker loop is running in this state.
    pub fn is_live(self) -> bool {
        matches!(self, ProcessorState::Active | ProcessorState::Paused)
    }
}

/// Thread-safe state holder with watch channel for reactive subscribers.
pub struct StateMachine {
    state: RwLock<ProcessorState>,
    state_tx: watch::Sender<ProcessorState>,
    state_rx: watch::Receiver<ProcessorState>,
}

impl StateMachine {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(ProcessorState::Idle);
        Self {
            state: RwLock::new(ProcessorState::Idle),
            state_tx,
            state_rx,
        }
    }

    /// Current state (non-blocking read).
    pub fn current(&self) -> ProcessorState {
        *self.state.read()
    }

    /// Attempt a state transition. Returns Ok(new_state) or Err with reason.
    /// Transitioning to the current state is a no-op.
    pub fn transition(&self, next: ProcessorState) -> Result<ProcessorState, String> {
        let mut state = self.state.write();
        let current = *state;
        if current == next {
            return Ok(next);
        }
        if !current.can_transition_to(next) {
            let msg = format!("invalid transition: {} -> {}", current, next);
            warn!("{}", msg);
            return Err(msg);
        }
        *state = next;
        let _ = self.state_tx.send(next);
        info!(from = %current, to = %next, "state_transition");
        Ok(next)
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ProcessorState> {
        self.state_rx.clone()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_lifecycle() {
        let sm = StateMachine::new();
        assert_eq!(sm.current(), ProcessorState::Idle);
        sm.transition(ProcessorState::Paused).unwrap();
        sm.transition(ProcessorState::Active).unwrap();
        sm.transition(ProcessorState::Stopped).unwrap();
        sm.transition(ProcessorState::Active).unwrap();
        sm.transition(ProcessorState::Stopped).unwrap();
        sm.transition(ProcessorState::Destroyed).unwrap();
    }

    #[test]
    fn test_rejects_illegal_transitions() {
        let sm = StateMachine::new();
        assert!(sm.transition(ProcessorState::Stopped).is_err());
        sm.transition(ProcessorState::Active).unwrap();
        assert!(sm.transition(ProcessorState::Idle).is_err());
        assert!(sm.transition(ProcessorState::Destroyed).is_err());
        sm.transition(ProcessorState::Stopped).unwrap();
        sm.transition(ProcessorState::Destroyed).unwrap();
        assert!(sm.transition(ProcessorState::Paused).is_err());
        assert_eq!(sm.current(), ProcessorState::Destroyed);
    }

    #[test]
    fn test_subscribers_see_changes() {
        let sm = StateMachine::new();
        let mut rx = sm.subscribe();
        assert!(!rx.has_changed().unwrap());
        sm.transition(ProcessorState::Paused).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ProcessorState::Paused);
    }
}
