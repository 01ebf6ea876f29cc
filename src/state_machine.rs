//! Per-attempt state machine.
//!
//! ```text
//! Idle -> CheckingForUpdate -> NoUpdate -> Idle
//!                           -> Downloading -> Extracting -> Installing
//!                                 -> AllApplied -> Idle
//!                                 -> PartiallyDeferred -> AwaitingRestart
//!                                 -> Failed -> Idle
//! ```
//!
//! `AwaitingRestart` is terminal for the process; only the next start's
//! reconciliation pass resolves it.

use log::debug;

use crate::error::{Result, UpdateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    CheckingForUpdate,
    NoUpdate,
    Downloading,
    Extracting,
    Installing,
    AllApplied,
    PartiallyDeferred,
    AwaitingRestart,
    Failed,
}

impl AttemptState {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: AttemptState) -> bool {
        use AttemptState::*;

        matches!(
            (self, next),
            (Idle, CheckingForUpdate)
                | (CheckingForUpdate, NoUpdate)
                | (CheckingForUpdate, Downloading)
                | (NoUpdate, Idle)
                | (Downloading, Extracting)
                | (Extracting, Installing)
                | (Installing, AllApplied)
                | (Installing, PartiallyDeferred)
                | (AllApplied, Idle)
                | (PartiallyDeferred, AwaitingRestart)
                | (Failed, Idle)
                | (CheckingForUpdate | Downloading | Extracting | Installing, Failed)
        )
    }

    /// States in which the attempt is actively doing work
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            AttemptState::CheckingForUpdate
                | AttemptState::Downloading
                | AttemptState::Extracting
                | AttemptState::Installing
        )
    }
}

/// Tracks the current state of one attempt and rejects illegal moves.
#[derive(Debug)]
pub struct StateMachine {
    state: AttemptState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self {
            state: AttemptState::Idle,
        }
    }
}

impl StateMachine {
    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn advance(&mut self, next: AttemptState) -> Result<AttemptState> {
        if !self.state.can_transition_to(next) {
            return Err(UpdateError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("attempt state {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(next)
    }

    /// Move to `Failed` from any busy state; a no-op otherwise.
    pub fn fail(&mut self) -> AttemptState {
        if self.state.is_busy() {
            self.state = AttemptState::Failed;
        }
        self.state
    }
}
