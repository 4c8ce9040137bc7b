//! Set-once completion signal for one session turn.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{Result, ScgError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionState {
    Pending,
    /// `session.idle` arrived.
    Idle,
    /// `session.error` arrived with this message.
    Failed(String),
}

/// Leaves [`CompletionState::Pending`] at most once; later `set`/`fail`
/// calls are no-ops. Clones share the same state.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    tx: Arc<watch::Sender<CompletionState>>,
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(CompletionState::Pending);
        Self { tx: Arc::new(tx) }
    }

    /// Mark the turn as finished. Returns `true` only for the transition.
    pub fn set(&self) -> bool {
        self.settle(CompletionState::Idle)
    }

    /// Mark the turn as failed. Returns `true` only for the transition.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.settle(CompletionState::Failed(message.into()))
    }

    fn settle(&self, outcome: CompletionState) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == CompletionState::Pending {
                *state = outcome;
                true
            } else {
                false
            }
        })
    }

    pub fn state(&self) -> CompletionState {
        self.tx.borrow().clone()
    }

    pub fn is_set(&self) -> bool {
        self.state() == CompletionState::Idle
    }

    /// Wait until the signal leaves `Pending`. A failure comes back as
    /// [`ScgError::Session`].
    pub async fn wait(&self) -> Result<()> {
        let mut rx = self.tx.subscribe();
        let state = rx
            .wait_for(|state| *state != CompletionState::Pending)
            .await
            .map_err(|_| ScgError::Session("completion signal dropped".to_string()))?
            .clone();
        match state {
            CompletionState::Failed(message) => Err(ScgError::Session(message)),
            _ => Ok(()),
        }
    }
}
