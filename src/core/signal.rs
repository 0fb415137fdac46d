//! Single-shot completion signal.
//!
//! Every task owns one [`CompletionSignal`]. It fires exactly once, when the
//! task reaches a terminal state, and any number of [`CompletionWaiter`]s
//! cloned from it observe that state.

use thiserror::Error;
use tokio::sync::watch;

use super::types::TaskOutcome;

/// Errors that can occur while waiting for completion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// The task was dropped without ever reaching a terminal state.
    #[error("task was dropped before completing")]
    Abandoned,
}

/// The sending half, owned by the task.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: watch::Sender<Option<TaskOutcome>>,
}

impl CompletionSignal {
    /// Create a signal that has not fired yet.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Fire the signal.
    ///
    /// Returns `false` (and leaves the recorded outcome untouched) if the
    /// signal had already fired.
    pub fn complete(&self, outcome: TaskOutcome) -> bool {
        self.tx.send_if_modified(|state| {
            if state.is_some() {
                false
            } else {
                *state = Some(outcome);
                true
            }
        })
    }

    /// The outcome, if the signal has fired.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        *self.tx.borrow()
    }

    /// Whether the signal has fired.
    pub fn is_complete(&self) -> bool {
        self.outcome().is_some()
    }

    /// Create a waiter for this signal.
    pub fn waiter(&self) -> CompletionWaiter {
        CompletionWaiter {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle for waiting on a task's completion.
#[derive(Debug, Clone)]
pub struct CompletionWaiter {
    rx: watch::Receiver<Option<TaskOutcome>>,
}

impl CompletionWaiter {
    /// Wait until the task reaches a terminal state.
    ///
    /// Returns immediately if the signal already fired.
    pub async fn wait(&mut self) -> Result<TaskOutcome, CompletionError> {
        let state = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| CompletionError::Abandoned)?;
        (*state).ok_or(CompletionError::Abandoned)
    }

    /// The outcome, if the signal has fired.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        *self.rx.borrow()
    }
}
