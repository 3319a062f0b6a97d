//! Single-flight coordination for token refresh.
//!
//! The state machine is `Idle -> Refreshing { waiters } -> Idle`. The caller
//! that moves it out of `Idle` becomes the leader and performs the refresh;
//! everyone who arrives while it is `Refreshing` gets a receiver instead. The
//! leader hands the outcome to [`RefreshState::finish`], which drains the
//! waiters and returns to `Idle` in one step.
//!
//! The state lives behind the session mutex, so `join` and `finish` are each
//! atomic with respect to every other task.

use std::mem;

use tokio::sync::oneshot;

use quire_core::AccessToken;
use quire_core::error::AuthError;

/// What each participant in a refresh receives.
pub(crate) type RefreshOutcome = Result<AccessToken, AuthError>;

/// Role handed out by [`RefreshState::join`].
#[derive(Debug)]
pub(crate) enum Ticket {
    /// Perform the refresh and report back through `finish`.
    Lead,
    /// Wait for the leader's outcome.
    Wait(oneshot::Receiver<RefreshOutcome>),
}

#[derive(Debug, Default)]
pub(crate) enum RefreshState {
    #[default]
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    },
}

impl RefreshState {
    pub(crate) fn is_refreshing(&self) -> bool {
        matches!(self, RefreshState::Refreshing { .. })
    }

    pub(crate) fn waiter_count(&self) -> usize {
        match self {
            RefreshState::Idle => 0,
            RefreshState::Refreshing { waiters } => waiters.len(),
        }
    }

    /// Become the leader if idle, otherwise queue behind the running refresh.
    pub(crate) fn join(&mut self) -> Ticket {
        match self {
            RefreshState::Idle => {
                *self = RefreshState::Refreshing {
                    waiters: Vec::new(),
                };
                Ticket::Lead
            }
            RefreshState::Refreshing { waiters } => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Ticket::Wait(rx)
            }
        }
    }

    /// Return to `Idle` and deliver `outcome` to every waiter.
    ///
    /// Returns the number of waiters notified.
    pub(crate) fn finish(&mut self, outcome: &RefreshOutcome) -> usize {
        let waiters = match mem::take(self) {
            RefreshState::Idle => return 0,
            RefreshState::Refreshing { waiters } => waiters,
        };

        let count = waiters.len();
        for waiter in waiters {
            // A waiter whose request was dropped has gone away; nothing to do.
            let _ = waiter.send(outcome.clone());
        }
        count
    }
}
