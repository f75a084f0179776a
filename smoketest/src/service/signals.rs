//! Startup signalling between the output reader and the launching thread.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Lifecycle of a launched service as seen by its output reader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StartupState {
    /// Launched; no startup marker seen yet.
    #[default]
    Launching,
    /// A line carrying every startup marker was seen.
    Ready,
    /// Output ended before startup, or reading failed.
    Failed,
}

/// Shared startup state with a condition variable for bounded waits.
///
/// The output reader is the only writer; the launching thread only waits.
#[derive(Debug, Default)]
pub struct StartupSignals {
    state: Mutex<StartupState>,
    changed: Condvar,
}

impl StartupSignals {
    /// Signals in the [`StartupState::Launching`] state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> StartupState {
        *self.lock()
    }

    /// Record that startup completed. Has no effect once failed.
    pub fn ready(&self) {
        self.transition(|state| state == StartupState::Launching, StartupState::Ready);
    }

    /// Record a failure, whatever the current state.
    pub fn fail(&self) {
        self.transition(|_| true, StartupState::Failed);
    }

    /// Record end of output: a failure unless startup already completed.
    pub fn finish(&self) {
        self.transition(|state| state == StartupState::Launching, StartupState::Failed);
    }

    /// Block until the state leaves [`StartupState::Launching`] or `timeout`
    /// elapses; returns `None` on timeout.
    #[must_use]
    pub fn wait(&self, timeout: Duration) -> Option<StartupState> {
        let guard = self.lock();
        let (guard, result) = self
            .changed
            .wait_timeout_while(guard, timeout, |state| *state == StartupState::Launching)
            .unwrap_or_else(PoisonError::into_inner);
        if result.timed_out() && *guard == StartupState::Launching {
            None
        } else {
            Some(*guard)
        }
    }

    fn transition(&self, allowed: impl FnOnce(StartupState) -> bool, to: StartupState) {
        let mut state = self.lock();
        if allowed(*state) && *state != to {
            log::debug!("service startup state {:?} -> {to:?}", *state);
            *state = to;
            self.changed.notify_all();
        }
    }

    fn lock(&self) -> MutexGuard<'_, StartupState> {
        // The state is a plain enum, so a poisoned lock still holds a valid value.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
