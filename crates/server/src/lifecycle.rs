//! Worker lifecycle state machine.
//!
//! ```text
//! Uninitialized --install--> Installing --ok--> Waiting --activate--> Active
//!                               |                  ^                    |
//!                               +--err (restore)   +------install-------+
//! ```

use crate::error::{ProxyError, ProxyResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Lifecycle state of the worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerLifecycleState {
    Uninitialized,
    Installing,
    Waiting,
    Active,
}

impl WorkerLifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Installing => "installing",
            Self::Waiting => "waiting",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for WorkerLifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host events the worker handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    Install,
    Activate,
}

/// Registration flags plus the current state.
///
/// Transitions are checked under one lock so concurrent installs cannot
/// interleave.
pub struct Lifecycle {
    state: Mutex<WorkerLifecycleState>,
    install_registered: AtomicBool,
    activate_registered: AtomicBool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WorkerLifecycleState::Uninitialized),
            install_registered: AtomicBool::new(false),
            activate_registered: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> WorkerLifecycleState {
        *self.state.lock()
    }

    fn flag(&self, event: LifecycleEvent) -> &AtomicBool {
        match event {
            LifecycleEvent::Install => &self.install_registered,
            LifecycleEvent::Activate => &self.activate_registered,
        }
    }

    /// Register the handler for `event`. Returns `false` if it was already registered.
    pub fn register(&self, event: LifecycleEvent) -> bool {
        !self.flag(event).swap(true, Ordering::AcqRel)
    }

    pub fn is_registered(&self, event: LifecycleEvent) -> bool {
        self.flag(event).load(Ordering::Acquire)
    }

    fn ensure_registered(&self, event: LifecycleEvent) -> ProxyResult<()> {
        if self.is_registered(event) {
            Ok(())
        } else {
            Err(ProxyError::Lifecycle(format!("no handler registered for {event:?}")))
        }
    }

    /// Enter `Installing`, returning the state to restore if installation fails.
    pub fn begin_install(&self) -> ProxyResult<WorkerLifecycleState> {
        self.ensure_registered(LifecycleEvent::Install)?;
        let mut state = self.state.lock();
        match *state {
            WorkerLifecycleState::Installing => Err(ProxyError::Lifecycle(
                "install already in progress".to_string(),
            )),
            previous => {
                *state = WorkerLifecycleState::Installing;
                Ok(previous)
            }
        }
    }

    /// Leave `Installing` for `Waiting`.
    pub fn finish_install(&self) {
        let mut state = self.state.lock();
        if *state == WorkerLifecycleState::Installing {
            *state = WorkerLifecycleState::Waiting;
        }
    }

    /// Leave `Installing`, restoring `previous`.
    pub fn abort_install(&self, previous: WorkerLifecycleState) {
        let mut state = self.state.lock();
        if *state == WorkerLifecycleState::Installing {
            *state = previous;
        }
    }

    /// Move `Waiting` to `Active`.
    pub fn activate(&self) -> ProxyResult<()> {
        self.ensure_registered(LifecycleEvent::Activate)?;
        let mut state = self.state.lock();
        match *state {
            WorkerLifecycleState::Waiting => {
                *state = WorkerLifecycleState::Active;
                Ok(())
            }
            other => Err(ProxyError::Lifecycle(format!(
                "cannot activate from {other}"
            ))),
        }
    }
}
