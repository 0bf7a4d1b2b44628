//! Lifecycle state machine: Idle → Booting → Installing → Starting → Serving,
//! with `Failed` reachable from anywhere and terminal.
//!
//! The current [`StatusSnapshot`] lives in a `watch` channel so embedders can
//! observe every transition. All check-and-set operations run under the
//! channel's lock, which makes the Idle → Booting guard atomic.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::error::OrchestratorError;

/// A stage of the launch sequence, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Boot,
    Install,
    Start,
    Serve,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Boot => write!(f, "boot"),
            Step::Install => write!(f, "install"),
            Step::Start => write!(f, "start"),
            Step::Serve => write!(f, "serve"),
        }
    }
}

/// Why the sequence ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub step: Step,
    pub message: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.step, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum LifecycleState {
    Idle,
    Booting,
    Installing,
    Starting,
    Serving,
    Failed(Failure),
}

impl LifecycleState {
    pub fn label(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Booting => "booting",
            LifecycleState::Installing => "installing",
            LifecycleState::Starting => "starting",
            LifecycleState::Serving => "serving",
            LifecycleState::Failed(_) => "failed",
        }
    }

    /// The step a failure in this state is attributed to.
    pub fn step(&self) -> Option<Step> {
        match self {
            LifecycleState::Idle => None,
            LifecycleState::Booting => Some(Step::Boot),
            LifecycleState::Installing => Some(Step::Install),
            LifecycleState::Starting => Some(Step::Start),
            LifecycleState::Serving => Some(Step::Serve),
            LifecycleState::Failed(failure) => Some(failure.step),
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            LifecycleState::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            LifecycleState::Idle => 0,
            LifecycleState::Booting => 1,
            LifecycleState::Installing => 2,
            LifecycleState::Starting => 3,
            LifecycleState::Serving => 4,
            LifecycleState::Failed(_) => 5,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Failed(failure) => write!(f, "failed ({failure})"),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub state: LifecycleState,
    pub at: DateTime<Utc>,
}

/// Current state plus every transition so far, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: LifecycleState,
    pub since: DateTime<Utc>,
    pub transitions: Vec<Transition>,
}

impl StatusSnapshot {
    fn initial() -> Self {
        let now = Utc::now();
        Self {
            state: LifecycleState::Idle,
            since: now,
            transitions: vec![Transition {
                state: LifecycleState::Idle,
                at: now,
            }],
        }
    }

    fn enter(&mut self, state: LifecycleState) {
        let now = Utc::now();
        self.transitions.push(Transition {
            state: state.clone(),
            at: now,
        });
        self.state = state;
        self.since = now;
    }

    /// Transitions recorded after the first `seen`, oldest first.
    pub fn transitions_after(&self, seen: usize) -> &[Transition] {
        self.transitions.get(seen..).unwrap_or_default()
    }

    /// Labels of every state visited, e.g. `["idle", "booting", ...]`.
    pub fn path(&self) -> Vec<&'static str> {
        self.transitions.iter().map(|t| t.state.label()).collect()
    }
}

#[derive(Debug)]
pub(crate) struct StateMachine {
    tx: watch::Sender<StatusSnapshot>,
}

impl StateMachine {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(StatusSnapshot::initial());
        Self { tx }
    }

    pub(crate) fn current(&self) -> LifecycleState {
        self.tx.borrow().state.clone()
    }

    pub(crate) fn snapshot(&self) -> StatusSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }

    /// Atomically move Idle → Booting. Any other state means a launch already ran.
    pub(crate) fn begin(&self) -> Result<(), OrchestratorError> {
        let mut seen = LifecycleState::Idle;
        let started = self.tx.send_if_modified(|snapshot| {
            if snapshot.state == LifecycleState::Idle {
                snapshot.enter(LifecycleState::Booting);
                true
            } else {
                seen = snapshot.state.clone();
                false
            }
        });
        if started {
            tracing::info!(state = "booting", "launch sequence started");
            Ok(())
        } else {
            Err(OrchestratorError::AlreadyStarted {
                state: seen.label(),
            })
        }
    }

    /// Move forward to `next`. Backward moves and moves out of `Failed` are ignored.
    pub(crate) fn advance(&self, next: LifecycleState) -> bool {
        let label = next.label();
        let moved = self.tx.send_if_modified(|snapshot| {
            if snapshot.state.failure().is_some() || next.rank() <= snapshot.state.rank() {
                return false;
            }
            snapshot.enter(next);
            true
        });
        if moved {
            tracing::info!(state = label, "lifecycle transition");
        }
        moved
    }

    /// Enter `Failed`. Returns `false` when already failed; the first failure wins.
    pub(crate) fn fail(&self, step: Step, message: impl Into<String>) -> bool {
        let failure = Failure {
            step,
            message: message.into(),
        };
        self.tx.send_if_modified(|snapshot| {
            if snapshot.state.failure().is_some() {
                return false;
            }
            snapshot.enter(LifecycleState::Failed(failure));
            true
        })
    }
}
