//! Worker lifecycle state machine.
//!
//! ```text
//! Parsed -> Installing -> Installed -> Activating -> Activated
//!    \__________\______________\____________\__________-> Redundant
//! ```
//!
//! Each transition is published on a watch channel so the hosting runtime
//! can await readiness instead of polling.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

use vrcache_core::Error;

/// Lifecycle states of one worker version, in lifecycle order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    #[default]
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Superseded by a newer version.
    Redundant,
}

impl WorkerState {
    /// Only an activated worker intercepts fetches.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Redundant)
    }

    fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        match (self, next) {
            (Parsed, Installing) | (Installing, Installed) | (Installed, Activating) | (Activating, Activated) => {
                true
            }
            (Redundant, _) => false,
            (_, Redundant) => true,
            _ => false,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Current state plus a readiness channel.
#[derive(Debug)]
pub struct Lifecycle {
    tx: watch::Sender<WorkerState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(WorkerState::Parsed);
        Self { tx }
    }

    pub fn state(&self) -> WorkerState {
        *self.tx.borrow()
    }

    /// Move to `next`, rejecting anything the state machine does not allow.
    pub fn transition(&self, next: WorkerState) -> Result<(), Error> {
        let mut result = Ok(());
        self.tx.send_if_modified(|current| {
            if current.can_transition_to(next) {
                tracing::debug!(from = %current, to = %next, "worker state change");
                *current = next;
                true
            } else {
                result = Err(Error::InvalidState(format!("cannot move from {current} to {next}")));
                false
            }
        });
        result
    }

    /// Resolve once the worker reaches `target` (or anything after it).
    ///
    /// Fails if the worker turns redundant first.
    pub async fn wait_for(&self, target: WorkerState) -> Result<(), Error> {
        let mut rx = self.tx.subscribe();
        let reached = rx
            .wait_for(|state| *state >= target)
            .await
            .map_err(|_| Error::InvalidState("lifecycle channel closed".into()))?;
        if reached.is_terminal() && target != WorkerState::Redundant {
            return Err(Error::InvalidState(format!("worker became redundant before {target}")));
        }
        Ok(())
    }
}
