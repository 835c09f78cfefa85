//! Container provisioning state machine.
//!
//! ```text
//! Unprovisioned -> Resolving -> Running
//!                            -> Stopped -> Running          (teardown: stop)
//!                            -> Absent  -> Pulling -> Created -> Running
//!                                                           (teardown: remove)
//! ```
//!
//! The machine is independent of any engine client; the Docker target feeds
//! it events as engine calls complete.

use std::fmt;

use crate::core::errors::BakeError;

/// Provisioning state of the build container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Unprovisioned,
    Resolving,
    Running,
    Stopped,
    Absent,
    Pulling,
    Created,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerState::Unprovisioned => "unprovisioned",
            ContainerState::Resolving => "resolving",
            ContainerState::Running => "running",
            ContainerState::Stopped => "stopped",
            ContainerState::Absent => "absent",
            ContainerState::Pulling => "pulling",
            ContainerState::Created => "created",
        };
        write!(f, "{}", s)
    }
}

/// Observations and actions that move the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerEvent {
    /// Start looking up the configured container
    Inspect,
    /// The container exists
    Found { running: bool },
    /// No container with that id
    NotFound,
    /// A stopped container was restarted
    Restart,
    /// Image pull started
    Pull,
    /// Container created from the pulled image
    Create,
    /// Fresh container started
    Start,
}

/// What `close` does with the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Reused running container: only remove our temp tree
    CleanTemp,
    /// Container we restarted: clean temp tree, then stop it
    Stop,
    /// Container we created: remove it
    Remove,
}

/// Current state plus the teardown the path so far implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerLifecycle {
    state: ContainerState,
    teardown: Teardown,
}

impl Default for ContainerLifecycle {
    fn default() -> Self {
        ContainerLifecycle::new()
    }
}

impl ContainerLifecycle {
    pub fn new() -> Self {
        ContainerLifecycle {
            state: ContainerState::Unprovisioned,
            teardown: Teardown::CleanTemp,
        }
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub fn teardown(&self) -> Teardown {
        self.teardown
    }

    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }

    /// Apply an event, rejecting transitions the machine does not allow.
    pub fn apply(&mut self, event: ContainerEvent) -> Result<ContainerState, BakeError> {
        use ContainerEvent as E;
        use ContainerState as S;

        let (next, teardown) = match (self.state, event) {
            (S::Unprovisioned, E::Inspect) => (S::Resolving, self.teardown),
            (S::Resolving, E::Found { running: true }) => (S::Running, Teardown::CleanTemp),
            (S::Resolving, E::Found { running: false }) => (S::Stopped, self.teardown),
            (S::Resolving, E::NotFound) => (S::Absent, self.teardown),
            (S::Stopped, E::Restart) => (S::Running, Teardown::Stop),
            (S::Absent, E::Pull) => (S::Pulling, self.teardown),
            (S::Pulling, E::Create) => (S::Created, Teardown::Remove),
            (S::Created, E::Start) => (S::Running, Teardown::Remove),
            (state, event) => {
                return Err(BakeError::transport(
                    "docker",
                    format!("invalid container transition: {:?} while {}", event, state),
                ))
            }
        };

        tracing::debug!("container {} -> {}", self.state, next);
        self.state = next;
        self.teardown = teardown;
        Ok(next)
    }
}
