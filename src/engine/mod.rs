// src/engine/mod.rs

//! Orchestration engine for a single task run.
//!
//! This module ties together:
//! - the task state machine (event log + current stage)
//! - the async runtime loop that reacts to:
//!   - task events posted by running steps
//!   - step completion notices
//!   - Ctrl-C
//! - failure and manual cleanup message formatting
//! - the event logger that shows progress to the user
//!
//! The pure state machine lives in [`state_machine`]; the async/IO shell is
//! implemented in [`runtime`].

use std::fmt;

use crate::execution::TaskEvent;
use crate::types::{CleanupBehaviour, OperatingSystem};

/// Identifies one dispatched step until it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(pub u64);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step-{}", self.0)
    }
}

/// Options used by both the state machine and the async shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub behaviour_after_failure: CleanupBehaviour,
    pub behaviour_after_success: CleanupBehaviour,
    /// Upper bound on steps executing at once. `None` means unbounded.
    pub max_parallelism: Option<usize>,
    pub operating_system: OperatingSystem,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            behaviour_after_failure: CleanupBehaviour::default(),
            behaviour_after_success: CleanupBehaviour::default(),
            max_parallelism: None,
            operating_system: OperatingSystem::current(),
        }
    }
}

/// Events flowing into the runtime from step runners and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A running step observed something.
    TaskEvent(TaskEvent),
    /// A step has finished and will post nothing more.
    StepFinished(StepId),
    /// The user asked to stop (e.g. Ctrl-C).
    Interrupted,
}

/// What a finished run reports back to the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRunResult {
    /// The task container's exit code, or -1 if the task failed or its
    /// containers were deliberately left behind.
    pub exit_code: i32,
    pub failed: bool,
    pub manual_cleanup_instructions: Option<String>,
}

pub mod event_logger;
pub mod messages;
pub mod runtime;
pub mod state_machine;

pub use event_logger::{ConsoleEventLogger, EventLogger};
pub use messages::FailureErrorMessageFormatter;
pub use runtime::TaskRuntime;
pub use state_machine::TaskStateMachine;
