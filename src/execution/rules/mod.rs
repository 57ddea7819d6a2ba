// src/execution/rules/mod.rs

//! Rules decide when a unit of work has become possible.
//!
//! A rule is a pure function of the event log. It never executes anything and
//! keeps no state of its own; the owning [`Stage`](crate::execution::stages::Stage)
//! tracks whether it has fired.

pub mod cleanup;
pub mod run;

use crate::execution::events::EventLog;
use crate::execution::steps::TaskStep;

pub use cleanup::{CleanupRule, ManualCleanupSortOrder};
pub use run::RunRule;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleEvaluation {
    NotReady,
    Ready(TaskStep),
}

pub trait TaskStepRule {
    fn evaluate(&self, events: &EventLog) -> RuleEvaluation;
}
