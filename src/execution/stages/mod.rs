// src/execution/stages/mod.rs

//! Stages own the rules that have not fired yet.
//!
//! - [`run`]: the run stage and the planner that builds it from the graph.
//! - [`cleanup`]: the cleanup stage and the planner that builds it from the
//!   events that actually happened.

pub mod cleanup;
pub mod run;

use std::collections::BTreeSet;

use crate::execution::events::EventLog;
use crate::execution::rules::{RuleEvaluation, TaskStepRule};
use crate::execution::steps::TaskStep;

pub use cleanup::{CleanupStage, CleanupStagePlanner};
pub use run::{RunStage, RunStagePlanner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStepResult {
    /// A rule fired. The caller must execute the step.
    StepReady(TaskStep),
    /// Nothing can start right now; retry once a running step posts an event.
    NoStepsReady,
    /// No rules left and nothing in flight.
    StageComplete,
}

/// Pool of rules that have not fired yet.
///
/// A rule leaves the pool the moment it evaluates to ready and is never
/// evaluated again. Rules are kept sorted so that, given the same events, the
/// same rule fires first.
#[derive(Debug, Clone)]
pub struct Stage<R> {
    remaining: Vec<R>,
}

impl<R: TaskStepRule + Ord> Stage<R> {
    pub fn new(rules: impl IntoIterator<Item = R>) -> Self {
        let remaining: BTreeSet<R> = rules.into_iter().collect();
        Self {
            remaining: remaining.into_iter().collect(),
        }
    }

    /// Rules that have not fired yet.
    pub fn rules(&self) -> &[R] {
        &self.remaining
    }

    /// Fires at most one rule per call.
    pub fn pop_next_step(&mut self, events: &EventLog, steps_still_running: bool) -> NextStepResult {
        if self.remaining.is_empty() {
            return if steps_still_running {
                NextStepResult::NoStepsReady
            } else {
                NextStepResult::StageComplete
            };
        }

        let ready = self
            .remaining
            .iter()
            .enumerate()
            .find_map(|(index, rule)| match rule.evaluate(events) {
                RuleEvaluation::Ready(step) => Some((index, step)),
                RuleEvaluation::NotReady => None,
            });

        match ready {
            Some((index, step)) => {
                self.remaining.remove(index);
                NextStepResult::StepReady(step)
            }
            None => NextStepResult::NoStepsReady,
        }
    }
}
