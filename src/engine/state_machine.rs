// src/engine/state_machine.rs

//! Pure task state machine.
//!
//! Owns the event log and the current stage, and decides which step should
//! run next. It has no channels, no Tokio types and performs no I/O, so it
//! can be driven step by step in unit tests.

use std::sync::Arc;

use tracing::{debug, info};

use crate::dag::DependencyGraph;
use crate::engine::messages::FailureErrorMessageFormatter;
use crate::engine::RunOptions;
use crate::errors::{Result, TaskdockError};
use crate::execution::{
    CleanupStage, CleanupStagePlanner, EventLog, NextStepResult, RunStage, RunStagePlanner,
    TaskEvent, TaskStep,
};
use crate::types::CleanupBehaviour;

#[derive(Debug)]
enum CurrentStage {
    Run(RunStage),
    Cleanup(CleanupStage),
    /// Cleanup was skipped; nothing more will be returned.
    Abandoned,
}

#[derive(Debug)]
pub struct TaskStateMachine {
    graph: Arc<DependencyGraph>,
    options: RunOptions,
    formatter: FailureErrorMessageFormatter,
    events: EventLog,
    stage: CurrentStage,
    task_has_failed: bool,
    task_failed_during_cleanup: bool,
    manual_cleanup_instructions: Option<String>,
}

impl TaskStateMachine {
    pub fn new(graph: Arc<DependencyGraph>, options: RunOptions) -> Self {
        let stage = RunStagePlanner::new(&graph).create_stage();
        let formatter =
            FailureErrorMessageFormatter::new(graph.clone(), options.behaviour_after_failure);

        Self {
            graph,
            options,
            formatter,
            events: EventLog::new(),
            stage: CurrentStage::Run(stage),
            task_has_failed: false,
            task_failed_during_cleanup: false,
            manual_cleanup_instructions: None,
        }
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn task_has_failed(&self) -> bool {
        self.task_has_failed
    }

    pub fn in_cleanup_stage(&self) -> bool {
        matches!(self.stage, CurrentStage::Cleanup(_))
    }

    /// Exit code of the task container, once it has exited.
    pub fn task_exit_code(&self) -> Option<i32> {
        self.events.exit_code_of(self.graph.task_container())
    }

    /// Text telling the user what to clean up by hand, if anything.
    pub fn manual_cleanup_instructions(&self) -> Option<&str> {
        self.manual_cleanup_instructions.as_deref()
    }

    pub fn post_event(&mut self, event: TaskEvent) {
        debug!(?event, "event received");

        let is_failure = event.is_failure();
        if !self.events.insert(event) {
            return;
        }

        if is_failure {
            self.task_has_failed = true;

            if let CurrentStage::Cleanup(stage) = &self.stage {
                self.task_failed_during_cleanup = true;
                let message = self
                    .formatter
                    .format_manual_cleanup_message_after_cleanup_failure(
                        stage.manual_cleanup_instructions(),
                    );
                self.manual_cleanup_instructions = (!message.is_empty()).then_some(message);
            }
        }
    }

    /// Next step to execute, or `None` if nothing can start right now.
    ///
    /// `None` with `steps_still_running == false` means the task is finished.
    pub fn pop_next_step(&mut self, steps_still_running: bool) -> Result<Option<TaskStep>> {
        if self.task_has_failed && matches!(self.stage, CurrentStage::Run(_)) {
            if steps_still_running {
                debug!("task has failed, not returning further work while existing work completes");
                return Ok(None);
            }

            info!("task has failed and existing work has finished, beginning cleanup");
            return self.start_cleanup_stage();
        }

        let result = match &mut self.stage {
            CurrentStage::Run(stage) => stage.pop_next_step(&self.events, steps_still_running),
            CurrentStage::Cleanup(stage) => stage.pop_next_step(&self.events, steps_still_running),
            CurrentStage::Abandoned => return Ok(None),
        };

        match result {
            NextStepResult::StepReady(step) => {
                debug!(?step, "step is ready to execute");
                Ok(Some(step))
            }
            NextStepResult::NoStepsReady => {
                if !steps_still_running && !self.task_failed_during_cleanup {
                    self.task_has_failed = true;
                    return Err(TaskdockError::InvalidState(
                        "none of the remaining steps are ready to execute, but there are no steps currently running"
                            .to_string(),
                    ));
                }

                Ok(None)
            }
            NextStepResult::StageComplete => self.handle_stage_complete(steps_still_running),
        }
    }

    fn handle_stage_complete(&mut self, steps_still_running: bool) -> Result<Option<TaskStep>> {
        if steps_still_running {
            debug!("no steps remaining, but some steps are still running");
            return Ok(None);
        }

        match self.stage {
            CurrentStage::Run(_) => {
                info!("run stage complete, switching to cleanup stage");
                self.start_cleanup_stage()
            }
            CurrentStage::Cleanup(ref stage) => {
                if !self.task_has_failed
                    && self.options.behaviour_after_success == CleanupBehaviour::DontCleanup
                    && self.events.any_container_created()
                {
                    let message = self
                        .formatter
                        .format_manual_cleanup_message_after_task_success_with_cleanup_disabled(
                            &self.events,
                            stage.manual_cleanup_instructions(),
                        )?;
                    self.manual_cleanup_instructions = Some(message);
                }

                info!("cleanup stage complete, no work left to do");
                Ok(None)
            }
            CurrentStage::Abandoned => Ok(None),
        }
    }

    fn start_cleanup_stage(&mut self) -> Result<Option<TaskStep>> {
        // Nothing to investigate without containers, so always clean up then.
        let behaviour = if !self.events.any_container_created() {
            CleanupBehaviour::Cleanup
        } else if self.task_has_failed {
            self.options.behaviour_after_failure
        } else {
            self.options.behaviour_after_success
        };

        let stage = CleanupStagePlanner::new(&self.graph, self.options.operating_system)
            .create_stage(&self.events, behaviour);

        if self.task_has_failed
            && self.options.behaviour_after_failure == CleanupBehaviour::DontCleanup
            && self.events.any_container_created()
        {
            let message = self
                .formatter
                .format_manual_cleanup_message_after_task_failure_with_cleanup_disabled(
                    &self.events,
                    stage.manual_cleanup_instructions(),
                )?;

            info!("cleanup after failure is disabled, leaving created containers in place");
            self.manual_cleanup_instructions = Some(message);
            self.stage = CurrentStage::Abandoned;
            return Ok(None);
        }

        self.stage = CurrentStage::Cleanup(stage);
        self.pop_next_step(false)
    }
}
