// src/engine/runtime.rs

use std::collections::HashSet;
use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::{Result, TaskdockError};
use crate::exec::StepRunner;
use crate::execution::{TaskEvent, TaskFailure, TaskStep};

use super::event_logger::EventLogger;
use super::state_machine::TaskStateMachine;
use super::{RunOptions, RuntimeEvent, StepId, TaskRunResult};

/// Drives the task state machine in response to `RuntimeEvent`s and delegates
/// step execution to a `StepRunner`.
///
/// This is a pure IO shell around `TaskStateMachine`, which contains all the
/// execution semantics. This struct handles async IO: reading events from the
/// channel and dispatching steps to the runner.
pub struct TaskRuntime<R: StepRunner> {
    machine: TaskStateMachine,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    runner: R,
    logger: Box<dyn EventLogger>,
    options: RunOptions,
    running: HashSet<StepId>,
    next_step_id: u64,
    interrupted: bool,
}

impl<R: StepRunner> fmt::Debug for TaskRuntime<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRuntime")
            .field("machine", &self.machine)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl<R: StepRunner> TaskRuntime<R> {
    pub fn new(
        machine: TaskStateMachine,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        runner: R,
        logger: Box<dyn EventLogger>,
        options: RunOptions,
    ) -> Self {
        Self {
            machine,
            event_rx,
            runner,
            logger,
            options,
            running: HashSet::new(),
            next_step_id: 0,
            interrupted: false,
        }
    }

    /// Main event loop.
    ///
    /// - Dispatches every step the state machine has ready.
    /// - Waits for the next `RuntimeEvent` and folds it in.
    /// - Stops once nothing is running and no further step is returned.
    pub async fn run(mut self) -> Result<TaskRunResult> {
        info!("task runtime started");

        loop {
            self.dispatch_ready_steps().await?;

            if self.running.is_empty() {
                break;
            }

            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    return Err(TaskdockError::InvalidState(format!(
                        "runtime event channel closed with {} step(s) still running",
                        self.running.len()
                    )));
                }
            };

            debug!(?event, "runtime received event");
            self.handle_event(event).await?;
        }

        let result = self.result()?;
        info!(
            exit_code = result.exit_code,
            failed = result.failed,
            "task runtime finished"
        );
        Ok(result)
    }

    async fn handle_event(&mut self, event: RuntimeEvent) -> Result<()> {
        match event {
            RuntimeEvent::TaskEvent(event) => {
                self.logger.on_event(&event);
                self.machine.post_event(event);
            }
            RuntimeEvent::StepFinished(id) => {
                if !self.running.remove(&id) {
                    warn!(step_id = %id, "finish reported for a step that was not running");
                }
            }
            RuntimeEvent::Interrupted => {
                if self.interrupted || self.machine.in_cleanup_stage() {
                    info!("interrupt received while already stopping; ignoring");
                    return Ok(());
                }

                self.interrupted = true;
                let event = TaskEvent::Failed(TaskFailure::UserInterruptedExecution);
                self.logger.on_event(&event);
                self.machine.post_event(event);
                self.runner.cancel_running_steps().await?;
            }
        }
        Ok(())
    }

    async fn dispatch_ready_steps(&mut self) -> Result<()> {
        while self.has_capacity() {
            let steps_still_running = !self.running.is_empty();

            let Some(step) = self.machine.pop_next_step(steps_still_running)? else {
                break;
            };

            self.dispatch(step).await?;
        }
        Ok(())
    }

    fn has_capacity(&self) -> bool {
        self.options
            .max_parallelism
            .is_none_or(|max| self.running.len() < max)
    }

    async fn dispatch(&mut self, step: TaskStep) -> Result<()> {
        let id = StepId(self.next_step_id);
        self.next_step_id += 1;

        debug!(step_id = %id, ?step, "dispatching step");
        self.logger.on_step_starting(&step);
        self.running.insert(id);
        self.runner.run_step(id, step).await
    }

    fn result(&self) -> Result<TaskRunResult> {
        let failed = self.machine.task_has_failed();
        let manual_cleanup_instructions = self.machine.manual_cleanup_instructions().map(str::to_string);

        let exit_code = if failed || manual_cleanup_instructions.is_some() {
            -1
        } else {
            self.machine.task_exit_code().ok_or_else(|| {
                TaskdockError::InvalidState(
                    "task finished without the task container exiting".to_string(),
                )
            })?
        };

        Ok(TaskRunResult {
            exit_code,
            failed,
            manual_cleanup_instructions,
        })
    }
}
