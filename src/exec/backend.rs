// src/exec/backend.rs

//! Pluggable step runner abstraction.
//!
//! The runtime talks to a `StepRunner` instead of Docker directly, so tests
//! can swap in a fake that posts scripted events.
//!
//! - `DockerStepRunner` is the production implementation. It wraps the
//!   executor loop in [`spawn_executor`] and forwards commands over mpsc.
//! - Tests provide their own `StepRunner` that records which steps were
//!   dispatched and replies with `RuntimeEvent`s directly.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::engine::{RuntimeEvent, StepId};
use crate::errors::{Result, TaskdockError};
use crate::execution::TaskStep;

use super::executor_loop::{ExecutorCommand, spawn_executor};
use super::step_runner::StepContext;

/// How dispatched steps get executed.
///
/// Implementations must eventually send `RuntimeEvent::StepFinished(id)` for
/// every step passed to `run_step`, including cancelled ones.
pub trait StepRunner: Send {
    /// Start executing `step`. Returns once the step has been handed off, not
    /// when it completes.
    fn run_step(
        &mut self,
        id: StepId,
        step: TaskStep,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Abandon long-running steps after the user interrupts the task.
    fn cancel_running_steps(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Step runner that drives the `docker` CLI.
#[derive(Debug)]
pub struct DockerStepRunner {
    tx: mpsc::Sender<ExecutorCommand>,
}

impl DockerStepRunner {
    /// Spawns the background executor loop immediately.
    pub fn new(ctx: Arc<StepContext>, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        let tx = spawn_executor(ctx, runtime_tx);
        Self { tx }
    }

    fn send(&self, command: ExecutorCommand) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            tx.send(command)
                .await
                .map_err(|_| TaskdockError::InvalidState("executor loop has shut down".to_string()))
        })
    }
}

impl StepRunner for DockerStepRunner {
    fn run_step(
        &mut self,
        id: StepId,
        step: TaskStep,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.send(ExecutorCommand::Run(id, step))
    }

    fn cancel_running_steps(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.send(ExecutorCommand::CancelAll)
    }
}
