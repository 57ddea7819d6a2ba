// src/exec/executor_loop.rs

//! Background loop that owns every in-flight step.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::engine::{RuntimeEvent, StepId};
use crate::exec::step_runner::{EventSink, StepContext, is_cancellable, run_step};
use crate::execution::TaskStep;

/// Requests the runtime sends to the executor loop.
#[derive(Debug)]
pub enum ExecutorCommand {
    Run(StepId, TaskStep),
    /// Abandon every cancellable step that is still running.
    CancelAll,
}

/// Internal handle for a currently-running step.
///
/// - `cancel` is taken once the step has been asked to stop.
/// - `cancellable` is false for steps that must run to completion.
/// - `handle` is the Tokio task executing the step.
struct ActiveStep {
    cancel: Option<oneshot::Sender<()>>,
    cancellable: bool,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// Each step runs in its own Tokio task and reports back over `runtime_tx`.
/// Every step eventually sends `RuntimeEvent::StepFinished`, cancelled or not.
pub fn spawn_executor(
    ctx: Arc<StepContext>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> mpsc::Sender<ExecutorCommand> {
    let (tx, mut rx) = mpsc::channel::<ExecutorCommand>(32);

    tokio::spawn(async move {
        info!("executor loop started");

        let sink = EventSink::new(runtime_tx);
        let mut active: HashMap<StepId, ActiveStep> = HashMap::new();

        while let Some(command) = rx.recv().await {
            active.retain(|_, step| !step.handle.is_finished());

            match command {
                ExecutorCommand::Run(id, step) => {
                    let step = spawn_step(&ctx, &sink, id, step);
                    active.insert(id, step);
                }
                ExecutorCommand::CancelAll => cancel_all(&mut active),
            }
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

fn spawn_step(ctx: &Arc<StepContext>, sink: &EventSink, id: StepId, step: TaskStep) -> ActiveStep {
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let cancellable = is_cancellable(&step);
    let ctx = Arc::clone(ctx);
    let sink = sink.clone();

    let handle = tokio::spawn(async move {
        run_step(ctx, id, step, sink, cancel_rx).await;
        debug!(step_id = %id, "step runner future finished");
    });

    ActiveStep {
        cancel: Some(cancel_tx),
        cancellable,
        handle,
    }
}

fn cancel_all(active: &mut HashMap<StepId, ActiveStep>) {
    for (id, step) in active.iter_mut() {
        if !step.cancellable {
            debug!(step_id = %id, "step cannot be cancelled; letting it finish");
            continue;
        }

        match step.cancel.take() {
            Some(cancel) => {
                info!(step_id = %id, "cancelling running step");
                if cancel.send(()).is_err() {
                    debug!(step_id = %id, "step already finished while cancelling");
                }
            }
            None => debug!(step_id = %id, "step was already cancelled"),
        }
    }
}
