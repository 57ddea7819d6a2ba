// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::Arc;

use tokio::sync::mpsc;

use taskdock::dag::DependencyGraph;
use taskdock::engine::{
    EventLogger, RunOptions, RuntimeEvent, TaskRunResult, TaskRuntime, TaskStateMachine,
};
use taskdock::execution::{TaskEvent, TaskStep};
use taskdock::types::OperatingSystem;
use taskdock_test_utils::FakeStepRunner;

/// Logger that discards everything; the runtime tests assert on steps.
pub struct SilentLogger;

impl EventLogger for SilentLogger {
    fn on_step_starting(&mut self, _step: &TaskStep) {}
    fn on_event(&mut self, _event: &TaskEvent) {}
}

pub fn options() -> RunOptions {
    RunOptions {
        operating_system: OperatingSystem::Other,
        ..Default::default()
    }
}

/// Build the runtime around a fake runner configured by `configure`, run it
/// to completion and return the result plus every dispatched step.
pub async fn run_with_fake(
    graph: Arc<DependencyGraph>,
    options: RunOptions,
    configure: impl FnOnce(FakeStepRunner) -> FakeStepRunner,
) -> (TaskRunResult, Vec<TaskStep>) {
    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let runner = configure(FakeStepRunner::new(Arc::clone(&graph), tx));
    let executed = runner.executed();

    let machine = TaskStateMachine::new(graph, options);
    let runtime = TaskRuntime::new(machine, rx, runner, Box::new(SilentLogger), options);

    let result = taskdock_test_utils::with_timeout(runtime.run())
        .await
        .expect("runtime failed");

    let steps = executed.lock().unwrap().clone();
    (result, steps)
}

pub fn count<F: Fn(&TaskStep) -> bool>(steps: &[TaskStep], pred: F) -> usize {
    steps.iter().filter(|s| pred(s)).count()
}
