// tests/runtime_fake_runner.rs

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc;
use tokio::time::{Duration, sleep};

use taskdock::dag::DependencyGraph;
use taskdock::engine::{RunOptions, RuntimeEvent, TaskRuntime, TaskStateMachine};
use taskdock::execution::{TaskFailure, TaskStep};
use taskdock::types::CleanupBehaviour;
use taskdock_test_utils::{
    ConfigFileBuilder, ContainerConfigBuilder, FakeStepRunner, TaskConfigBuilder, init_tracing,
    with_timeout,
};

use crate::common::{SilentLogger, count, options, run_with_fake};

/// app -> db, where db has a health check and a setup command.
fn app_with_database() -> Arc<DependencyGraph> {
    ConfigFileBuilder::new()
        .with_container(
            "app",
            ContainerConfigBuilder::build_directory("app")
                .depends_on(&["db"])
                .build(),
        )
        .with_container(
            "db",
            ContainerConfigBuilder::image("postgres:16")
                .health_check("pg_isready")
                .setup_command("psql -c 'select 1'")
                .build(),
        )
        .with_task("test", TaskConfigBuilder::new("app").command("cargo test").build())
        .graph_for("test")
}

fn assert_each_step_dispatched_once(steps: &[TaskStep]) {
    let unique: HashSet<&TaskStep> = steps.iter().collect();
    assert_eq!(unique.len(), steps.len(), "a step was dispatched twice: {steps:#?}");
}

fn position(steps: &[TaskStep], pred: impl Fn(&TaskStep) -> bool) -> usize {
    steps.iter().position(pred).expect("step was never dispatched")
}

#[tokio::test]
async fn successful_task_runs_dependencies_then_cleans_everything_up() {
    init_tracing();
    let graph = app_with_database();
    let app = graph.find("app").unwrap();
    let db = graph.find("db").unwrap();

    let (result, steps) = run_with_fake(Arc::clone(&graph), options(), |r| r).await;

    assert_eq!(result.exit_code, 0);
    assert!(!result.failed);
    assert!(result.manual_cleanup_instructions.is_none());
    assert_each_step_dispatched_once(&steps);

    // The database is started in the background; the app runs attached.
    assert_eq!(
        count(&steps, |s| matches!(s, TaskStep::StartContainer { container, .. } if *container == db)),
        1
    );
    assert_eq!(
        count(&steps, |s| matches!(s, TaskStep::RunContainer { container, .. } if *container == app)),
        1
    );

    let db_ready = position(&steps, |s| {
        matches!(s, TaskStep::RunContainerSetupCommands { container, .. } if *container == db)
    });
    let app_run = position(&steps, |s| matches!(s, TaskStep::RunContainer { .. }));
    assert!(db_ready < app_run);

    assert_eq!(count(&steps, |s| matches!(s, TaskStep::RemoveContainer { .. })), 2);
    assert_eq!(count(&steps, |s| matches!(s, TaskStep::DeleteTaskNetwork { .. })), 1);

    let last_removal = steps
        .iter()
        .rposition(|s| matches!(s, TaskStep::RemoveContainer { .. }))
        .unwrap();
    let network_deleted = position(&steps, |s| matches!(s, TaskStep::DeleteTaskNetwork { .. }));
    assert!(last_removal < network_deleted);
}

#[tokio::test]
async fn task_exit_code_is_passed_through() {
    init_tracing();

    let (result, _) = run_with_fake(app_with_database(), options(), |r| r.with_task_exit_code(3)).await;

    assert_eq!(result.exit_code, 3);
    assert!(!result.failed);
}

#[tokio::test]
async fn failed_image_pull_stops_the_run_stage_and_cleans_up() {
    init_tracing();

    let (result, steps) = run_with_fake(app_with_database(), options(), |r| {
        r.failing_with(|step| match step {
            TaskStep::PullImage { source } => Some(TaskFailure::ImagePullFailed {
                source: source.clone(),
                message: "manifest unknown".to_string(),
            }),
            _ => None,
        })
    })
    .await;

    assert!(result.failed);
    assert_eq!(result.exit_code, -1);
    assert!(result.manual_cleanup_instructions.is_none());
    assert_each_step_dispatched_once(&steps);

    assert_eq!(count(&steps, |s| matches!(s, TaskStep::StartContainer { .. })), 0);
    assert_eq!(count(&steps, |s| matches!(s, TaskStep::RunContainer { .. })), 0);
    assert_eq!(count(&steps, |s| matches!(s, TaskStep::DeleteTaskNetwork { .. })), 1);
}

#[tokio::test]
async fn dont_cleanup_after_failure_leaves_containers_and_prints_instructions() {
    init_tracing();
    let opts = RunOptions {
        behaviour_after_failure: CleanupBehaviour::DontCleanup,
        ..options()
    };

    let (result, steps) = run_with_fake(app_with_database(), opts, |r| {
        r.failing_with(|step| match step {
            TaskStep::RunContainerSetupCommands { container, .. } => {
                Some(TaskFailure::SetupCommandFailed {
                    container: *container,
                    index: 0,
                    exit_code: 1,
                    output: "relation does not exist".to_string(),
                })
            }
            _ => None,
        })
    })
    .await;

    assert!(result.failed);
    assert_eq!(result.exit_code, -1);
    assert_eq!(count(&steps, |s| s.is_cleanup_step()), 0);

    let instructions = result
        .manual_cleanup_instructions
        .expect("manual cleanup instructions");
    assert!(instructions.contains("--no-cleanup-after-failure"));
    assert!(instructions.contains("docker rm --force --volumes db-id"));
    assert!(instructions.ends_with("docker network rm fake-network"));
}

#[tokio::test]
async fn dont_cleanup_after_success_only_stops_containers() {
    init_tracing();
    let opts = RunOptions {
        behaviour_after_success: CleanupBehaviour::DontCleanup,
        ..options()
    };

    let (result, steps) = run_with_fake(app_with_database(), opts, |r| r).await;

    assert!(!result.failed);
    assert_eq!(result.exit_code, -1);
    assert!(count(&steps, |s| matches!(s, TaskStep::StopContainer { .. })) >= 1);
    assert_eq!(count(&steps, |s| matches!(s, TaskStep::RemoveContainer { .. })), 0);
    assert_eq!(count(&steps, |s| matches!(s, TaskStep::DeleteTaskNetwork { .. })), 0);

    let instructions = result
        .manual_cleanup_instructions
        .expect("manual cleanup instructions");
    assert!(instructions.contains("--no-cleanup-after-success"));
    assert!(instructions.contains("Once you have finished using the containers"));
}

#[tokio::test]
async fn custom_network_is_checked_but_never_deleted() {
    init_tracing();
    let graph = ConfigFileBuilder::new()
        .with_container("app", ContainerConfigBuilder::image("alpine").build())
        .with_task("t", TaskConfigBuilder::new("app").network("shared").build())
        .graph_for("t");

    let (result, steps) = run_with_fake(graph, options(), |r| r).await;

    assert_eq!(result.exit_code, 0);
    assert!(steps.contains(&TaskStep::PrepareTaskNetwork {
        existing_network: Some("shared".to_string())
    }));
    assert_eq!(count(&steps, |s| matches!(s, TaskStep::RemoveContainer { .. })), 1);
    assert_eq!(count(&steps, |s| matches!(s, TaskStep::DeleteTaskNetwork { .. })), 0);
}

#[tokio::test]
async fn temporary_files_are_deleted_after_their_container_is_removed() {
    init_tracing();
    let graph = ConfigFileBuilder::new()
        .with_container(
            "app",
            ContainerConfigBuilder::image("alpine").run_as_current_user().build(),
        )
        .with_task("t", TaskConfigBuilder::new("app").build())
        .graph_for("t");

    let (result, steps) = run_with_fake(graph, options(), |r| r).await;

    assert_eq!(result.exit_code, 0);

    let removed = position(&steps, |s| matches!(s, TaskStep::RemoveContainer { .. }));
    let file_deleted = position(&steps, |s| {
        matches!(s, TaskStep::DeleteTemporaryFile { path } if path.ends_with("passwd-app"))
    });
    let dir_deleted = position(&steps, |s| {
        matches!(s, TaskStep::DeleteTemporaryDirectory { path } if path.ends_with("home-app"))
    });
    assert!(removed < file_deleted);
    assert!(removed < dir_deleted);
}

#[tokio::test]
async fn max_parallelism_bounds_concurrent_steps() {
    init_tracing();
    let graph = ConfigFileBuilder::new()
        .with_container(
            "app",
            ContainerConfigBuilder::image("alpine")
                .depends_on(&["db", "cache", "queue"])
                .build(),
        )
        .with_container("db", ContainerConfigBuilder::image("postgres").build())
        .with_container("cache", ContainerConfigBuilder::image("redis").build())
        .with_container("queue", ContainerConfigBuilder::image("rabbitmq").build())
        .with_task("t", TaskConfigBuilder::new("app").build())
        .graph_for("t");

    let opts = RunOptions {
        max_parallelism: Some(2),
        ..options()
    };

    let mut max_in_flight = None;
    let (result, steps) = run_with_fake(graph, opts, |r| {
        max_in_flight = Some(r.max_in_flight());
        r
    })
    .await;

    assert_eq!(result.exit_code, 0);
    assert_eq!(count(&steps, |s| matches!(s, TaskStep::RemoveContainer { .. })), 4);

    let max_in_flight = max_in_flight.unwrap().load(Ordering::SeqCst);
    assert!(max_in_flight <= 2, "saw {max_in_flight} steps running at once");
}

#[tokio::test]
async fn interrupting_a_running_task_cancels_it_and_cleans_up() {
    init_tracing();
    let graph = app_with_database();
    let app = graph.find("app").unwrap();

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let runner = FakeStepRunner::new(Arc::clone(&graph), tx.clone()).hanging_task_container();
    let executed = runner.executed();

    let machine = TaskStateMachine::new(Arc::clone(&graph), options());
    let runtime = TaskRuntime::new(machine, rx, runner, Box::new(SilentLogger), options());
    let handle = tokio::spawn(runtime.run());

    with_timeout(async {
        loop {
            let running = executed
                .lock()
                .unwrap()
                .iter()
                .any(|s| matches!(s, TaskStep::RunContainer { .. }));
            if running {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    tx.send(RuntimeEvent::Interrupted).await.unwrap();
    // A second Ctrl-C while stopping is ignored.
    tx.send(RuntimeEvent::Interrupted).await.unwrap();

    let result = with_timeout(handle).await.unwrap().unwrap();
    let steps = executed.lock().unwrap().clone();

    assert!(result.failed);
    assert_eq!(result.exit_code, -1);
    assert!(steps.iter().any(|s| matches!(s, TaskStep::StopContainer { container, .. } if *container == app)));
    assert_eq!(count(&steps, |s| matches!(s, TaskStep::RemoveContainer { .. })), 2);
    assert_eq!(count(&steps, |s| matches!(s, TaskStep::DeleteTaskNetwork { .. })), 1);
}
