// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod execution;
pub mod fs;
pub mod logging;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_and_validate};
use crate::dag::{DependencyGraph, ImageSource, execution_order};
use crate::engine::{
    ConsoleEventLogger, FailureErrorMessageFormatter, RunOptions, RuntimeEvent, TaskRuntime,
    TaskStateMachine,
};
use crate::exec::{DockerCli, DockerStepRunner, StepContext};
use crate::execution::{RunRule, RunStagePlanner};
use crate::fs::RealFileSystem;
use crate::types::OperatingSystem;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and the task execution order
/// - one dependency graph per task, run in order
/// - state machine / runtime
/// - Docker step runner
/// - Ctrl-C handling
///
/// Returns the process exit code.
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    if args.list_tasks {
        print_tasks(&cfg);
        return Ok(0);
    }

    let task_name = args
        .task
        .as_deref()
        .context("no task given; pass a task name or --list-tasks")?;
    let order = execution_order(&cfg, task_name, args.skip_prerequisites)?;

    if args.dry_run {
        for name in &order {
            print_dry_run(&DependencyGraph::new(&cfg, name)?);
        }
        return Ok(0);
    }

    let options = RunOptions {
        behaviour_after_failure: args.behaviour_after_failure(),
        behaviour_after_success: args.behaviour_after_success(),
        max_parallelism: args.max_parallelism.map(usize::from),
        operating_system: OperatingSystem::current(),
    };

    run_in_order(&cfg, &order, |graph| run_task(graph, options)).await
}

/// Run each task in `order` through `run_one`, stopping at the first that
/// does not exit with 0. Returns the exit code of the last task run.
pub async fn run_in_order<F, Fut>(cfg: &ConfigFile, order: &[String], mut run_one: F) -> Result<i32>
where
    F: FnMut(Arc<DependencyGraph>) -> Fut,
    Fut: std::future::Future<Output = Result<i32>>,
{
    for (index, name) in order.iter().enumerate() {
        let graph = Arc::new(DependencyGraph::new(cfg, name)?);
        let exit_code = run_one(graph).await?;

        if exit_code != 0 {
            if index + 1 < order.len() {
                warn!(task = %name, exit_code, "task failed; not running the remaining tasks");
            }
            return Ok(exit_code);
        }
    }

    Ok(0)
}

async fn run_task(graph: Arc<DependencyGraph>, options: RunOptions) -> Result<i32> {
    info!(task = %graph.task_name(), containers = graph.len(), "running task");

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    let ctx = Arc::new(StepContext::new(
        Arc::clone(&graph),
        DockerCli::default(),
        Arc::new(RealFileSystem),
    ));
    let runner = DockerStepRunner::new(ctx, rt_tx.clone());

    // Ctrl-C → interrupt. Repeated presses are ignored by the runtime.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                    return;
                }
                if tx.send(RuntimeEvent::Interrupted).await.is_err() {
                    return;
                }
            }
        });
    }
    drop(rt_tx);

    let formatter = FailureErrorMessageFormatter::new(Arc::clone(&graph), options.behaviour_after_failure);
    let logger = ConsoleEventLogger::stderr(Arc::clone(&graph), formatter);
    let machine = TaskStateMachine::new(Arc::clone(&graph), options);

    let runtime = TaskRuntime::new(machine, rt_rx, runner, Box::new(logger), options);
    let result = runtime.run().await?;

    if let Some(instructions) = &result.manual_cleanup_instructions {
        eprintln!();
        eprintln!("{instructions}");
    }

    Ok(result.exit_code)
}

fn print_tasks(cfg: &ConfigFile) {
    println!("Available tasks:");
    for (name, task) in &cfg.task {
        match &task.description {
            Some(description) => println!("- {name}: {description}"),
            None => println!("- {name}"),
        }
    }
}

/// Print the rules of the run stage without touching Docker.
fn print_dry_run(graph: &DependencyGraph) {
    let stage = RunStagePlanner::new(graph).create_stage();

    println!("taskdock dry-run");
    println!("  project = {}", graph.project_name());
    println!("  task = {}", graph.task_name());
    println!();

    println!("containers ({}):", graph.len());
    for node in graph.nodes() {
        let deps: Vec<&str> = node.dependencies.iter().map(|d| graph.name_of(*d)).collect();
        if deps.is_empty() {
            println!("  - {}", node.container.name);
        } else {
            println!("  - {} (after: {})", node.container.name, deps.join(", "));
        }
    }
    println!();

    println!("run plan ({} rules):", stage.rules().len());
    for rule in stage.rules() {
        println!("  - {}", describe_rule(graph, rule));
    }

    debug!("dry-run complete (no execution)");
}

fn describe_rule(graph: &DependencyGraph, rule: &RunRule) -> String {
    match rule {
        RunRule::InitialiseCaches => "initialise caches".to_string(),
        RunRule::PrepareTaskNetwork {
            existing_network: Some(network),
        } => format!("use existing network '{network}'"),
        RunRule::PrepareTaskNetwork {
            existing_network: None,
        } => "create task network".to_string(),
        RunRule::BuildImage { container, source } => format!(
            "build image for {} from {}",
            graph.name_of(*container),
            source.build_directory.display()
        ),
        RunRule::PullImage { source } => format!("pull image {}", source.image_name),
        RunRule::CreateContainer {
            container,
            image_source,
        } => {
            let image = match image_source {
                ImageSource::Pull(pull) => pull.image_name.clone(),
                ImageSource::Build(_) => "built image".to_string(),
            };
            format!("create container {} ({image})", graph.name_of(*container))
        }
        RunRule::RunContainer {
            container,
            dependencies,
            is_task_container,
        } => {
            let verb = if *is_task_container { "run" } else { "start" };
            let name = graph.name_of(*container);
            if dependencies.is_empty() {
                format!("{verb} container {name}")
            } else {
                let deps: Vec<&str> = dependencies.iter().map(|d| graph.name_of(*d)).collect();
                format!("{verb} container {name} once {} ready", deps.join(", "))
            }
        }
        RunRule::WaitForContainerToBecomeHealthy { container } => {
            format!("wait for {} to become healthy", graph.name_of(*container))
        }
        RunRule::RunContainerSetupCommands { container } => {
            format!("run setup commands in {}", graph.name_of(*container))
        }
    }
}
