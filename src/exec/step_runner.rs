// src/exec/step_runner.rs

//! Executes a single step against Docker and reports what happened.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RunAsCurrentUserConfig;
use crate::dag::{BuildImage, ContainerId, DependencyGraph, PullImage};
use crate::engine::{RuntimeEvent, StepId};
use crate::exec::docker::{CreateContainerRequest, DockerCli, HealthCheckResult, HealthStatus, split_command};
use crate::execution::{DockerContainer, DockerImage, DockerNetwork, TaskEvent, TaskFailure, TaskStep};
use crate::fs::FileSystem;

/// Shared, read-only state every running step needs.
#[derive(Debug)]
pub struct StepContext {
    pub graph: Arc<DependencyGraph>,
    pub docker: DockerCli,
    pub fs: Arc<dyn FileSystem>,
    /// Suffix making this run's network and container names unique.
    pub run_id: String,
    pub health_poll_interval: Duration,
}

impl StepContext {
    pub fn new(graph: Arc<DependencyGraph>, docker: DockerCli, fs: Arc<dyn FileSystem>) -> Self {
        let run_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            graph,
            docker,
            fs,
            run_id,
            health_poll_interval: Duration::from_millis(500),
        }
    }

    fn image_tag(&self, container: ContainerId) -> String {
        format!("{}-{}", self.graph.project_name(), self.graph.name_of(container))
    }

    fn container_name(&self, container: ContainerId) -> String {
        format!(
            "{}-{}-{}",
            self.graph.project_name(),
            self.graph.name_of(container),
            self.run_id
        )
    }

    fn network_name(&self) -> String {
        format!(
            "{}-{}-{}",
            self.graph.project_name(),
            self.graph.task_name(),
            self.run_id
        )
    }
}

/// Posts events back to the runtime.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<RuntimeEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self { tx }
    }

    pub async fn post(&self, event: impl Into<TaskEvent>) {
        let event = event.into();
        if self.tx.send(RuntimeEvent::TaskEvent(event)).await.is_err() {
            debug!("runtime is gone; dropping task event");
        }
    }

    async fn finished(&self, id: StepId) {
        if self.tx.send(RuntimeEvent::StepFinished(id)).await.is_err() {
            debug!(step_id = %id, "runtime is gone; dropping step completion");
        }
    }
}

/// Steps that may be abandoned part-way when the user interrupts the task.
///
/// Short steps that create or remove resources always run to completion so
/// the event log matches what exists in Docker.
pub fn is_cancellable(step: &TaskStep) -> bool {
    matches!(
        step,
        TaskStep::BuildImage { .. }
            | TaskStep::PullImage { .. }
            | TaskStep::RunContainer { .. }
            | TaskStep::WaitForContainerToBecomeHealthy { .. }
            | TaskStep::RunContainerSetupCommands { .. }
    )
}

/// Run one step, then always report it finished.
///
/// If the cancel channel fires, the step's future is dropped (killing any
/// `docker` process it spawned) and no further events are posted for it.
pub async fn run_step(
    ctx: Arc<StepContext>,
    id: StepId,
    step: TaskStep,
    sink: EventSink,
    cancel_rx: oneshot::Receiver<()>,
) {
    debug!(step_id = %id, ?step, "starting step");

    let work = execute_step(&ctx, step, &sink);
    tokio::pin!(work);

    tokio::select! {
        () = &mut work => {}
        cancel = cancel_rx => match cancel {
            Ok(()) => info!(step_id = %id, "step cancelled"),
            Err(_) => work.await,
        },
    }

    sink.finished(id).await;
}

async fn execute_step(ctx: &StepContext, step: TaskStep, sink: &EventSink) {
    match step {
        TaskStep::InitialiseCaches => sink.post(TaskEvent::CachesInitialised).await,
        TaskStep::PrepareTaskNetwork { existing_network } => {
            prepare_network(ctx, sink, existing_network).await
        }
        TaskStep::BuildImage { container, source } => build_image(ctx, sink, container, source).await,
        TaskStep::PullImage { source } => pull_image(ctx, sink, source).await,
        TaskStep::CreateContainer {
            container,
            image,
            network,
        } => create_container(ctx, sink, container, image, network).await,
        TaskStep::StartContainer {
            container,
            docker_container,
        } => match ctx.docker.start_container(&docker_container.id).await {
            Ok(()) => sink.post(TaskEvent::ContainerStarted { container }).await,
            Err(err) => {
                sink.post(TaskFailure::ContainerRunFailed {
                    container,
                    message: format!("{err:#}"),
                })
                .await
            }
        },
        TaskStep::RunContainer {
            container,
            docker_container,
        } => run_container(ctx, sink, container, docker_container).await,
        TaskStep::WaitForContainerToBecomeHealthy {
            container,
            docker_container,
        } => wait_for_health(ctx, sink, container, docker_container).await,
        TaskStep::RunContainerSetupCommands {
            container,
            docker_container,
        } => run_setup_commands(ctx, sink, container, docker_container).await,
        TaskStep::StopContainer {
            container,
            docker_container,
        } => match ctx.docker.stop_container(&docker_container.id).await {
            Ok(()) => sink.post(TaskEvent::ContainerStopped { container }).await,
            Err(err) => {
                sink.post(TaskFailure::ContainerStopFailed {
                    container,
                    message: format!("{err:#}"),
                })
                .await
            }
        },
        TaskStep::RemoveContainer {
            container,
            docker_container,
        } => match ctx.docker.remove_container(&docker_container.id).await {
            Ok(()) => sink.post(TaskEvent::ContainerRemoved { container }).await,
            Err(err) => {
                sink.post(TaskFailure::ContainerRemovalFailed {
                    container,
                    message: format!("{err:#}"),
                })
                .await
            }
        },
        TaskStep::DeleteTaskNetwork { network } => {
            match ctx.docker.delete_network(&network.id).await {
                Ok(()) => sink.post(TaskEvent::TaskNetworkDeleted).await,
                Err(err) => {
                    sink.post(TaskFailure::TaskNetworkDeletionFailed {
                        message: format!("{err:#}"),
                    })
                    .await
                }
            }
        }
        TaskStep::DeleteTemporaryFile { path } => match ctx.fs.remove_file(&path) {
            Ok(()) => sink.post(TaskEvent::TemporaryFileDeleted { path }).await,
            Err(err) => {
                sink.post(TaskFailure::TemporaryFileDeletionFailed {
                    path,
                    message: format!("{err:#}"),
                })
                .await
            }
        },
        TaskStep::DeleteTemporaryDirectory { path } => match ctx.fs.remove_dir_all(&path) {
            Ok(()) => sink.post(TaskEvent::TemporaryDirectoryDeleted { path }).await,
            Err(err) => {
                sink.post(TaskFailure::TemporaryDirectoryDeletionFailed {
                    path,
                    message: format!("{err:#}"),
                })
                .await
            }
        },
    }
}

async fn prepare_network(ctx: &StepContext, sink: &EventSink, existing_network: Option<String>) {
    match existing_network {
        Some(name) => match ctx.docker.network_id(&name).await {
            Ok(id) => {
                sink.post(TaskEvent::CustomTaskNetworkChecked {
                    network: DockerNetwork { id },
                })
                .await
            }
            Err(err) => {
                sink.post(TaskFailure::CustomTaskNetworkCheckFailed {
                    network: name,
                    message: format!("{err:#}"),
                })
                .await
            }
        },
        None => match ctx.docker.create_network(&ctx.network_name()).await {
            Ok(id) => {
                sink.post(TaskEvent::TaskNetworkCreated {
                    network: DockerNetwork { id },
                })
                .await
            }
            Err(err) => {
                sink.post(TaskFailure::TaskNetworkCreationFailed {
                    message: format!("{err:#}"),
                })
                .await
            }
        },
    }
}

async fn build_image(ctx: &StepContext, sink: &EventSink, container: ContainerId, source: BuildImage) {
    let tag = ctx.image_tag(container);
    info!(container = %ctx.graph.name_of(container), tag = %tag, "building image");

    let result = ctx
        .docker
        .build_image(
            &source.build_directory,
            source.dockerfile.as_deref(),
            &source.build_args,
            &tag,
        )
        .await;

    match result {
        Ok(id) => {
            sink.post(TaskEvent::ImageBuilt {
                container,
                image: DockerImage { id },
            })
            .await
        }
        Err(err) => {
            sink.post(TaskFailure::ImageBuildFailed {
                container,
                message: format!("{err:#}"),
            })
            .await
        }
    }
}

async fn pull_image(ctx: &StepContext, sink: &EventSink, source: PullImage) {
    let result = match ctx.docker.image_id(&source.image_name).await {
        Ok(Some(id)) => {
            debug!(image = %source.image_name, "image already present locally");
            Ok(id)
        }
        _ => ctx.docker.pull_image(&source.image_name).await,
    };

    match result {
        Ok(id) => {
            sink.post(TaskEvent::ImagePulled {
                source,
                image: DockerImage { id },
            })
            .await
        }
        Err(err) => {
            sink.post(TaskFailure::ImagePullFailed {
                source,
                message: format!("{err:#}"),
            })
            .await
        }
    }
}

async fn create_container(
    ctx: &StepContext,
    sink: &EventSink,
    container: ContainerId,
    image: DockerImage,
    network: DockerNetwork,
) {
    let config = ctx.graph.container(container);
    let is_task_container = container == ctx.graph.task_container();

    let command = match config.command.as_deref().map(split_command).transpose() {
        Ok(command) => command.unwrap_or_default(),
        Err(err) => {
            sink.post(TaskFailure::ContainerCreationFailed {
                container,
                message: format!("{err:#}"),
            })
            .await;
            return;
        }
    };

    let mut volumes = config.volumes.clone();
    let mut user = None;

    if let Some(run_as) = config.run_as_current_user.as_ref().filter(|c| c.enabled) {
        match prepare_current_user(ctx, sink, container, run_as).await {
            Ok(mounts) => {
                volumes.extend(mounts.volumes);
                user = Some(mounts.user);
            }
            Err(err) => {
                sink.post(TaskFailure::ContainerCreationFailed {
                    container,
                    message: format!("{err:#}"),
                })
                .await;
                return;
            }
        }
    }

    let request = CreateContainerRequest {
        name: ctx.container_name(container),
        hostname: config.name.clone(),
        image: image.id,
        network: network.id,
        command,
        environment: config.environment.clone(),
        working_directory: config.working_directory.clone(),
        volumes,
        user,
        health_check: config.health_check.clone(),
        interactive: is_task_container && std::io::stdin().is_terminal(),
    };

    match ctx.docker.create_container(&request).await {
        Ok(id) => {
            sink.post(TaskEvent::ContainerCreated {
                container,
                docker_container: DockerContainer {
                    id,
                    name: request.name,
                },
            })
            .await
        }
        Err(err) => {
            sink.post(TaskFailure::ContainerCreationFailed {
                container,
                message: format!("{err:#}"),
            })
            .await
        }
    }
}

struct CurrentUserMounts {
    volumes: Vec<String>,
    user: String,
}

/// Write passwd/group files and a home directory so the container can run
/// as the invoking user. Each resource is reported as soon as it exists.
async fn prepare_current_user(
    ctx: &StepContext,
    sink: &EventSink,
    container: ContainerId,
    config: &RunAsCurrentUserConfig,
) -> anyhow::Result<CurrentUserMounts> {
    let (uid, gid) = current_user_ids();
    let user_name = std::env::var("USER").unwrap_or_else(|_| "container-user".to_string());
    let suffix = Uuid::new_v4().simple().to_string();
    let temp = ctx.fs.temp_dir();

    let passwd: PathBuf = temp.join(format!("taskdock-passwd-{suffix}"));
    ctx.fs.write(
        &passwd,
        passwd_contents(uid, gid, &user_name, &config.home_directory).as_bytes(),
    )?;
    sink.post(TaskEvent::TemporaryFileCreated {
        container,
        path: passwd.clone(),
    })
    .await;

    let group: PathBuf = temp.join(format!("taskdock-group-{suffix}"));
    ctx.fs.write(&group, group_contents(gid, &user_name).as_bytes())?;
    sink.post(TaskEvent::TemporaryFileCreated {
        container,
        path: group.clone(),
    })
    .await;

    let home: PathBuf = temp.join(format!("taskdock-home-{suffix}"));
    ctx.fs.create_dir_all(&home)?;
    sink.post(TaskEvent::TemporaryDirectoryCreated {
        container,
        path: home.clone(),
    })
    .await;

    Ok(CurrentUserMounts {
        volumes: vec![
            format!("{}:/etc/passwd:ro", passwd.display()),
            format!("{}:/etc/group:ro", group.display()),
            format!("{}:{}", home.display(), config.home_directory),
        ],
        user: format!("{uid}:{gid}"),
    })
}

#[cfg(unix)]
fn current_user_ids() -> (u32, u32) {
    // SAFETY: getuid/getgid cannot fail and touch no memory.
    unsafe { (libc::getuid(), libc::getgid()) }
}

#[cfg(not(unix))]
fn current_user_ids() -> (u32, u32) {
    (0, 0)
}

fn passwd_contents(uid: u32, gid: u32, user_name: &str, home_directory: &str) -> String {
    if uid == 0 {
        return format!("root:x:0:0:root:{home_directory}:/bin/sh\n");
    }

    format!(
        "root:x:0:0:root:/root:/bin/sh\n{user_name}:x:{uid}:{gid}:{user_name}:{home_directory}:/bin/sh\n"
    )
}

fn group_contents(gid: u32, group_name: &str) -> String {
    if gid == 0 {
        return "root:x:0:root\n".to_string();
    }

    format!("root:x:0:root\n{group_name}:x:{gid}:{group_name}\n")
}

async fn run_container(
    ctx: &StepContext,
    sink: &EventSink,
    container: ContainerId,
    docker_container: DockerContainer,
) {
    let interactive = std::io::stdin().is_terminal();
    sink.post(TaskEvent::ContainerStarted { container }).await;

    match ctx.docker.run_attached(&docker_container.id, interactive).await {
        Ok(exit_code) => {
            sink.post(TaskEvent::RunningContainerExited {
                container,
                exit_code,
            })
            .await
        }
        Err(err) => {
            sink.post(TaskFailure::ContainerRunFailed {
                container,
                message: format!("{err:#}"),
            })
            .await
        }
    }
}

async fn wait_for_health(
    ctx: &StepContext,
    sink: &EventSink,
    container: ContainerId,
    docker_container: DockerContainer,
) {
    loop {
        let status = match ctx.docker.health_status(&docker_container.id).await {
            Ok(status) => status,
            Err(err) => {
                sink.post(TaskFailure::ContainerDidNotBecomeHealthy {
                    container,
                    message: format!("Waiting for the container's health status failed: {err:#}"),
                })
                .await;
                return;
            }
        };

        match status {
            HealthStatus::NoHealthCheck | HealthStatus::Healthy => {
                sink.post(TaskEvent::ContainerBecameHealthy { container }).await;
                return;
            }
            HealthStatus::Unhealthy => {
                let last = match ctx.docker.last_health_check(&docker_container.id).await {
                    Ok(last) => last,
                    Err(err) => {
                        warn!(error = %err, "could not read the last health check result");
                        None
                    }
                };
                sink.post(TaskFailure::ContainerDidNotBecomeHealthy {
                    container,
                    message: unhealthy_message(last.as_ref()),
                })
                .await;
                return;
            }
            // The task container may finish before its health check has run.
            HealthStatus::Exited if container == ctx.graph.task_container() => {
                sink.post(TaskEvent::ContainerBecameHealthy { container }).await;
                return;
            }
            HealthStatus::Exited => {
                sink.post(TaskFailure::ContainerDidNotBecomeHealthy {
                    container,
                    message: "The container exited before becoming healthy.".to_string(),
                })
                .await;
                return;
            }
            HealthStatus::Starting => tokio::time::sleep(ctx.health_poll_interval).await,
        }
    }
}

fn unhealthy_message(last: Option<&HealthCheckResult>) -> String {
    let detail = match last {
        None => "No health check result was recorded.".to_string(),
        Some(result) if result.exit_code == 0 => "The most recent health check exited with code 0, which usually indicates that the container became healthy just after the timeout period expired.".to_string(),
        Some(result) if result.output.trim().is_empty() => format!(
            "The last health check exited with code {} but did not produce any output.",
            result.exit_code
        ),
        Some(result) => format!(
            "The last health check exited with code {} and output:\n{}",
            result.exit_code,
            result.output.trim()
        ),
    };
    format!("The configured health check did not indicate that the container was healthy within the timeout period. {detail}")
}

async fn run_setup_commands(
    ctx: &StepContext,
    sink: &EventSink,
    container: ContainerId,
    docker_container: DockerContainer,
) {
    let setup_commands = &ctx.graph.container(container).setup_commands;

    if setup_commands.is_empty() {
        sink.post(TaskEvent::ContainerBecameReady { container }).await;
        return;
    }

    for (index, setup) in setup_commands.iter().enumerate() {
        sink.post(TaskEvent::RunningSetupCommand { container, index }).await;

        let result = match split_command(&setup.command) {
            Ok(args) => {
                ctx.docker
                    .exec(&docker_container.id, setup.working_directory.as_deref(), &args)
                    .await
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(output) if output.success() => {
                debug!(container = %ctx.graph.name_of(container), index, "setup command finished");
            }
            Ok(output) => {
                warn!(
                    container = %ctx.graph.name_of(container),
                    index,
                    exit_code = output.exit_code,
                    "setup command failed"
                );
                sink.post(TaskFailure::SetupCommandFailed {
                    container,
                    index,
                    exit_code: output.exit_code,
                    output: output.combined(),
                })
                .await;
                return;
            }
            Err(err) => {
                sink.post(TaskFailure::SetupCommandExecutionError {
                    container,
                    index,
                    message: format!("{err:#}"),
                })
                .await;
                return;
            }
        }
    }

    sink.post(TaskEvent::SetupCommandsCompleted { container }).await;
    sink.post(TaskEvent::ContainerBecameReady { container }).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigFile, ContainerConfig, RawConfigFile, TaskConfig, TaskRunConfig};
    use crate::fs::mock::{MockEntry, MockFileSystem};

    fn context(fs: MockFileSystem) -> Arc<StepContext> {
        let mut raw = RawConfigFile {
            project_name: Some("shop".into()),
            ..Default::default()
        };
        raw.container.insert(
            "app".into(),
            ContainerConfig {
                image: Some("alpine".into()),
                ..Default::default()
            },
        );
        raw.task.insert(
            "t".into(),
            TaskConfig {
                description: None,
                run: TaskRunConfig {
                    container: "app".into(),
                    command: None,
                    environment: Default::default(),
                },
                dependencies: vec![],
                prerequisites: vec![],
                network: None,
            },
        );
        let cfg = ConfigFile::try_from(raw).unwrap();
        let graph = Arc::new(DependencyGraph::new(&cfg, "t").unwrap());

        Arc::new(StepContext::new(graph, DockerCli::default(), Arc::new(fs)))
    }

    async fn run(ctx: Arc<StepContext>, step: TaskStep) -> Vec<RuntimeEvent> {
        let (tx, mut rx) = mpsc::channel(16);
        let (_cancel_tx, cancel_rx) = oneshot::channel();

        run_step(ctx, StepId(7), step, EventSink::new(tx), cancel_rx).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn task_events(events: &[RuntimeEvent]) -> Vec<&TaskEvent> {
        events
            .iter()
            .filter_map(|e| match e {
                RuntimeEvent::TaskEvent(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn deleting_a_temporary_file_reports_success_then_finishes() {
        let fs = MockFileSystem::new();
        fs.add_file("/tmp/taskdock-passwd-1", "root:x:0:0::/root:/bin/sh");

        let events = run(
            context(fs.clone()),
            TaskStep::DeleteTemporaryFile {
                path: "/tmp/taskdock-passwd-1".into(),
            },
        )
        .await;

        assert_eq!(
            task_events(&events),
            vec![&TaskEvent::TemporaryFileDeleted {
                path: "/tmp/taskdock-passwd-1".into()
            }]
        );
        assert!(matches!(events.last(), Some(RuntimeEvent::StepFinished(StepId(7)))));
        assert!(fs.entry("/tmp/taskdock-passwd-1").is_none());
    }

    #[tokio::test]
    async fn failed_directory_removal_becomes_a_failure_event() {
        let fs = MockFileSystem::new();
        fs.create_dir_all(std::path::Path::new("/tmp/taskdock-home-1")).unwrap();
        fs.fail_removal_of("/tmp/taskdock-home-1");

        let events = run(
            context(fs),
            TaskStep::DeleteTemporaryDirectory {
                path: "/tmp/taskdock-home-1".into(),
            },
        )
        .await;

        assert!(matches!(
            task_events(&events).as_slice(),
            [TaskEvent::Failed(TaskFailure::TemporaryDirectoryDeletionFailed { message, .. })]
                if message.contains("Permission denied")
        ));
    }

    #[tokio::test]
    async fn current_user_files_are_written_and_reported() {
        let fs = MockFileSystem::new();
        let ctx = context(fs.clone());
        let app = ctx.graph.task_container();
        let (tx, mut rx) = mpsc::channel(16);

        let mounts = prepare_current_user(
            &ctx,
            &EventSink::new(tx),
            app,
            &RunAsCurrentUserConfig {
                enabled: true,
                home_directory: "/home/container-user".into(),
            },
        )
        .await
        .unwrap();

        assert_eq!(mounts.volumes.len(), 3);
        assert!(mounts.volumes[0].ends_with(":/etc/passwd:ro"));
        assert!(mounts.volumes[2].ends_with(":/home/container-user"));

        let mut created = Vec::new();
        while let Ok(RuntimeEvent::TaskEvent(event)) = rx.try_recv() {
            created.push(event);
        }
        assert_eq!(created.len(), 3);

        let entries: Vec<_> = fs.paths().into_iter().filter_map(|p| fs.entry(p)).collect();
        assert_eq!(entries.iter().filter(|e| matches!(e, MockEntry::File(_))).count(), 2);
        assert_eq!(entries.iter().filter(|e| **e == MockEntry::Dir).count(), 1);
    }

    #[tokio::test]
    async fn initialising_caches_needs_no_docker() {
        let events = run(context(MockFileSystem::new()), TaskStep::InitialiseCaches).await;

        assert_eq!(task_events(&events), vec![&TaskEvent::CachesInitialised]);
    }

    #[test]
    fn passwd_file_maps_current_user_to_home_directory() {
        assert_eq!(
            passwd_contents(1000, 1000, "dev", "/home/container-user"),
            "root:x:0:0:root:/root:/bin/sh\ndev:x:1000:1000:dev:/home/container-user:/bin/sh\n"
        );
        assert_eq!(
            passwd_contents(0, 0, "root", "/home/container-user"),
            "root:x:0:0:root:/home/container-user:/bin/sh\n"
        );
    }

    #[test]
    fn group_file_contains_current_group() {
        assert_eq!(group_contents(1000, "dev"), "root:x:0:root\ndev:x:1000:dev\n");
        assert_eq!(group_contents(0, "root"), "root:x:0:root\n");
    }

    #[test]
    fn only_long_running_steps_are_cancellable() {
        assert!(is_cancellable(&TaskStep::PullImage {
            source: PullImage {
                image_name: "alpine".into()
            }
        }));
        assert!(!is_cancellable(&TaskStep::InitialiseCaches));
        assert!(!is_cancellable(&TaskStep::DeleteTemporaryFile {
            path: "/tmp/x".into()
        }));
    }

    #[test]
    fn unhealthy_message_includes_the_last_health_check() {
        let failed = HealthCheckResult {
            exit_code: 2,
            output: "connection refused\n".into(),
        };
        assert!(unhealthy_message(Some(&failed)).ends_with(
            "The last health check exited with code 2 and output:\nconnection refused"
        ));

        let silent = HealthCheckResult {
            exit_code: 1,
            output: String::new(),
        };
        assert!(unhealthy_message(Some(&silent))
            .ends_with("exited with code 1 but did not produce any output."));

        let late = HealthCheckResult {
            exit_code: 0,
            output: "ok".into(),
        };
        assert!(unhealthy_message(Some(&late)).contains("became healthy just after the timeout period expired"));
        assert!(unhealthy_message(None).starts_with(
            "The configured health check did not indicate that the container was healthy within the timeout period."
        ));
    }
}
