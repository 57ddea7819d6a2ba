use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use taskdock::dag::DependencyGraph;
use taskdock::engine::{RuntimeEvent, StepId};
use taskdock::errors::Result;
use taskdock::exec::StepRunner;
use taskdock::execution::{
    DockerContainer, DockerImage, DockerNetwork, TaskEvent, TaskFailure, TaskStep,
};

type FailureScript = Box<dyn Fn(&TaskStep) -> Option<TaskFailure> + Send>;

/// Steps parked until cancellation. Once cancelled, new arrivals finish
/// straight away.
#[derive(Default)]
struct HungSteps {
    cancelled: bool,
    ids: Vec<StepId>,
}

/// A fake step runner that:
/// - records which steps were dispatched
/// - replies with the events a healthy Docker daemon would produce
/// - optionally fails chosen steps, or leaves the task container running
///   until cancelled.
pub struct FakeStepRunner {
    graph: Arc<DependencyGraph>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<TaskStep>>>,
    task_exit_code: i32,
    failures: FailureScript,
    hang_task_container: bool,
    hung: Arc<Mutex<HungSteps>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FakeStepRunner {
    pub fn new(graph: Arc<DependencyGraph>, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            graph,
            runtime_tx,
            executed: Arc::new(Mutex::new(Vec::new())),
            task_exit_code: 0,
            failures: Box::new(|_| None),
            hang_task_container: false,
            hung: Arc::new(Mutex::new(HungSteps::default())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_task_exit_code(mut self, exit_code: i32) -> Self {
        self.task_exit_code = exit_code;
        self
    }

    /// Post the returned failure instead of the step's usual events.
    pub fn failing_with(
        mut self,
        script: impl Fn(&TaskStep) -> Option<TaskFailure> + Send + 'static,
    ) -> Self {
        self.failures = Box::new(script);
        self
    }

    /// The task container starts but never exits on its own.
    pub fn hanging_task_container(mut self) -> Self {
        self.hang_task_container = true;
        self
    }

    /// Shared handle on the steps dispatched so far, in dispatch order.
    pub fn executed(&self) -> Arc<Mutex<Vec<TaskStep>>> {
        Arc::clone(&self.executed)
    }

    /// Shared handle on the highest number of steps seen running at once.
    pub fn max_in_flight(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.max_in_flight)
    }

    /// Events this runner posts for `step`, without dispatching it.
    pub fn events_for(&self, step: &TaskStep) -> Vec<TaskEvent> {
        if let Some(failure) = (self.failures)(step) {
            return vec![TaskEvent::Failed(failure)];
        }

        match step {
            TaskStep::InitialiseCaches => vec![TaskEvent::CachesInitialised],
            TaskStep::PrepareTaskNetwork {
                existing_network: Some(name),
            } => vec![TaskEvent::CustomTaskNetworkChecked {
                network: DockerNetwork { id: name.clone() },
            }],
            TaskStep::PrepareTaskNetwork {
                existing_network: None,
            } => vec![TaskEvent::TaskNetworkCreated {
                network: DockerNetwork {
                    id: "fake-network".to_string(),
                },
            }],
            TaskStep::BuildImage { container, .. } => vec![TaskEvent::ImageBuilt {
                container: *container,
                image: DockerImage {
                    id: format!("built-{}", self.graph.name_of(*container)),
                },
            }],
            TaskStep::PullImage { source } => vec![TaskEvent::ImagePulled {
                source: source.clone(),
                image: DockerImage {
                    id: source.image_name.clone(),
                },
            }],
            TaskStep::CreateContainer { container, .. } => {
                let name = self.graph.name_of(*container);
                let mut events = Vec::new();

                if self.graph.container(*container).runs_as_current_user() {
                    events.push(TaskEvent::TemporaryFileCreated {
                        container: *container,
                        path: PathBuf::from(format!("/tmp/passwd-{name}")),
                    });
                    events.push(TaskEvent::TemporaryDirectoryCreated {
                        container: *container,
                        path: PathBuf::from(format!("/tmp/home-{name}")),
                    });
                }

                events.push(TaskEvent::ContainerCreated {
                    container: *container,
                    docker_container: DockerContainer {
                        id: format!("{name}-id"),
                        name: format!("{name}-name"),
                    },
                });
                events
            }
            TaskStep::StartContainer { container, .. } => {
                vec![TaskEvent::ContainerStarted {
                    container: *container,
                }]
            }
            TaskStep::RunContainer { container, .. } => {
                let mut events = vec![TaskEvent::ContainerStarted {
                    container: *container,
                }];
                if !self.hang_task_container {
                    events.push(TaskEvent::RunningContainerExited {
                        container: *container,
                        exit_code: self.task_exit_code,
                    });
                }
                events
            }
            TaskStep::WaitForContainerToBecomeHealthy { container, .. } => {
                vec![TaskEvent::ContainerBecameHealthy {
                    container: *container,
                }]
            }
            TaskStep::RunContainerSetupCommands { container, .. } => {
                let mut events = Vec::new();
                if !self.graph.container(*container).setup_commands.is_empty() {
                    events.push(TaskEvent::SetupCommandsCompleted {
                        container: *container,
                    });
                }
                events.push(TaskEvent::ContainerBecameReady {
                    container: *container,
                });
                events
            }
            TaskStep::StopContainer { container, .. } => vec![TaskEvent::ContainerStopped {
                container: *container,
            }],
            TaskStep::RemoveContainer { container, .. } => vec![TaskEvent::ContainerRemoved {
                container: *container,
            }],
            TaskStep::DeleteTaskNetwork { .. } => vec![TaskEvent::TaskNetworkDeleted],
            TaskStep::DeleteTemporaryFile { path } => {
                vec![TaskEvent::TemporaryFileDeleted { path: path.clone() }]
            }
            TaskStep::DeleteTemporaryDirectory { path } => {
                vec![TaskEvent::TemporaryDirectoryDeleted { path: path.clone() }]
            }
        }
    }
}

impl StepRunner for FakeStepRunner {
    fn run_step(
        &mut self,
        id: StepId,
        step: TaskStep,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let events = self.events_for(&step);
        let hangs = self.hang_task_container && matches!(step, TaskStep::RunContainer { .. });

        self.executed.lock().unwrap().push(step);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let tx = self.runtime_tx.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let hung = Arc::clone(&self.hung);

        Box::pin(async move {
            // Reply from a separate task, like a real step running in the
            // background; the runtime is not receiving while it dispatches.
            tokio::spawn(async move {
                for event in events {
                    let _ = tx.send(RuntimeEvent::TaskEvent(event)).await;
                }

                if hangs {
                    let mut hung = hung.lock().unwrap();
                    if !hung.cancelled {
                        hung.ids.push(id);
                        return;
                    }
                }

                in_flight.fetch_sub(1, Ordering::SeqCst);
                let _ = tx.send(RuntimeEvent::StepFinished(id)).await;
            });
            Ok(())
        })
    }

    fn cancel_running_steps(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let hung: Vec<StepId> = {
            let mut hung = self.hung.lock().unwrap();
            hung.cancelled = true;
            hung.ids.drain(..).collect()
        };

        Box::pin(async move {
            tokio::spawn(async move {
                for id in hung {
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    let _ = tx.send(RuntimeEvent::StepFinished(id)).await;
                }
            });
            Ok(())
        })
    }
}
