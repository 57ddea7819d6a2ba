// src/engine/event_logger.rs

//! Progress display.
//!
//! Loggers only observe; nothing they do feeds back into planning.

use std::io::Write;
use std::sync::Arc;

use tracing::warn;

use crate::dag::DependencyGraph;
use crate::engine::messages::FailureErrorMessageFormatter;
use crate::execution::{TaskEvent, TaskStep};

pub trait EventLogger: Send {
    fn on_step_starting(&mut self, step: &TaskStep);
    fn on_event(&mut self, event: &TaskEvent);
}

/// Prints one short line per interesting step or event.
pub struct ConsoleEventLogger<W: Write + Send> {
    graph: Arc<DependencyGraph>,
    formatter: FailureErrorMessageFormatter,
    out: W,
    cleaning_up: bool,
}

impl ConsoleEventLogger<std::io::Stderr> {
    pub fn stderr(graph: Arc<DependencyGraph>, formatter: FailureErrorMessageFormatter) -> Self {
        Self::new(graph, formatter, std::io::stderr())
    }
}

impl<W: Write + Send> ConsoleEventLogger<W> {
    pub fn new(graph: Arc<DependencyGraph>, formatter: FailureErrorMessageFormatter, out: W) -> Self {
        Self {
            graph,
            formatter,
            out,
            cleaning_up: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(err) = writeln!(self.out, "{text}") {
            warn!(error = %err, "failed to write progress output");
        }
    }
}

impl<W: Write + Send> EventLogger for ConsoleEventLogger<W> {
    fn on_step_starting(&mut self, step: &TaskStep) {
        if step.is_cleanup_step() {
            if !self.cleaning_up {
                self.cleaning_up = true;
                self.line("Cleaning up...");
            }
            return;
        }

        let text = match step {
            TaskStep::BuildImage { container, .. } => {
                format!("Building {}...", self.graph.name_of(*container))
            }
            TaskStep::PullImage { source } => format!("Pulling {}...", source.image_name),
            TaskStep::StartContainer { container, .. } => {
                format!("Starting {}...", self.graph.name_of(*container))
            }
            TaskStep::RunContainer { container, .. } => {
                let container = self.graph.container(*container);
                match &container.command {
                    Some(command) => format!("Running {} in {}...", command, container.name),
                    None => format!("Running {}...", container.name),
                }
            }
            TaskStep::RunContainerSetupCommands { container, .. }
                if !self.graph.container(*container).setup_commands.is_empty() =>
            {
                format!("Running setup commands for {}...", self.graph.name_of(*container))
            }
            _ => return,
        };

        self.line(&text);
    }

    fn on_event(&mut self, event: &TaskEvent) {
        let text = match event {
            TaskEvent::ImageBuilt { container, .. } => {
                format!("Built {}.", self.graph.name_of(*container))
            }
            TaskEvent::ImagePulled { source, .. } => format!("Pulled {}.", source.image_name),
            TaskEvent::ContainerBecameReady { container }
                if *container != self.graph.task_container() =>
            {
                format!("{} has started.", self.graph.name_of(*container))
            }
            TaskEvent::RunningContainerExited {
                container,
                exit_code,
            } => format!(
                "{} finished with exit code {}.",
                self.graph.name_of(*container),
                exit_code
            ),
            TaskEvent::Failed(failure) => format!("\n{}\n", self.formatter.format_error_message(failure)),
            _ => return,
        };

        self.line(&text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigFile, ContainerConfig, RawConfigFile, TaskConfig, TaskRunConfig};
    use crate::execution::{DockerContainer, DockerNetwork, TaskFailure};
    use crate::types::CleanupBehaviour;

    fn graph() -> Arc<DependencyGraph> {
        let mut raw = RawConfigFile::default();
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
                    command: Some("make test".into()),
                    environment: Default::default(),
                },
                dependencies: vec![],
                prerequisites: vec![],
                network: None,
            },
        );
        let cfg = ConfigFile::try_from(raw).unwrap();
        Arc::new(DependencyGraph::new(&cfg, "t").unwrap())
    }

    fn logger() -> ConsoleEventLogger<Vec<u8>> {
        let graph = graph();
        let formatter = FailureErrorMessageFormatter::new(graph.clone(), CleanupBehaviour::Cleanup);
        ConsoleEventLogger::new(graph, formatter, Vec::new())
    }

    fn output(logger: ConsoleEventLogger<Vec<u8>>) -> String {
        String::from_utf8(logger.into_inner()).unwrap()
    }

    #[test]
    fn announces_cleanup_once() {
        let mut logger = logger();
        let app = logger.graph.task_container();
        let dc = DockerContainer {
            id: "x".into(),
            name: "y".into(),
        };

        logger.on_step_starting(&TaskStep::RunContainer {
            container: app,
            docker_container: dc.clone(),
        });
        logger.on_step_starting(&TaskStep::StopContainer {
            container: app,
            docker_container: dc,
        });
        logger.on_step_starting(&TaskStep::DeleteTaskNetwork {
            network: DockerNetwork { id: "n".into() },
        });

        assert_eq!(output(logger), "Running make test in app...\nCleaning up...\n");
    }

    #[test]
    fn prints_failures_with_formatted_message() {
        let mut logger = logger();

        logger.on_event(&TaskEvent::Failed(TaskFailure::TaskNetworkCreationFailed {
            message: "no space".into(),
        }));

        assert_eq!(
            output(logger),
            "\nError: Could not create network for task.\nno space\n\n"
        );
    }
}
