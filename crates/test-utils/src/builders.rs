#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use taskdock::config::{
    ConfigFile, ContainerConfig, HealthCheckConfig, RawConfigFile, RunAsCurrentUserConfig,
    SetupCommandConfig, TaskConfig, TaskRunConfig,
};
use taskdock::dag::DependencyGraph;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                project_name: Some("test-project".to_string()),
                ..Default::default()
            },
        }
    }

    pub fn with_container(mut self, name: &str, container: ContainerConfig) -> Self {
        self.config.container.insert(name.to_string(), container);
        self
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }

    /// Build the config and resolve `task` into a dependency graph.
    pub fn graph_for(self, task: &str) -> Arc<DependencyGraph> {
        let cfg = self.build();
        Arc::new(DependencyGraph::new(&cfg, task).expect("Failed to build dependency graph"))
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ContainerConfig`.
pub struct ContainerConfigBuilder {
    container: ContainerConfig,
}

impl ContainerConfigBuilder {
    /// Container whose image is pulled from a registry.
    pub fn image(image: &str) -> Self {
        Self {
            container: ContainerConfig {
                image: Some(image.to_string()),
                ..Default::default()
            },
        }
    }

    /// Container whose image is built from a local directory.
    pub fn build_directory(dir: &str) -> Self {
        Self {
            container: ContainerConfig {
                build_directory: Some(dir.into()),
                ..Default::default()
            },
        }
    }

    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.container.dependencies = deps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn command(mut self, command: &str) -> Self {
        self.container.command = Some(command.to_string());
        self
    }

    pub fn volume(mut self, volume: &str) -> Self {
        self.container.volumes.push(volume.to_string());
        self
    }

    pub fn setup_command(mut self, command: &str) -> Self {
        self.container.setup_commands.push(SetupCommandConfig {
            command: command.to_string(),
            working_directory: None,
        });
        self
    }

    pub fn health_check(mut self, command: &str) -> Self {
        self.container.health_check = Some(HealthCheckConfig {
            command: Some(command.to_string()),
            ..Default::default()
        });
        self
    }

    pub fn run_as_current_user(mut self) -> Self {
        self.container.run_as_current_user = Some(RunAsCurrentUserConfig {
            enabled: true,
            home_directory: "/home/container-user".to_string(),
        });
        self
    }

    pub fn build(self) -> ContainerConfig {
        self.container
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(container: &str) -> Self {
        Self {
            task: TaskConfig {
                description: None,
                run: TaskRunConfig {
                    container: container.to_string(),
                    command: None,
                    environment: BTreeMap::new(),
                },
                dependencies: Vec::new(),
                prerequisites: Vec::new(),
                network: None,
            },
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.task.description = Some(description.to_string());
        self
    }

    pub fn command(mut self, command: &str) -> Self {
        self.task.run.command = Some(command.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.task.run.environment.insert(key.to_string(), value.to_string());
        self
    }

    pub fn dependencies(mut self, deps: &[&str]) -> Self {
        self.task.dependencies = deps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn prerequisites(mut self, tasks: &[&str]) -> Self {
        self.task.prerequisites = tasks.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn network(mut self, network: &str) -> Self {
        self.task.network = Some(network.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
