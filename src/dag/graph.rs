// src/dag/graph.rs

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use tracing::debug;

use crate::config::{ConfigFile, ContainerConfig};
use crate::dag::container::{BuildImage, Container, ContainerId, ImageSource, PullImage};
use crate::errors::{Result, TaskdockError};

/// One container plus its resolved edges.
#[derive(Debug, Clone)]
pub struct ContainerNode {
    pub id: ContainerId,
    pub container: Container,
    /// Direct dependencies: containers that must be ready before this one starts.
    pub dependencies: BTreeSet<ContainerId>,
    /// Direct dependents: containers that list this one as a dependency.
    pub dependents: BTreeSet<ContainerId>,
}

/// Immutable graph of the containers taking part in one task.
///
/// Nodes live in a flat arena indexed by [`ContainerId`]; edges are stored as
/// id sets on both ends so the graph never holds cyclic references.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    project_name: String,
    task_name: String,
    custom_network: Option<String>,
    nodes: Vec<ContainerNode>,
    task_container: ContainerId,
}

impl DependencyGraph {
    /// Build the graph for `task_name`: the task container, the task's extra
    /// dependencies, and everything they transitively depend on.
    pub fn new(cfg: &ConfigFile, task_name: &str) -> Result<Self> {
        let task = cfg
            .task
            .get(task_name)
            .ok_or_else(|| TaskdockError::TaskNotFound(task_name.to_string()))?;

        let task_container_name = task.run.container.as_str();

        if task.dependencies.iter().any(|d| d == task_container_name) {
            return Err(TaskdockError::Dependency(format!(
                "the task '{}' cannot have the container '{}' as both the task container and also a dependency",
                task_name, task_container_name
            )));
        }

        let mut builder = GraphBuilder {
            cfg,
            task_name,
            nodes: Vec::new(),
            ids: HashMap::new(),
        };

        let task_container_cfg =
            builder.find_container(task_container_name, &format!("task '{}'", task_name))?;

        let mut root_deps: Vec<String> = task.dependencies.clone();
        for dep in &task_container_cfg.dependencies {
            if !root_deps.contains(dep) {
                root_deps.push(dep.clone());
            }
        }

        let task_container = builder.get_or_create(task_container_name, &root_deps, &[])?;

        let mut nodes = builder.nodes;
        let root = &mut nodes[task_container.0].container;
        if let Some(command) = &task.run.command {
            root.command = Some(command.clone());
        }
        root.environment.extend(
            task.run
                .environment
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        // Populate dependents from dependencies.
        let edges: Vec<(ContainerId, ContainerId)> = nodes
            .iter()
            .flat_map(|n| n.dependencies.iter().map(move |dep| (*dep, n.id)))
            .collect();
        for (dep, dependent) in edges {
            nodes[dep.0].dependents.insert(dependent);
        }

        debug!(
            task = %task_name,
            containers = nodes.len(),
            "built container dependency graph"
        );

        Ok(Self {
            project_name: cfg.project_name.clone(),
            task_name: task_name.to_string(),
            custom_network: task.network.clone(),
            nodes,
            task_container,
        })
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Existing network the task should join instead of creating its own.
    pub fn custom_network(&self) -> Option<&str> {
        self.custom_network.as_deref()
    }

    /// The container whose exit code is the task's result.
    pub fn task_container(&self) -> ContainerId {
        self.task_container
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ContainerNode> {
        self.nodes.iter()
    }

    /// Panics if `id` does not belong to this graph.
    pub fn node(&self, id: ContainerId) -> &ContainerNode {
        &self.nodes[id.0]
    }

    pub fn container(&self, id: ContainerId) -> &Container {
        &self.node(id).container
    }

    pub fn name_of(&self, id: ContainerId) -> &str {
        &self.node(id).container.name
    }

    pub fn find(&self, name: &str) -> Option<ContainerId> {
        self.nodes
            .iter()
            .find(|n| n.container.name == name)
            .map(|n| n.id)
    }

    pub fn dependencies_of(&self, id: ContainerId) -> &BTreeSet<ContainerId> {
        &self.node(id).dependencies
    }

    pub fn dependents_of(&self, id: ContainerId) -> &BTreeSet<ContainerId> {
        &self.node(id).dependents
    }
}

struct GraphBuilder<'a> {
    cfg: &'a ConfigFile,
    task_name: &'a str,
    nodes: Vec<ContainerNode>,
    ids: HashMap<String, ContainerId>,
}

impl<'a> GraphBuilder<'a> {
    fn get_or_create(
        &mut self,
        name: &str,
        dependencies: &[String],
        path: &[String],
    ) -> Result<ContainerId> {
        if let Some(id) = self.ids.get(name) {
            return Ok(*id);
        }

        if dependencies.iter().any(|d| d == name) {
            return Err(TaskdockError::Dependency(format!(
                "the container '{}' cannot depend on itself",
                name
            )));
        }

        let mut new_path = path.to_vec();
        new_path.push(name.to_string());

        if path.iter().any(|p| p == name) {
            return Err(TaskdockError::DependencyCycle(format!(
                "there is a dependency cycle in task '{}': {}",
                self.task_name,
                new_path.join(" -> ")
            )));
        }

        let description = format!("container '{}'", name);
        let mut dep_ids = BTreeSet::new();
        for dep in dependencies {
            let dep_cfg = self.find_container(dep, &description)?;
            let dep_deps = dep_cfg.dependencies.clone();
            dep_ids.insert(self.get_or_create(dep, &dep_deps, &new_path)?);
        }

        let cfg = self.find_container(name, &description)?;
        let container = resolve_container(name, cfg, self.cfg)?;

        let id = ContainerId(self.nodes.len());
        self.nodes.push(ContainerNode {
            id,
            container,
            dependencies: dep_ids,
            dependents: BTreeSet::new(),
        });
        self.ids.insert(name.to_string(), id);

        Ok(id)
    }

    fn find_container(&self, name: &str, referenced_by: &str) -> Result<&'a ContainerConfig> {
        self.cfg.container.get(name).ok_or_else(|| {
            TaskdockError::Dependency(format!(
                "the container '{}' referenced by {} does not exist",
                name, referenced_by
            ))
        })
    }
}

fn resolve_container(name: &str, cfg: &ContainerConfig, config: &ConfigFile) -> Result<Container> {
    let image_source = match (&cfg.image, &cfg.build_directory) {
        (_, Some(dir)) => ImageSource::Build(BuildImage {
            build_directory: config.base_directory.join(dir),
            dockerfile: cfg.dockerfile.clone(),
            build_args: cfg.build_args.clone(),
        }),
        (Some(image), None) => ImageSource::Pull(PullImage {
            image_name: image.clone(),
        }),
        (None, None) => {
            return Err(TaskdockError::ConfigError(format!(
                "container '{name}' must set one of 'image' or 'build_directory'"
            )));
        }
    };

    Ok(Container {
        name: name.to_string(),
        image_source,
        command: cfg.command.clone(),
        environment: cfg.environment.clone(),
        working_directory: cfg.working_directory.clone(),
        volumes: cfg
            .volumes
            .iter()
            .map(|v| resolve_volume(v, &config.base_directory))
            .collect(),
        setup_commands: cfg.setup_commands.clone(),
        health_check: cfg.health_check.clone(),
        run_as_current_user: cfg.run_as_current_user.clone(),
    })
}

/// Make the host side of a `./src:/code` style mount absolute.
fn resolve_volume(volume: &str, base_directory: &Path) -> String {
    match volume.split_once(':') {
        Some((local, rest)) if local.starts_with("./") || local.starts_with("../") || local == "." => {
            format!("{}:{}", base_directory.join(local).display(), rest)
        }
        _ => volume.to_string(),
    }
}
