// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::config::prerequisites::expand_prerequisites;
use crate::errors::{Result, TaskdockError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TaskdockError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_project_name(cfg)?;
    validate_image_sources(cfg)?;
    validate_container_dependencies(cfg)?;
    validate_tasks(cfg)?;
    validate_dependency_graph(cfg)?;
    validate_task_prerequisites(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(TaskdockError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_project_name(cfg: &RawConfigFile) -> Result<()> {
    if let Some(name) = &cfg.project_name {
        if name.trim().is_empty() {
            return Err(TaskdockError::ConfigError(
                "project_name must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_image_sources(cfg: &RawConfigFile) -> Result<()> {
    for (name, container) in cfg.container.iter() {
        match (&container.image, &container.build_directory) {
            (Some(_), Some(_)) => {
                return Err(TaskdockError::ConfigError(format!(
                    "container '{}' must set only one of `image` and `build_directory`",
                    name
                )));
            }
            (None, None) => {
                return Err(TaskdockError::ConfigError(format!(
                    "container '{}' must set one of `image` or `build_directory`",
                    name
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

fn validate_container_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, container) in cfg.container.iter() {
        for dep in container.dependencies.iter() {
            if !cfg.container.contains_key(dep) {
                return Err(TaskdockError::ConfigError(format!(
                    "container '{}' has unknown dependency '{}' in `dependencies`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(TaskdockError::ConfigError(format!(
                    "container '{}' cannot depend on itself",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if !cfg.container.contains_key(&task.run.container) {
            return Err(TaskdockError::ConfigError(format!(
                "task '{}' runs unknown container '{}'",
                name, task.run.container
            )));
        }
        for dep in task.dependencies.iter() {
            if !cfg.container.contains_key(dep) {
                return Err(TaskdockError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `dependencies`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_dependency_graph(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dependency -> dependent
    // For:
    //   [container.app]
    //   dependencies = ["db"]
    // we add edge db -> app.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.container.keys() {
        graph.add_node(name.as_str());
    }

    for (name, container) in cfg.container.iter() {
        for dep in container.dependencies.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(TaskdockError::DependencyCycle(format!(
                "cycle detected in container dependencies involving container '{}'",
                node
            )))
        }
    }
}

fn validate_task_prerequisites(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: prerequisite -> task that needs it.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for (name, task) in cfg.task.iter() {
        graph.add_node(name.as_str());

        for prerequisite in expand_prerequisites(task, &cfg.task)? {
            let Some((prerequisite, _)) = cfg.task.get_key_value(&prerequisite) else {
                return Err(TaskdockError::ConfigError(format!(
                    "task '{}' has unknown prerequisite '{}'",
                    name, prerequisite
                )));
            };
            graph.add_edge(prerequisite.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(TaskdockError::DependencyCycle(format!(
            "cycle detected in task prerequisites involving task '{}'",
            cycle.node_id()
        ))),
    }
}
