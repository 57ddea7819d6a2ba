// src/dag/task_order.rs

//! Order in which a task and its prerequisite tasks run.

use tracing::info;

use crate::config::{ConfigFile, expand_prerequisites};
use crate::errors::{Result, TaskdockError};

/// Resolve the sequence of tasks to run for `task_name`, prerequisites first.
///
/// Each task appears once, after all of its own prerequisites; the requested
/// task is always last. With `skip_prerequisites` only the requested task is
/// returned.
pub fn execution_order(cfg: &ConfigFile, task_name: &str, skip_prerequisites: bool) -> Result<Vec<String>> {
    if !cfg.task.contains_key(task_name) {
        return Err(TaskdockError::TaskNotFound(task_name.to_string()));
    }

    let order = if skip_prerequisites {
        vec![task_name.to_string()]
    } else {
        let mut order = Vec::new();
        let mut path = vec![task_name.to_string()];
        visit(cfg, task_name, &mut path, &mut order)?;
        order
    };

    info!(task = %task_name, order = ?order, skip_prerequisites, "resolved task execution order");
    Ok(order)
}

fn visit(cfg: &ConfigFile, name: &str, path: &mut Vec<String>, order: &mut Vec<String>) -> Result<()> {
    let task = cfg
        .task
        .get(name)
        .ok_or_else(|| TaskdockError::TaskNotFound(name.to_string()))?;

    for prerequisite in expand_prerequisites(task, &cfg.task)? {
        if !cfg.task.contains_key(&prerequisite) {
            return Err(TaskdockError::Dependency(format!(
                "the task '{prerequisite}' given as a prerequisite of '{name}' does not exist"
            )));
        }

        if path.contains(&prerequisite) {
            path.push(prerequisite);
            return Err(TaskdockError::DependencyCycle(describe_cycle(path)));
        }

        if order.contains(&prerequisite) {
            continue;
        }

        path.push(prerequisite.clone());
        visit(cfg, &prerequisite, path, order)?;
        path.pop();
    }

    order.push(name.to_string());
    Ok(())
}

fn describe_cycle(path: &[String]) -> String {
    let mut description = format!("task '{}' has '{}' as a prerequisite", path[0], path[1]);
    for name in &path[2..] {
        description.push_str(&format!(", which has '{name}' as a prerequisite"));
    }
    description
}
