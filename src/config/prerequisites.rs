// src/config/prerequisites.rs

//! Expansion of `prerequisites = [...]` entries into task names.

use std::collections::BTreeMap;

use regex::Regex;

use crate::config::model::TaskConfig;
use crate::errors::{Result, TaskdockError};

/// Expand the prerequisites of `task` into concrete task names.
///
/// An entry containing `*` matches every task whose name fits the pattern,
/// in name order. Other entries are passed through unchanged, so a name that
/// does not exist is left for the caller to report.
pub fn expand_prerequisites(
    task: &TaskConfig,
    tasks: &BTreeMap<String, TaskConfig>,
) -> Result<Vec<String>> {
    let mut names = Vec::new();

    for entry in &task.prerequisites {
        if !entry.contains('*') {
            names.push(entry.clone());
            continue;
        }

        let pattern = wildcard_regex(entry)?;
        names.extend(tasks.keys().filter(|name| pattern.is_match(name)).cloned());
    }

    Ok(names)
}

fn wildcard_regex(entry: &str) -> Result<Regex> {
    let body = entry
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    Regex::new(&format!("^{body}$")).map_err(|e| {
        TaskdockError::ConfigError(format!("invalid prerequisite pattern '{entry}': {e}"))
    })
}
