// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization plus filling in the project name
/// and base directory; it does **not** perform semantic validation. Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let mut config: RawConfigFile = toml::from_str(&contents)?;

    let base_directory = config_root_dir(path);
    if config.project_name.is_none() {
        config.project_name = project_name_from_dir(&base_directory);
    }
    config.base_directory = base_directory;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - containers with no (or two) image sources,
///   - unknown dependency references,
///   - dependency cycles,
///   - tasks whose run container does not exist.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Default config file location: `taskdock.toml` in the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("taskdock.toml")
}

/// - If the config path has a non-empty parent (e.g. "configs/taskdock.toml"),
///   we use that directory.
/// - If it's just a bare filename like "taskdock.toml" (parent = ""),
///   we fall back to the current working directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    let dir = match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };

    fs::canonicalize(&dir).unwrap_or(dir)
}

fn project_name_from_dir(dir: &Path) -> Option<String> {
    let name = dir.file_name()?.to_str()?.to_lowercase();
    let sanitised: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();

    if sanitised.is_empty() { None } else { Some(sanitised) }
}
