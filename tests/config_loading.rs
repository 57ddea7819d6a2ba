// tests/config_loading.rs

use std::fs;

use tempfile::tempdir;

use taskdock::config::load_and_validate;
use taskdock::dag::{DependencyGraph, ImageSource, execution_order};
use taskdock::errors::TaskdockError;

const SHOP_CONFIG: &str = r#"
project_name = "shop"

[container.db]
image = "postgres:16"
environment = { POSTGRES_PASSWORD = "pw" }
health_check = { command = "pg_isready", interval = "1s", retries = 10 }
setup_commands = [{ command = "psql -c 'select 1'", working_directory = "/" }]

[container.app]
build_directory = "app"
build_args = { VERSION = "1" }
dependencies = ["db"]
volumes = ["./src:/code", "cache:/cache"]
working_directory = "/code"
command = "cargo build"
run_as_current_user = { enabled = true, home_directory = "/home/container-user" }

[task.test]
description = "Run the tests"
run = { container = "app", command = "cargo test", environment = { CI = "1" } }
"#;

#[test]
fn loads_a_full_project_and_resolves_paths() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("taskdock.toml");
    fs::write(&path, SHOP_CONFIG).unwrap();

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.project_name, "shop");
    assert_eq!(cfg.task["test"].description.as_deref(), Some("Run the tests"));

    let graph = DependencyGraph::new(&cfg, "test").unwrap();
    let app = graph.container(graph.task_container());
    let base = fs::canonicalize(dir.path()).unwrap();

    match &app.image_source {
        ImageSource::Build(build) => {
            assert_eq!(build.build_directory, base.join("app"));
            assert_eq!(build.build_args.get("VERSION").map(String::as_str), Some("1"));
        }
        other => panic!("expected a build image source, got {other:?}"),
    }

    assert_eq!(app.command.as_deref(), Some("cargo test"));
    assert_eq!(app.volumes[0], format!("{}:/code", base.join("./src").display()));
    assert_eq!(app.volumes[1], "cache:/cache");
    assert!(app.runs_as_current_user());

    let db = graph.find("db").unwrap();
    assert_eq!(graph.container(db).setup_commands.len(), 1);
    assert!(graph.dependencies_of(graph.task_container()).contains(&db));
}

#[test]
fn project_name_defaults_to_the_config_directory() {
    let dir = tempdir().unwrap();
    let project = dir.path().join("My Service");
    fs::create_dir(&project).unwrap();
    let path = project.join("taskdock.toml");
    fs::write(
        &path,
        r#"
[container.app]
image = "alpine"

[task.hello]
run = { container = "app", command = "echo hello" }
"#,
    )
    .unwrap();

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.project_name, "my-service");
}

#[test]
fn dependency_cycles_are_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("taskdock.toml");
    fs::write(
        &path,
        r#"
[container.a]
image = "alpine"
dependencies = ["b"]

[container.b]
image = "alpine"
dependencies = ["a"]

[task.t]
run = { container = "a" }
"#,
    )
    .unwrap();

    assert!(matches!(
        load_and_validate(&path),
        Err(TaskdockError::DependencyCycle(_))
    ));
}

#[test]
fn container_needs_exactly_one_image_source() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("taskdock.toml");
    fs::write(
        &path,
        r#"
[container.app]
image = "alpine"
build_directory = "app"

[task.t]
run = { container = "app" }
"#,
    )
    .unwrap();

    match load_and_validate(&path) {
        Err(TaskdockError::ConfigError(msg)) => assert!(msg.contains("only one of")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn malformed_toml_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("taskdock.toml");
    fs::write(&path, "[container.app\nimage = ").unwrap();

    assert!(matches!(load_and_validate(&path), Err(TaskdockError::TomlError(_))));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();

    assert!(matches!(
        load_and_validate(dir.path().join("nope.toml")),
        Err(TaskdockError::IoError(_))
    ));
}

#[test]
fn task_prerequisites_are_read_and_ordered() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("taskdock.toml");
    fs::write(
        &path,
        r#"
[container.app]
image = "alpine"

[task.build]
run = { container = "app", command = "make" }

[task."test:unit"]
prerequisites = ["build"]
run = { container = "app", command = "make test" }

[task.ci]
prerequisites = ["test:*", "build"]
run = { container = "app", command = "true" }
"#,
    )
    .unwrap();

    let cfg = load_and_validate(&path).unwrap();

    assert_eq!(cfg.task["ci"].prerequisites, vec!["test:*", "build"]);
    assert_eq!(execution_order(&cfg, "ci", false).unwrap(), vec!["build", "test:unit", "ci"]);
}
