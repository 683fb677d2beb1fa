use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use backend::orchestration::launcher::ProcessLauncher;
use backend::orchestration::probe::SystemProbe;
use backend::orchestration::sequencer::{Sequencer, ServiceState};
use backend::orchestration::topology::{DependencyCondition, ServiceKind, Topology};

fn deploy(file: &str) -> Topology {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../deploy")
        .join(file);
    Topology::load(&path).unwrap_or_else(|e| panic!("{file}: {e}"))
}

fn layer_of(topology: &Topology, name: &str) -> usize {
    topology
        .startup_layers()
        .iter()
        .position(|layer| layer.iter().any(|n| n == name))
        .unwrap()
}

#[test]
fn every_environment_gates_the_server_on_migrations() {
    for file in ["stack.dev.toml", "stack.test.toml", "stack.prod.toml"] {
        let topology = deploy(file);
        assert_eq!(
            topology.get("migrate").unwrap().kind,
            ServiceKind::OneShot,
            "{file}"
        );
        let gated = topology.depends_transitively("backend", "migrate");
        assert!(gated, "{file}");
        let migrate = layer_of(&topology, "migrate");
        assert!(migrate < layer_of(&topology, "backend"), "{file}");
    }
}

#[test]
fn test_environment_waits_for_a_healthy_object_store() {
    let topology = deploy("stack.test.toml");
    let backend = topology.get("backend").unwrap();
    assert_eq!(
        backend.depends_on.get("objects"),
        Some(&DependencyCondition::ServiceHealthy)
    );
    assert!(topology.get("objects").unwrap().healthcheck.is_some());
    assert!(topology.depends_transitively("loadtest", "backend"));
    assert_eq!(topology.dependents("migrate"), vec!["migration-cycle"]);
}

#[test]
fn production_proxy_fronts_a_healthy_server() {
    let topology = deploy("stack.prod.toml");
    assert!(topology.get("objects").is_none());
    assert_eq!(
        topology.get("proxy").unwrap().depends_on.get("backend"),
        Some(&DependencyCondition::ServiceHealthy)
    );
    assert_eq!(
        topology.startup_layers(),
        vec![vec!["migrate"], vec!["backend"], vec!["proxy"]]
    );
}

#[test]
fn dependency_check_bootstraps_a_missing_lockfile() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../Makefile");
    let makefile = std::fs::read_to_string(path).unwrap();
    let recipe: Vec<&str> = makefile
        .lines()
        .skip_while(|line| !line.starts_with("deps:"))
        .skip(1)
        .take_while(|line| line.starts_with('\t'))
        .map(str::trim)
        .collect();
    assert_eq!(
        recipe,
        vec![
            "test -f Cargo.lock || cargo generate-lockfile",
            "cargo metadata --locked --format-version 1 > /dev/null",
        ]
    );
}

/// Real processes: the server refuses to run unless the migration marker
/// exists, so starting it early would fail the bring-up.
#[cfg(unix)]
#[tokio::test]
async fn processes_start_in_dependency_order() {
    let dir = tempfile::tempdir().unwrap();
    let stack = format!(
        r#"
name = "local"

[services.db]
command = ["sh", "-c", "sleep 0.3 && touch db.ready && exec sleep 30"]
working_dir = "{dir}"
healthcheck = {{ test = {{ command = ["test", "-f", "{dir}/db.ready"] }}, interval = "100ms", retries = 50 }}

[services.migrate]
kind = "one_shot"
command = ["sh", "-c", "test -f db.ready && sleep 0.2 && touch migrated"]
working_dir = "{dir}"
depends_on = {{ db = "service_healthy" }}

[services.backend]
command = ["sh", "-c", "test -f migrated || exit 7; exec sleep 30"]
working_dir = "{dir}"
depends_on = {{ migrate = "service_completed_successfully" }}
healthcheck = {{ test = {{ command = ["true"] }}, interval = "100ms", retries = 3 }}
"#,
        dir = dir.path().display()
    );
    let topology = Topology::from_toml_str(&stack).unwrap();
    let sequencer = Sequencer::new(
        topology,
        Arc::new(ProcessLauncher::new()),
        Arc::new(SystemProbe::new().unwrap()),
    );
    let running = sequencer.bring_up().await;
    running.report.ensure_success().unwrap();
    assert_eq!(
        running.report.get("migrate").unwrap().state,
        ServiceState::Completed
    );
    assert_eq!(
        running.report.get("backend").unwrap().state,
        ServiceState::Healthy
    );
    assert_eq!(running.running(), vec!["db", "backend"]);
    let stopped = running.teardown(Duration::from_secs(2)).await;
    assert_eq!(stopped, vec!["backend", "db"]);
}

#[cfg(unix)]
#[tokio::test]
async fn failing_migration_keeps_the_server_down() {
    let stack = r#"
[services.migrate]
kind = "one_shot"
command = ["sh", "-c", "exit 2"]

[services.backend]
command = ["sleep", "30"]
depends_on = { migrate = "service_completed_successfully" }
"#;
    let sequencer = Sequencer::new(
        Topology::from_toml_str(stack).unwrap(),
        Arc::new(ProcessLauncher::new()),
        Arc::new(SystemProbe::new().unwrap()),
    );
    let running = sequencer.bring_up().await;
    let err = running.report.ensure_success().unwrap_err();
    assert_eq!(
        err.to_string(),
        "service `migrate` failed: exited with exit code 2"
    );
    assert_eq!(running.report.get("backend").unwrap().launch_order, None);
    assert!(running.running().is_empty());
}
