//! Dependency-gated bring-up.
//!
//! Every service gets its own task and a `watch` channel publishing its
//! [`ServiceState`]. A task waits until each dependency's state satisfies the
//! declared condition, launches its service, then publishes `Started`,
//! `Healthy` or `Completed` only once that is actually true. Independent
//! branches therefore start concurrently and nothing observes a dependency
//! before it is ready.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::select_all;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::orchestration::launcher::{ServiceHandle, ServiceLauncher};
use crate::orchestration::probe::{ProbeRunner, wait_until_healthy};
use crate::orchestration::topology::{DependencyCondition, ServiceKind, ServiceSpec, Topology};

pub const DEFAULT_MAX_PARALLEL_LAUNCHES: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceState {
    Pending,
    /// Launched; for daemons without a healthcheck this is final.
    Started,
    Healthy,
    /// One-shot task exited with code 0.
    Completed,
    Failed(String),
}

impl ServiceState {
    pub fn is_failed(&self) -> bool {
        matches!(self, ServiceState::Failed(_))
    }

    pub fn label(&self) -> &str {
        match self {
            ServiceState::Pending => "pending",
            ServiceState::Started => "started",
            ServiceState::Healthy => "healthy",
            ServiceState::Completed => "completed",
            ServiceState::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Waiting,
    Blocked(String),
}

/// Whether a dependency in `state` satisfies `condition`.
pub fn evaluate(condition: DependencyCondition, state: &ServiceState) -> Readiness {
    use DependencyCondition::*;
    match (condition, state) {
        (_, ServiceState::Failed(_)) => Readiness::Blocked("failed".into()),
        (ServiceStarted, ServiceState::Pending) => Readiness::Waiting,
        (ServiceStarted, _) => Readiness::Ready,
        (ServiceHealthy, ServiceState::Healthy) => Readiness::Ready,
        (ServiceHealthy, ServiceState::Completed) => {
            Readiness::Blocked("exited instead of becoming healthy".into())
        }
        (ServiceCompletedSuccessfully, ServiceState::Completed) => Readiness::Ready,
        _ => Readiness::Waiting,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BringUpError {
    #[error("service `{service}` failed: {reason}")]
    ServiceFailed { service: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct ServiceReport {
    pub name: String,
    pub kind: ServiceKind,
    pub state: ServiceState,
    /// Position among launched services, starting at 0.
    pub launch_order: Option<usize>,
    /// Offsets from the start of the bring-up.
    pub launched_at: Option<Duration>,
    pub settled_at: Duration,
}

#[derive(Debug, Clone)]
pub struct BringUpReport {
    /// Services in startup layer order.
    pub services: Vec<ServiceReport>,
    pub elapsed: Duration,
}

impl BringUpReport {
    pub fn get(&self, name: &str) -> Option<&ServiceReport> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn is_success(&self) -> bool {
        self.services.iter().all(|s| !s.state.is_failed())
    }

    /// First failure in startup order, which is the root cause of the others.
    pub fn ensure_success(&self) -> Result<(), BringUpError> {
        match self.services.iter().find(|s| s.state.is_failed()) {
            Some(ServiceReport {
                name,
                state: ServiceState::Failed(reason),
                ..
            }) => Err(BringUpError::ServiceFailed {
                service: name.clone(),
                reason: reason.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Services left running by a bring-up.
pub struct RunningStack {
    pub report: BringUpReport,
    handles: Vec<(usize, String, Box<dyn ServiceHandle>)>,
}

impl RunningStack {
    /// Names of services with a live handle, in launch order.
    pub fn running(&self) -> Vec<&str> {
        self.handles
            .iter()
            .map(|(_, name, _)| name.as_str())
            .collect()
    }

    /// Stops services in reverse launch order and returns the stop order.
    pub async fn teardown(mut self, grace: Duration) -> Vec<String> {
        self.handles.sort_by_key(|(order, _, _)| Reverse(*order));
        let mut stopped = Vec::with_capacity(self.handles.len());
        for (_, name, mut handle) in self.handles {
            if let Err(err) = handle.stop(grace).await {
                tracing::warn!(service = %name, error = ?err, "service_stop_failed");
            }
            stopped.push(name);
        }
        stopped
    }
}

pub struct Sequencer {
    topology: Arc<Topology>,
    launcher: Arc<dyn ServiceLauncher>,
    prober: Arc<dyn ProbeRunner>,
    max_parallel_launches: usize,
}

struct Dependency {
    name: String,
    condition: DependencyCondition,
    rx: watch::Receiver<ServiceState>,
}

struct ServiceRun {
    name: String,
    spec: ServiceSpec,
    deps: Vec<Dependency>,
    tx: watch::Sender<ServiceState>,
    launcher: Arc<dyn ServiceLauncher>,
    prober: Arc<dyn ProbeRunner>,
    launches: Arc<Semaphore>,
    launch_counter: Arc<AtomicUsize>,
    origin: Instant,
}

struct Finished {
    name: String,
    handle: Option<Box<dyn ServiceHandle>>,
    launch_order: Option<usize>,
    launched_at: Option<Duration>,
    settled_at: Duration,
}

impl Sequencer {
    pub fn new(
        topology: Topology,
        launcher: Arc<dyn ServiceLauncher>,
        prober: Arc<dyn ProbeRunner>,
    ) -> Self {
        Self {
            topology: Arc::new(topology),
            launcher,
            prober,
            max_parallel_launches: DEFAULT_MAX_PARALLEL_LAUNCHES,
        }
    }

    pub fn with_max_parallel_launches(mut self, max: usize) -> Self {
        self.max_parallel_launches = max.max(1);
        self
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Starts every service once its dependencies allow it and returns when
    /// each service is ready or has failed.
    pub async fn bring_up(&self) -> RunningStack {
        let origin = Instant::now();
        tracing::info!(stack = %self.topology.name(), services = self.topology.len(), "bring_up_started");

        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for (name, _) in self.topology.services() {
            let (tx, rx) = watch::channel(ServiceState::Pending);
            senders.insert(name.to_string(), tx);
            receivers.insert(name.to_string(), rx);
        }

        let launches = Arc::new(Semaphore::new(self.max_parallel_launches));
        let launch_counter = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();
        for (name, spec) in self.topology.services() {
            let deps = spec
                .depends_on
                .iter()
                .filter_map(|(dep, condition)| {
                    receivers.get(dep).map(|rx| Dependency {
                        name: dep.clone(),
                        condition: *condition,
                        rx: rx.clone(),
                    })
                })
                .collect();
            let Some(tx) = senders.remove(name) else {
                continue;
            };
            let run = ServiceRun {
                name: name.to_string(),
                spec: spec.clone(),
                deps,
                tx,
                launcher: self.launcher.clone(),
                prober: self.prober.clone(),
                launches: launches.clone(),
                launch_counter: launch_counter.clone(),
                origin,
            };
            tasks.spawn(run.execute());
        }

        let mut finished: HashMap<String, Finished> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(done) => {
                    finished.insert(done.name.clone(), done);
                }
                Err(err) => tracing::error!(error = ?err, "service task aborted"),
            }
        }

        let mut services = Vec::with_capacity(self.topology.len());
        let mut handles = Vec::new();
        for name in self.topology.startup_layers().into_iter().flatten() {
            let kind = self
                .topology
                .get(&name)
                .map(|s| s.kind)
                .unwrap_or_default();
            let mut state = receivers
                .get(&name)
                .map(|rx| rx.borrow().clone())
                .unwrap_or(ServiceState::Pending);
            let done = finished.remove(&name);
            if done.is_none() && !state.is_failed() {
                state = ServiceState::Failed("sequencer task aborted".into());
            }
            let (launch_order, launched_at, settled_at) = match done {
                Some(done) => {
                    if let (Some(order), Some(handle)) = (done.launch_order, done.handle) {
                        handles.push((order, name.clone(), handle));
                    }
                    (done.launch_order, done.launched_at, done.settled_at)
                }
                None => (None, None, origin.elapsed()),
            };
            services.push(ServiceReport {
                name,
                kind,
                state,
                launch_order,
                launched_at,
                settled_at,
            });
        }
        handles.sort_by_key(|(order, _, _)| *order);

        let report = BringUpReport {
            services,
            elapsed: origin.elapsed(),
        };
        if report.is_success() {
            tracing::info!(elapsed = ?report.elapsed, "bring_up_ready");
        } else {
            tracing::error!(elapsed = ?report.elapsed, "bring_up_failed");
        }
        RunningStack { report, handles }
    }
}

impl ServiceRun {
    async fn execute(self) -> Finished {
        let ServiceRun {
            name,
            spec,
            mut deps,
            tx,
            launcher,
            prober,
            launches,
            launch_counter,
            origin,
        } = self;
        let mut finished = Finished {
            name: name.clone(),
            handle: None,
            launch_order: None,
            launched_at: None,
            settled_at: Duration::ZERO,
        };
        let fail = |finished: &mut Finished, reason: String| {
            tracing::error!(service = %name, reason = %reason, "service_failed");
            tx.send_replace(ServiceState::Failed(reason));
            finished.settled_at = origin.elapsed();
        };

        if !deps.is_empty() {
            tracing::debug!(service = %name, waiting_on = deps.len(), "service_waiting");
        }
        if let Err(reason) = wait_for_dependencies(&mut deps).await {
            fail(&mut finished, reason);
            return finished;
        }

        let launched = match launches.acquire().await {
            Ok(_permit) => launcher.launch(&name, &spec).await,
            Err(_) => Err(anyhow::anyhow!("launch slots closed")),
        };
        let mut handle = match launched {
            Ok(handle) => handle,
            Err(err) => {
                fail(&mut finished, format!("launch failed: {err:#}"));
                return finished;
            }
        };
        finished.launch_order = Some(launch_counter.fetch_add(1, Ordering::SeqCst));
        finished.launched_at = Some(origin.elapsed());
        tx.send_replace(ServiceState::Started);

        match (spec.kind, spec.healthcheck.as_ref()) {
            (ServiceKind::OneShot, _) => {
                match handle.wait().await {
                    Ok(exit) if exit.success() => {
                        tracing::info!(service = %name, "service_completed");
                        tx.send_replace(ServiceState::Completed);
                        finished.settled_at = origin.elapsed();
                    }
                    Ok(exit) => fail(&mut finished, format!("exited with {exit}")),
                    Err(err) => fail(&mut finished, format!("{err:#}")),
                }
                return finished;
            }
            (ServiceKind::Daemon, None) => {
                finished.settled_at = origin.elapsed();
            }
            (ServiceKind::Daemon, Some(check)) => {
                let outcome = tokio::select! {
                    probed = wait_until_healthy(prober.as_ref(), check) => {
                        probed.map_err(|e| e.to_string())
                    }
                    exited = handle.wait() => Err(match exited {
                        Ok(exit) => format!("exited with {exit} before becoming healthy"),
                        Err(err) => format!("{err:#}"),
                    }),
                };
                match outcome {
                    Ok(probe) => {
                        tracing::info!(service = %name, attempts = probe.attempts, "service_healthy");
                        tx.send_replace(ServiceState::Healthy);
                        finished.settled_at = origin.elapsed();
                    }
                    Err(reason) => fail(&mut finished, reason),
                }
            }
        }
        finished.handle = Some(handle);
        finished
    }
}

async fn wait_for_dependencies(deps: &mut [Dependency]) -> Result<(), String> {
    loop {
        let mut waiting = Vec::new();
        for (idx, dep) in deps.iter_mut().enumerate() {
            match evaluate(dep.condition, &dep.rx.borrow_and_update()) {
                Readiness::Ready => {}
                Readiness::Waiting => waiting.push(idx),
                Readiness::Blocked(why) => return Err(format!("dependency `{}` {why}", dep.name)),
            }
        }
        if waiting.is_empty() {
            return Ok(());
        }
        // satisfied dependencies may already have dropped their sender
        let changes = deps
            .iter_mut()
            .enumerate()
            .filter(|(idx, _)| waiting.contains(idx))
            .map(|(_, dep)| {
                let name = dep.name.clone();
                Box::pin(async move { dep.rx.changed().await.map_err(|_| name) })
            });
        if let (Err(name), _, _) = select_all(changes).await {
            return Err(format!("dependency `{name}` stopped reporting"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::launcher::ExitOutcome;
    use crate::orchestration::probe::ProbeError;
    use crate::orchestration::topology::ProbeTarget;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum Script {
        Exit { after: Duration, code: i32 },
        RunUntilStopped,
    }

    type Events = Arc<Mutex<Vec<(Duration, String)>>>;

    fn record(events: &Events, origin: Instant, event: String) {
        events.lock().unwrap().push((origin.elapsed(), event));
    }

    struct FakeLauncher {
        scripts: HashMap<String, Script>,
        launch_delay: Duration,
        events: Events,
        origin: Instant,
    }

    #[async_trait]
    impl ServiceLauncher for FakeLauncher {
        async fn launch(
            &self,
            name: &str,
            _spec: &ServiceSpec,
        ) -> anyhow::Result<Box<dyn ServiceHandle>> {
            record(&self.events, self.origin, format!("launch:{name}"));
            tokio::time::sleep(self.launch_delay).await;
            let Some(script) = self.scripts.get(name).copied() else {
                anyhow::bail!("no such binary");
            };
            Ok(Box::new(FakeHandle {
                name: name.to_string(),
                script,
                started: Instant::now(),
                events: self.events.clone(),
                origin: self.origin,
            }))
        }
    }

    struct FakeHandle {
        name: String,
        script: Script,
        started: Instant,
        events: Events,
        origin: Instant,
    }

    #[async_trait]
    impl ServiceHandle for FakeHandle {
        async fn wait(&mut self) -> anyhow::Result<ExitOutcome> {
            match self.script {
                Script::Exit { after, code } => {
                    tokio::time::sleep_until(self.started + after).await;
                    record(&self.events, self.origin, format!("exit:{}", self.name));
                    Ok(ExitOutcome { code: Some(code) })
                }
                Script::RunUntilStopped => std::future::pending().await,
            }
        }

        async fn stop(&mut self, _grace: Duration) -> anyhow::Result<()> {
            record(&self.events, self.origin, format!("stop:{}", self.name));
            Ok(())
        }
    }

    /// Each tcp host fails the configured number of attempts, then passes.
    struct FakeProber {
        failures_before_healthy: HashMap<String, u32>,
        calls: Mutex<HashMap<String, u32>>,
        events: Events,
        origin: Instant,
    }

    #[async_trait]
    impl ProbeRunner for FakeProber {
        async fn probe(&self, target: &ProbeTarget) -> Result<(), ProbeError> {
            let ProbeTarget::Tcp(addr) = target else {
                return Err(ProbeError::Unreachable("unexpected probe".into()));
            };
            let key = addr.split(':').next().unwrap_or(addr).to_string();
            let call = {
                let mut calls = self.calls.lock().unwrap();
                let slot = calls.entry(key.clone()).or_default();
                *slot += 1;
                *slot
            };
            let budget = self.failures_before_healthy.get(&key).copied();
            if call > budget.unwrap_or(0) {
                record(&self.events, self.origin, format!("healthy:{key}"));
                Ok(())
            } else {
                Err(ProbeError::Unreachable("connection refused".into()))
            }
        }
    }

    struct Harness {
        events: Events,
        sequencer: Sequencer,
    }

    fn harness(
        stack: &str,
        scripts: &[(&str, Script)],
        failures: &[(&str, u32)],
        launch_delay: Duration,
    ) -> Harness {
        let events: Events = Arc::default();
        let origin = Instant::now();
        let launcher = FakeLauncher {
            scripts: scripts.iter().map(|(n, s)| (n.to_string(), *s)).collect(),
            launch_delay,
            events: events.clone(),
            origin,
        };
        let prober = FakeProber {
            failures_before_healthy: failures.iter().map(|(n, f)| (n.to_string(), *f)).collect(),
            calls: Mutex::default(),
            events: events.clone(),
            origin,
        };
        let topology = Topology::from_toml_str(stack).unwrap();
        Harness {
            events,
            sequencer: Sequencer::new(topology, Arc::new(launcher), Arc::new(prober)),
        }
    }

    impl Harness {
        fn at(&self, event: &str) -> Option<Duration> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .find(|(_, e)| e == event)
                .map(|(t, _)| *t)
        }

        fn position(&self, event: &str) -> Option<usize> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .position(|(_, e)| e == event)
        }

        fn count(&self, event: &str) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, e)| e == event)
                .count()
        }
    }

    const DEV: &str = r#"
[services.db]
command = ["postgres"]
healthcheck = { test = { tcp = "db:5432" }, interval = "1s", retries = 5 }

[services.migrate]
kind = "one_shot"
command = ["migrate", "upgrade"]
depends_on = { db = "service_healthy" }

[services.backend]
command = ["backend"]
depends_on = { db = "service_healthy", migrate = "service_completed_successfully" }
"#;

    const TEST: &str = r#"
[services.db]
command = ["postgres"]
healthcheck = { test = { tcp = "db:5432" }, interval = "1s", retries = 5 }

[services.objects]
command = ["localstack"]
healthcheck = { test = { tcp = "objects:4566" }, interval = "1s", retries = 10 }

[services.migrate]
kind = "one_shot"
command = ["migrate", "upgrade"]
depends_on = { db = "service_healthy" }

[services.backend]
command = ["backend"]
depends_on = { migrate = "service_completed_successfully", objects = "service_healthy" }
"#;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn exit(after: u64, code: i32) -> Script {
        Script::Exit {
            after: secs(after),
            code,
        }
    }

    #[test]
    fn readiness_follows_the_condition() {
        use DependencyCondition::*;
        use Readiness::*;
        use ServiceState::{Completed, Failed, Healthy, Pending, Started};
        assert_eq!(evaluate(ServiceStarted, &Pending), Waiting);
        assert_eq!(evaluate(ServiceStarted, &Started), Ready);
        assert_eq!(evaluate(ServiceStarted, &Completed), Ready);
        assert_eq!(evaluate(ServiceHealthy, &Started), Waiting);
        assert_eq!(evaluate(ServiceHealthy, &Healthy), Ready);
        assert_eq!(evaluate(ServiceCompletedSuccessfully, &Started), Waiting);
        assert_eq!(evaluate(ServiceCompletedSuccessfully, &Completed), Ready);
        assert!(matches!(
            evaluate(ServiceCompletedSuccessfully, &Failed("x".into())),
            Blocked(_)
        ));
        assert!(matches!(evaluate(ServiceHealthy, &Completed), Blocked(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn server_starts_only_after_migration_completed() {
        let h = harness(
            DEV,
            &[
                ("db", Script::RunUntilStopped),
                ("migrate", exit(3, 0)),
                ("backend", Script::RunUntilStopped),
            ],
            &[("db", 2)],
            Duration::ZERO,
        );
        let stack = h.sequencer.bring_up().await;
        stack.report.ensure_success().unwrap();

        assert_eq!(h.at("launch:db"), Some(secs(0)));
        assert_eq!(h.at("healthy:db"), Some(secs(2)));
        assert_eq!(h.at("launch:migrate"), Some(secs(2)));
        assert_eq!(h.at("exit:migrate"), Some(secs(5)));
        assert_eq!(h.at("launch:backend"), Some(secs(5)));
        assert!(h.position("exit:migrate") < h.position("launch:backend"));

        let report = &stack.report;
        assert_eq!(report.get("db").unwrap().state, ServiceState::Healthy);
        let migrate = report.get("migrate").unwrap();
        assert_eq!(migrate.state, ServiceState::Completed);
        assert_eq!(report.get("backend").unwrap().state, ServiceState::Started);
        assert_eq!(report.get("backend").unwrap().launch_order, Some(2));
        assert_eq!(stack.running(), vec!["db", "backend"]);
    }

    #[tokio::test(start_paused = true)]
    async fn server_waits_for_a_healthy_object_store() {
        let h = harness(
            TEST,
            &[
                ("db", Script::RunUntilStopped),
                ("objects", Script::RunUntilStopped),
                ("migrate", exit(1, 0)),
                ("backend", Script::RunUntilStopped),
            ],
            &[("db", 0), ("objects", 4)],
            Duration::ZERO,
        );
        let stack = h.sequencer.bring_up().await;
        assert!(stack.report.is_success());

        // independent branches start together
        assert_eq!(h.at("launch:db"), Some(secs(0)));
        assert_eq!(h.at("launch:objects"), Some(secs(0)));
        assert_eq!(h.at("exit:migrate"), Some(secs(1)));
        assert_eq!(h.at("healthy:objects"), Some(secs(4)));
        assert_eq!(h.at("launch:backend"), Some(secs(4)));
        let healthy = h.position("healthy:objects");
        assert!(healthy < h.position("launch:backend"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_migration_blocks_the_server_and_is_not_retried() {
        let h = harness(
            DEV,
            &[
                ("db", Script::RunUntilStopped),
                ("migrate", exit(1, 1)),
                ("backend", Script::RunUntilStopped),
            ],
            &[],
            Duration::ZERO,
        );
        let stack = h.sequencer.bring_up().await;

        assert_eq!(h.count("launch:migrate"), 1);
        assert_eq!(h.count("launch:backend"), 0);
        let report = &stack.report;
        assert_eq!(
            report.get("migrate").unwrap().state,
            ServiceState::Failed("exited with exit code 1".into())
        );
        assert_eq!(
            report.get("backend").unwrap().state,
            ServiceState::Failed("dependency `migrate` failed".into())
        );
        let err = report.ensure_success().unwrap_err();
        assert_eq!(
            err.to_string(),
            "service `migrate` failed: exited with exit code 1"
        );

        let stopped = stack.teardown(secs(1)).await;
        assert_eq!(stopped, vec!["db"]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_probes_fail_the_dependency_chain() {
        let h = harness(
            DEV,
            &[
                ("db", Script::RunUntilStopped),
                ("migrate", exit(1, 0)),
                ("backend", Script::RunUntilStopped),
            ],
            &[("db", u32::MAX)],
            Duration::ZERO,
        );
        let stack = h.sequencer.bring_up().await;

        let db = stack.report.get("db").unwrap();
        assert!(db.state.is_failed());
        // five attempts one second apart
        assert_eq!(db.settled_at, secs(4));
        assert_eq!(h.count("launch:migrate"), 0);
        assert_eq!(
            stack.report.get("migrate").unwrap().state,
            ServiceState::Failed("dependency `db` failed".into())
        );
        assert!(stack.report.get("backend").unwrap().state.is_failed());
    }

    #[tokio::test(start_paused = true)]
    async fn daemon_exiting_before_healthy_is_a_failure() {
        let h = harness(
            DEV,
            &[
                ("db", exit(2, 3)),
                ("migrate", exit(1, 0)),
                ("backend", Script::RunUntilStopped),
            ],
            &[("db", u32::MAX)],
            Duration::ZERO,
        );
        let stack = h.sequencer.bring_up().await;
        assert_eq!(
            stack.report.get("db").unwrap().state,
            ServiceState::Failed("exited with exit code 3 before becoming healthy".into())
        );
        assert_eq!(h.count("launch:migrate"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn launch_errors_propagate_to_dependents() {
        let h = harness(
            DEV,
            &[("db", Script::RunUntilStopped), ("migrate", exit(1, 0))],
            &[],
            Duration::ZERO,
        );
        let stack = h.sequencer.bring_up().await;
        let backend = stack.report.get("backend").unwrap();
        let ServiceState::Failed(reason) = &backend.state else {
            panic!("backend should have failed");
        };
        assert!(reason.starts_with("launch failed"), "{reason}");
        assert!(stack.report.get("migrate").unwrap().launch_order.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_runs_in_reverse_start_order() {
        let h = harness(
            TEST,
            &[
                ("db", Script::RunUntilStopped),
                ("objects", Script::RunUntilStopped),
                ("migrate", exit(1, 0)),
                ("backend", Script::RunUntilStopped),
            ],
            &[("objects", 3)],
            Duration::ZERO,
        );
        let stack = h.sequencer.bring_up().await;
        let mut started: Vec<String> = stack.running().into_iter().map(String::from).collect();
        let stopped = stack.teardown(secs(5)).await;
        started.reverse();
        assert_eq!(stopped, started);
        assert_eq!(stopped.first().map(String::as_str), Some("backend"));
        assert!(h.position("stop:backend") < h.position("stop:objects"));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_launches_are_bounded() {
        let stack = r#"
[services.a]
command = ["a"]
[services.b]
command = ["b"]
[services.c]
command = ["c"]
"#;
        let mut h = harness(
            stack,
            &[
                ("a", Script::RunUntilStopped),
                ("b", Script::RunUntilStopped),
                ("c", Script::RunUntilStopped),
            ],
            &[],
            secs(1),
        );
        h.sequencer = h.sequencer.with_max_parallel_launches(2);
        let running = h.sequencer.bring_up().await;
        assert!(running.report.is_success());
        let mut times: Vec<Duration> = ["launch:a", "launch:b", "launch:c"]
            .iter()
            .filter_map(|e| h.at(e))
            .collect();
        times.sort();
        assert_eq!(times, vec![secs(0), secs(0), secs(1)]);
    }
}
