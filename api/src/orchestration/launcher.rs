use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::orchestration::topology::ServiceSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => f.write_str("termination by signal"),
        }
    }
}

/// A launched service.
#[async_trait]
pub trait ServiceHandle: Send {
    /// Resolves once the service exits. Safe to cancel and call again.
    async fn wait(&mut self) -> anyhow::Result<ExitOutcome>;

    /// Asks the service to stop, forcing it after `grace`.
    async fn stop(&mut self, grace: Duration) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ServiceLauncher: Send + Sync {
    async fn launch(&self, name: &str, spec: &ServiceSpec)
    -> anyhow::Result<Box<dyn ServiceHandle>>;
}

/// Runs services as child processes of the current one.
#[derive(Debug, Default, Clone)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ServiceLauncher for ProcessLauncher {
    async fn launch(
        &self,
        name: &str,
        spec: &ServiceSpec,
    ) -> anyhow::Result<Box<dyn ServiceHandle>> {
        let (program, args) = spec
            .command
            .split_first()
            .with_context(|| format!("service {name} has no command"))?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&spec.environment)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        let child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{program}` for service {name}"))?;
        tracing::info!(service = %name, pid = ?child.id(), "service_launched");
        Ok(Box::new(ProcessHandle {
            name: name.to_string(),
            child,
            exit: None,
        }))
    }
}

pub struct ProcessHandle {
    name: String,
    child: Child,
    exit: Option<ExitOutcome>,
}

#[async_trait]
impl ServiceHandle for ProcessHandle {
    async fn wait(&mut self) -> anyhow::Result<ExitOutcome> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        let status = self
            .child
            .wait()
            .await
            .with_context(|| format!("failed to wait for service {}", self.name))?;
        let exit = ExitOutcome {
            code: status.code(),
        };
        self.exit = Some(exit);
        Ok(exit)
    }

    async fn stop(&mut self, grace: Duration) -> anyhow::Result<()> {
        if self.exit.is_some() {
            return Ok(());
        }
        if let Some(status) = self.child.try_wait()? {
            self.exit = Some(ExitOutcome {
                code: status.code(),
            });
            return Ok(());
        }

        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            let sent = Command::new("kill")
                .arg("-TERM")
                .arg(pid.to_string())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if let Err(err) = sent {
                tracing::warn!(service = %self.name, error = ?err, "failed to send SIGTERM");
            }
        }

        let waited = tokio::time::timeout(grace, self.wait()).await;
        match waited {
            Ok(result) => {
                let exit = result?;
                tracing::info!(service = %self.name, %exit, "service_stopped");
            }
            Err(_) => {
                tracing::warn!(service = %self.name, ?grace, "grace period elapsed, killing service");
                self.child.kill().await?;
                self.exit = Some(ExitOutcome { code: None });
            }
        }
        Ok(())
    }
}
