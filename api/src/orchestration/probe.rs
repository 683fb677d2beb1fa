use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, sleep, timeout};

use crate::orchestration::duration::format_duration;
use crate::orchestration::topology::{HealthCheck, ProbeTarget};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("probe timed out after {}", format_duration(*.0))]
    Timeout(Duration),
    #[error("probe command exited with {0}")]
    CommandFailed(String),
    #[error("probe returned HTTP {0}")]
    HttpStatus(u16),
    #[error("{0}")]
    Unreachable(String),
    #[error("unhealthy after {failures} consecutive failures (last: {last})")]
    Exhausted { failures: u32, last: String },
}

/// Runs one health probe attempt.
#[async_trait]
pub trait ProbeRunner: Send + Sync {
    async fn probe(&self, target: &ProbeTarget) -> Result<(), ProbeError>;
}

/// Probes real endpoints: child processes, HTTP GETs and TCP connects.
pub struct SystemProbe {
    client: reqwest::Client,
}

impl SystemProbe {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build http client: {e}"))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ProbeRunner for SystemProbe {
    async fn probe(&self, target: &ProbeTarget) -> Result<(), ProbeError> {
        match target {
            ProbeTarget::Command(argv) => {
                let Some((program, args)) = argv.split_first() else {
                    return Err(ProbeError::Unreachable("empty probe command".into()));
                };
                let status = tokio::process::Command::new(program)
                    .args(args)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .kill_on_drop(true)
                    .status()
                    .await
                    .map_err(|e| ProbeError::Unreachable(format!("cannot run {program}: {e}")))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(ProbeError::CommandFailed(status.to_string()))
                }
            }
            ProbeTarget::Http(url) => {
                let resp = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| ProbeError::Unreachable(e.to_string()))?;
                if resp.status().is_success() {
                    Ok(())
                } else {
                    Err(ProbeError::HttpStatus(resp.status().as_u16()))
                }
            }
            ProbeTarget::Tcp(addr) => tokio::net::TcpStream::connect(addr.as_str())
                .await
                .map(|_| ())
                .map_err(|e| ProbeError::Unreachable(format!("{addr}: {e}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Polls `check` until one attempt succeeds or `retries` consecutive attempts
/// fail after the start period.
pub async fn wait_until_healthy(
    runner: &dyn ProbeRunner,
    check: &HealthCheck,
) -> Result<ProbeReport, ProbeError> {
    let started = Instant::now();
    let mut attempts = 0u32;
    let mut failures = 0u32;
    loop {
        attempts += 1;
        let result = match timeout(check.timeout, runner.probe(&check.test)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(check.timeout)),
        };
        match result {
            Ok(()) => {
                return Ok(ProbeReport {
                    attempts,
                    elapsed: started.elapsed(),
                });
            }
            Err(err) => {
                let in_start_period = started.elapsed() < check.start_period;
                if in_start_period {
                    failures = 0;
                } else {
                    failures += 1;
                }
                tracing::debug!(
                    target_probe = %check.test,
                    attempt = attempts,
                    failures,
                    in_start_period,
                    error = %err,
                    "probe_failed"
                );
                if failures >= check.retries {
                    return Err(ProbeError::Exhausted {
                        failures,
                        last: err.to_string(),
                    });
                }
            }
        }
        sleep(check.interval).await;
    }
}
