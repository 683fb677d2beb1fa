//! Synthetic traffic against a running deployment.
//!
//! Each virtual user logs in as the superadmin, then loops over weighted
//! tasks with a random pause between them until the run deadline.

pub mod scenario;
pub mod stats;

use std::time::Duration;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tokio::task::JoinSet;
use tokio::time::Instant;

pub use scenario::{Scenario, Task};
pub use stats::{LoadReport, TaskSummary};

#[derive(Debug, Clone)]
pub struct LoadTestConfig {
    /// Scheme and host, e.g. `https://api.example.com`.
    pub base_url: String,
    pub api_prefix: String,
    pub users: usize,
    pub duration: Duration,
    pub min_wait: Duration,
    pub max_wait: Duration,
    pub superadmin_email: String,
    pub superadmin_password: String,
    /// Skip TLS verification for self-signed proxy certificates.
    pub insecure: bool,
    pub request_timeout: Duration,
}

impl LoadTestConfig {
    fn url(&self, path: &str) -> String {
        format!(
            "{}{}{}",
            self.base_url.trim_end_matches('/'),
            self.api_prefix,
            path
        )
    }

    fn docs_url(&self) -> String {
        format!("{}/docs/", self.base_url.trim_end_matches('/'))
    }

    fn pause<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max_wait <= self.min_wait {
            return self.min_wait;
        }
        rng.gen_range(self.min_wait..=self.max_wait)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Clone)]
struct VirtualUser {
    http: reqwest::Client,
    cfg: LoadTestConfig,
    scenario: Scenario,
}

impl VirtualUser {
    async fn login(&self) -> anyhow::Result<String> {
        let res = self
            .http
            .post(self.cfg.url("/login/creds"))
            .form(&[
                ("username", self.cfg.superadmin_email.as_str()),
                ("password", self.cfg.superadmin_password.as_str()),
            ])
            .send()
            .await?;
        let status = res.status();
        anyhow::ensure!(status.is_success(), "superadmin login returned {status}");
        Ok(res.json::<TokenResponse>().await?.access_token)
    }

    async fn perform(&self, task: Task, token: &str) -> Result<(), String> {
        let request = match task {
            Task::Docs => self.http.get(self.cfg.docs_url()),
            Task::BadCredentials => {
                let email = format!("loadtest-{}@example.com", uuid::Uuid::new_v4().simple());
                self.http
                    .post(self.cfg.url("/login/creds"))
                    .form(&[
                        ("username", email.as_str()),
                        ("password", "wrong-password"),
                    ])
            }
            Task::ListUsers => self.http.get(self.cfg.url("/users")).bearer_auth(token),
            Task::ValidateToken => self
                .http
                .get(self.cfg.url("/login/validate"))
                .bearer_auth(token),
            Task::ValidateAnonymous => self.http.get(self.cfg.url("/login/validate")),
        };
        match request.send().await {
            Ok(res) => task.judge(res.status()),
            Err(err) => Err(err.to_string()),
        }
    }

    async fn run(self, id: usize, deadline: Instant) -> LoadReport {
        let mut report = LoadReport::default();
        let started = Instant::now();
        let token = match self.login().await {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!(user = id, error = %err, "virtual user could not log in");
                report.login_failures += 1;
                return report;
            }
        };
        let mut rng = StdRng::from_entropy();
        while Instant::now() < deadline {
            let Some(task) = self.scenario.pick(&mut rng) else {
                break;
            };
            let t0 = Instant::now();
            let outcome = self.perform(task, &token).await;
            report.record(task, t0.elapsed(), outcome.is_ok());
            if let Err(reason) = outcome {
                tracing::debug!(user = id, task = task.name(), reason = %reason, "request failed");
            }
            let pause = self.cfg.pause(&mut rng);
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(pause.min(remaining)).await;
        }
        report.elapsed = started.elapsed();
        report
    }
}

/// Runs `cfg.users` virtual users for `cfg.duration` and merges their reports.
pub async fn run(cfg: LoadTestConfig, scenario: Scenario) -> anyhow::Result<LoadReport> {
    let http = reqwest::Client::builder()
        .danger_accept_invalid_certs(cfg.insecure)
        .timeout(cfg.request_timeout)
        .build()
        .context("building http client")?;
    tracing::info!(
        base_url = %cfg.base_url,
        users = cfg.users,
        duration = ?cfg.duration,
        "load test started"
    );

    let deadline = Instant::now() + cfg.duration;
    let user = VirtualUser {
        http,
        cfg: cfg.clone(),
        scenario,
    };
    let mut set = JoinSet::new();
    for id in 0..cfg.users.max(1) {
        set.spawn(user.clone().run(id, deadline));
    }
    let mut report = LoadReport::default();
    while let Some(joined) = set.join_next().await {
        report.merge(joined.context("virtual user panicked")?);
    }
    tracing::info!(
        requests = report.total_requests(),
        failures = report.total_failures(),
        "load test finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> LoadTestConfig {
        LoadTestConfig {
            base_url: "https://api.example.com/".into(),
            api_prefix: "/api/v1".into(),
            users: 2,
            duration: Duration::from_secs(1),
            min_wait: Duration::from_secs(1),
            max_wait: Duration::from_secs(3),
            superadmin_email: "admin@example.com".into(),
            superadmin_password: "secret".into(),
            insecure: false,
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn urls_join_the_api_prefix() {
        let cfg = cfg();
        assert_eq!(
            cfg.url("/login/validate"),
            "https://api.example.com/api/v1/login/validate"
        );
        assert_eq!(cfg.docs_url(), "https://api.example.com/docs/");
    }

    #[test]
    fn pauses_stay_within_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        let cfg = cfg();
        for _ in 0..100 {
            let pause = cfg.pause(&mut rng);
            assert!((cfg.min_wait..=cfg.max_wait).contains(&pause));
        }
        let fixed = LoadTestConfig {
            max_wait: Duration::ZERO,
            ..cfg
        };
        assert_eq!(fixed.pause(&mut rng), Duration::from_secs(1));
    }
}
