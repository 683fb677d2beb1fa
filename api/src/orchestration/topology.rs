//! Stack files: the services of one environment, how to run them, and what
//! each of them has to wait for.
//!
//! ```toml
//! name = "test"
//!
//! [services.db]
//! command = ["postgres", "-D", "/var/lib/postgresql/data"]
//! healthcheck = { test = { command = ["pg_isready", "-U", "app"] }, retries = 10 }
//!
//! [services.migrate]
//! kind = "one_shot"
//! command = ["migrate", "upgrade"]
//! depends_on = { db = "service_healthy" }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;

use crate::orchestration::duration;

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid stack file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("stack declares no services")]
    Empty,
    #[error("service `{0}` has an empty command")]
    EmptyCommand(String),
    #[error("service `{service}` depends on unknown service `{dependency}`")]
    UnknownDependency { service: String, dependency: String },
    #[error("service `{0}` depends on itself")]
    SelfDependency(String),
    #[error("dependency cycle between {}", .0.join(", "))]
    Cycle(Vec<String>),
    #[error("service `{service}` waits for `{dependency}` to be healthy but it has no healthcheck")]
    HealthyWithoutHealthcheck { service: String, dependency: String },
    #[error("service `{service}` waits for one-shot `{dependency}` to be healthy")]
    HealthyOnOneShot { service: String, dependency: String },
    #[error("service `{service}` waits for daemon `{dependency}` to complete")]
    CompletionOnDaemon { service: String, dependency: String },
    #[error("service `{service}` has an invalid healthcheck: {reason}")]
    InvalidHealthcheck { service: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Long-running process, stopped at teardown.
    #[default]
    Daemon,
    /// Task expected to exit; exit code 0 means success.
    OneShot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyCondition {
    ServiceStarted,
    ServiceHealthy,
    ServiceCompletedSuccessfully,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeTarget {
    Command(Vec<String>),
    Http(String),
    Tcp(String),
}

impl std::fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeTarget::Command(argv) => write!(f, "command `{}`", argv.join(" ")),
            ProbeTarget::Http(url) => write!(f, "http {url}"),
            ProbeTarget::Tcp(addr) => write!(f, "tcp {addr}"),
        }
    }
}

fn default_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_retries() -> u32 {
    3
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthCheck {
    pub test: ProbeTarget,
    #[serde(
        default = "default_interval",
        deserialize_with = "duration::deserialize"
    )]
    pub interval: Duration,
    #[serde(
        default = "default_timeout",
        deserialize_with = "duration::deserialize"
    )]
    pub timeout: Duration,
    /// Consecutive failures tolerated after the start period.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Grace window during which failures do not count.
    #[serde(default, deserialize_with = "duration::deserialize")]
    pub start_period: Duration,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSpec {
    pub command: Vec<String>,
    #[serde(default)]
    pub kind: ServiceKind,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub depends_on: BTreeMap<String, DependencyCondition>,
    #[serde(default)]
    pub healthcheck: Option<HealthCheck>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceSpec>,
}

/// A validated stack: every dependency exists and the graph is acyclic.
#[derive(Debug, Clone)]
pub struct Topology {
    name: String,
    services: BTreeMap<String, ServiceSpec>,
}

static ENV_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("valid env reference regex")
});

/// Replaces `${VAR}` and `${VAR:-default}`; unknown variables without a
/// default are left untouched.
pub fn substitute_env<F>(content: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ENV_REF
        .replace_all(content, |caps: &Captures| match (lookup(&caps[1]), caps.get(2)) {
            (Some(v), _) => v,
            (None, Some(default)) => default.as_str().to_string(),
            (None, None) => caps[0].to_string(),
        })
        .into_owned()
}

impl Topology {
    pub fn load(path: &Path) -> Result<Self, TopologyError> {
        let content = std::fs::read_to_string(path).map_err(|source| TopologyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let fallback = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("stack")
            .to_string();
        let content = substitute_env(&content, |key| std::env::var(key).ok());
        let mut topology = Self::from_toml_str(&content)?;
        if topology.name.is_empty() {
            topology.name = fallback;
        }
        Ok(topology)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, TopologyError> {
        let stack: StackFile = toml::from_str(content)?;
        Self::validate(stack)
    }

    pub fn validate(stack: StackFile) -> Result<Self, TopologyError> {
        if stack.services.is_empty() {
            return Err(TopologyError::Empty);
        }
        for (name, spec) in &stack.services {
            if spec.command.first().is_none_or(|c| c.trim().is_empty()) {
                return Err(TopologyError::EmptyCommand(name.clone()));
            }
            if let Some(hc) = &spec.healthcheck {
                validate_healthcheck(name, hc)?;
            }
            for (dep, condition) in &spec.depends_on {
                if dep == name {
                    return Err(TopologyError::SelfDependency(name.clone()));
                }
                let Some(target) = stack.services.get(dep) else {
                    return Err(TopologyError::UnknownDependency {
                        service: name.clone(),
                        dependency: dep.clone(),
                    });
                };
                match condition {
                    DependencyCondition::ServiceHealthy if target.kind == ServiceKind::OneShot => {
                        return Err(TopologyError::HealthyOnOneShot {
                            service: name.clone(),
                            dependency: dep.clone(),
                        });
                    }
                    DependencyCondition::ServiceHealthy if target.healthcheck.is_none() => {
                        return Err(TopologyError::HealthyWithoutHealthcheck {
                            service: name.clone(),
                            dependency: dep.clone(),
                        });
                    }
                    DependencyCondition::ServiceCompletedSuccessfully
                        if target.kind == ServiceKind::Daemon =>
                    {
                        return Err(TopologyError::CompletionOnDaemon {
                            service: name.clone(),
                            dependency: dep.clone(),
                        });
                    }
                    _ => {}
                }
            }
        }
        let topology = Self {
            name: stack.name.unwrap_or_default(),
            services: stack.services,
        };
        // Kahn leaves the nodes of every cycle behind
        let layered: usize = topology.layers().0.iter().map(Vec::len).sum();
        if layered != topology.services.len() {
            return Err(TopologyError::Cycle(topology.layers().1));
        }
        Ok(topology)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.get(name)
    }

    pub fn services(&self) -> impl Iterator<Item = (&str, &ServiceSpec)> {
        self.services.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Services whose `depends_on` names `name`.
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.services
            .iter()
            .filter(|(_, spec)| spec.depends_on.contains_key(name))
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Whether `service` waits on `ancestor`, directly or through other services.
    pub fn depends_transitively(&self, service: &str, ancestor: &str) -> bool {
        let mut stack = vec![service];
        let mut seen = BTreeSet::new();
        while let Some(current) = stack.pop() {
            let Some(spec) = self.services.get(current) else {
                continue;
            };
            for dep in spec.depends_on.keys() {
                if dep == ancestor {
                    return true;
                }
                if seen.insert(dep.as_str()) {
                    stack.push(dep.as_str());
                }
            }
        }
        false
    }

    /// Deterministic start layers: each layer only depends on earlier ones,
    /// names sorted within a layer.
    pub fn startup_layers(&self) -> Vec<Vec<String>> {
        self.layers().0
    }

    fn layers(&self) -> (Vec<Vec<String>>, Vec<String>) {
        let mut remaining: BTreeMap<&str, BTreeSet<&str>> = self
            .services
            .iter()
            .map(|(name, spec)| {
                let deps = spec
                    .depends_on
                    .keys()
                    .map(String::as_str)
                    .filter(|d| self.services.contains_key(*d))
                    .collect();
                (name.as_str(), deps)
            })
            .collect();
        let mut layers = Vec::new();
        loop {
            let ready: Vec<&str> = remaining
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(name, _)| *name)
                .collect();
            if ready.is_empty() {
                break;
            }
            for name in &ready {
                remaining.remove(name);
            }
            for deps in remaining.values_mut() {
                for name in &ready {
                    deps.remove(name);
                }
            }
            layers.push(ready.into_iter().map(str::to_string).collect());
        }
        let stuck = remaining.keys().map(|k| k.to_string()).collect();
        (layers, stuck)
    }
}

fn validate_healthcheck(service: &str, hc: &HealthCheck) -> Result<(), TopologyError> {
    let invalid = |reason: &str| TopologyError::InvalidHealthcheck {
        service: service.to_string(),
        reason: reason.to_string(),
    };
    if hc.retries == 0 {
        return Err(invalid("retries must be at least 1"));
    }
    if hc.timeout.is_zero() {
        return Err(invalid("timeout must be positive"));
    }
    match &hc.test {
        ProbeTarget::Command(argv) if argv.is_empty() => Err(invalid("empty probe command")),
        ProbeTarget::Http(url) if !is_http_url(url) => {
            Err(invalid("http probes need an http:// or https:// URL"))
        }
        ProbeTarget::Tcp(addr) if !addr.contains(':') => Err(invalid("tcp probes need host:port")),
        _ => Ok(()),
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
