use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::scenario::Task;

#[derive(Debug, Default, Clone)]
pub struct TaskStats {
    latencies: Vec<Duration>,
    failures: u64,
}

impl TaskStats {
    pub fn record(&mut self, latency: Duration, ok: bool) {
        self.latencies.push(latency);
        if !ok {
            self.failures += 1;
        }
    }

    pub fn merge(&mut self, other: TaskStats) {
        self.latencies.extend(other.latencies);
        self.failures += other.failures;
    }

    pub fn requests(&self) -> u64 {
        self.latencies.len() as u64
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn summary(&self) -> TaskSummary {
        let mut sorted = self.latencies.clone();
        sorted.sort_unstable();
        TaskSummary {
            requests: self.requests(),
            failures: self.failures,
            p50: percentile(&sorted, 50.0),
            p95: percentile(&sorted, 95.0),
            max: sorted.last().copied().unwrap_or_default(),
        }
    }
}

/// Nearest-rank percentile of an ascending slice.
pub fn percentile(sorted: &[Duration], pct: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSummary {
    pub requests: u64,
    pub failures: u64,
    pub p50: Duration,
    pub p95: Duration,
    pub max: Duration,
}

#[derive(Debug, Default, Clone)]
pub struct LoadReport {
    pub tasks: BTreeMap<Task, TaskStats>,
    pub login_failures: u64,
    pub elapsed: Duration,
}

impl LoadReport {
    pub fn record(&mut self, task: Task, latency: Duration, ok: bool) {
        self.tasks.entry(task).or_default().record(latency, ok);
    }

    pub fn merge(&mut self, other: LoadReport) {
        for (task, stats) in other.tasks {
            self.tasks.entry(task).or_default().merge(stats);
        }
        self.login_failures += other.login_failures;
        self.elapsed = self.elapsed.max(other.elapsed);
    }

    pub fn total_requests(&self) -> u64 {
        self.tasks.values().map(TaskStats::requests).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.tasks.values().map(TaskStats::failures).sum::<u64>() + self.login_failures
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<24} {:>8} {:>8} {:>9} {:>9} {:>9}",
            "task", "reqs", "fails", "p50 ms", "p95 ms", "max ms"
        )?;
        for (task, stats) in &self.tasks {
            let s = stats.summary();
            writeln!(
                f,
                "{:<24} {:>8} {:>8} {:>9} {:>9} {:>9}",
                task.name(),
                s.requests,
                s.failures,
                s.p50.as_millis(),
                s.p95.as_millis(),
                s.max.as_millis()
            )?;
        }
        let secs = self.elapsed.as_secs_f64();
        let rps = if secs > 0.0 {
            self.total_requests() as f64 / secs
        } else {
            0.0
        };
        write!(
            f,
            "total {} requests, {} failures ({} logins failed), {rps:.1} req/s over {secs:.1}s",
            self.total_requests(),
            self.total_failures(),
            self.login_failures
        )
    }
}
