use rand::Rng;
use reqwest::StatusCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Task {
    Docs,
    BadCredentials,
    ListUsers,
    ValidateToken,
    ValidateAnonymous,
}

impl Task {
    pub const ALL: [Task; 5] = [
        Task::Docs,
        Task::BadCredentials,
        Task::ListUsers,
        Task::ValidateToken,
        Task::ValidateAnonymous,
    ];

    pub fn weight(self) -> u32 {
        match self {
            Task::Docs => 2,
            Task::BadCredentials => 2,
            Task::ListUsers => 1,
            Task::ValidateToken => 4,
            Task::ValidateAnonymous => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Task::Docs => "docs",
            Task::BadCredentials => "login_bad_credentials",
            Task::ListUsers => "list_users",
            Task::ValidateToken => "validate_token",
            Task::ValidateAnonymous => "validate_anonymous",
        }
    }

    pub fn expected_status(self) -> StatusCode {
        match self {
            Task::BadCredentials => StatusCode::NOT_FOUND,
            Task::ValidateAnonymous => StatusCode::UNAUTHORIZED,
            _ => StatusCode::OK,
        }
    }

    /// Checks a response status against what the task expects.
    pub fn judge(self, status: StatusCode) -> Result<(), String> {
        let expected = self.expected_status();
        if status == expected {
            Ok(())
        } else {
            Err(format!("expected {expected}, got {status}"))
        }
    }
}

/// Weighted task picker.
#[derive(Debug, Clone)]
pub struct Scenario {
    tasks: Vec<(Task, u32)>,
    total: u32,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new(Task::ALL.iter().map(|t| (*t, t.weight())))
    }
}

impl Scenario {
    pub fn new(tasks: impl IntoIterator<Item = (Task, u32)>) -> Self {
        let tasks: Vec<(Task, u32)> = tasks.into_iter().filter(|(_, w)| *w > 0).collect();
        let total = tasks.iter().map(|(_, w)| w).sum();
        Self { tasks, total }
    }

    pub fn total_weight(&self) -> u32 {
        self.total
    }

    /// Task at `ticket` in `0..total_weight()`.
    pub fn task_at(&self, mut ticket: u32) -> Option<Task> {
        for (task, weight) in &self.tasks {
            if ticket < *weight {
                return Some(*task);
            }
            ticket -= weight;
        }
        None
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Task> {
        if self.total == 0 {
            return None;
        }
        self.task_at(rng.gen_range(0..self.total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    #[test]
    fn tickets_map_onto_weights() {
        let scenario = Scenario::default();
        assert_eq!(scenario.total_weight(), 13);
        let mut counts: HashMap<Task, u32> = HashMap::new();
        for ticket in 0..scenario.total_weight() {
            let task = scenario.task_at(ticket).unwrap();
            *counts.entry(task).or_default() += 1;
        }
        for task in Task::ALL {
            assert_eq!(counts[&task], task.weight(), "{}", task.name());
        }
        assert_eq!(scenario.task_at(13), None);
    }

    #[test]
    fn random_picks_follow_the_weights() {
        let scenario = Scenario::default();
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts: HashMap<Task, u32> = HashMap::new();
        for _ in 0..13_000 {
            *counts.entry(scenario.pick(&mut rng).unwrap()).or_default() += 1;
        }
        let list = counts[&Task::ListUsers];
        let validate = counts[&Task::ValidateToken];
        assert!((800..1200).contains(&list), "list_users {list}");
        assert!((3600..4400).contains(&validate), "validate {validate}");
    }

    #[test]
    fn empty_scenario_picks_nothing() {
        let scenario = Scenario::new([(Task::Docs, 0)]);
        assert_eq!(scenario.pick(&mut StdRng::seed_from_u64(1)), None);
    }

    #[test]
    fn failures_are_status_mismatches() {
        assert!(Task::BadCredentials.judge(StatusCode::NOT_FOUND).is_ok());
        let anonymous = Task::ValidateAnonymous;
        assert!(anonymous.judge(StatusCode::UNAUTHORIZED).is_ok());
        assert_eq!(
            Task::ValidateToken.judge(StatusCode::UNAUTHORIZED),
            Err("expected 200 OK, got 401 Unauthorized".to_string())
        );
        assert!(Task::Docs.judge(StatusCode::TOO_MANY_REQUESTS).is_err());
    }
}
