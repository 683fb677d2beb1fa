mod support;

use std::time::Duration;

use backend::loadtest::{self, LoadTestConfig, Scenario, Task};

use support::{ADMIN_EMAIL, ADMIN_PASSWORD, spawn_app};

fn config(base_url: String, api_prefix: String, password: &str) -> LoadTestConfig {
    LoadTestConfig {
        base_url,
        api_prefix,
        users: 2,
        duration: Duration::from_millis(800),
        min_wait: Duration::from_millis(5),
        max_wait: Duration::from_millis(20),
        superadmin_email: ADMIN_EMAIL.to_string(),
        superadmin_password: password.to_string(),
        insecure: false,
        request_timeout: Duration::from_secs(5),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_task_meets_its_expected_status() {
    let app = spawn_app(&[]).await;
    let cfg = config(app.base.clone(), app.api.clone(), ADMIN_PASSWORD);

    let report = loadtest::run(cfg, Scenario::default()).await.unwrap();

    assert_eq!(report.login_failures, 0);
    assert_eq!(report.total_failures(), 0, "{report}");
    assert!(report.total_requests() > 0);
    let validate = &report.tasks[&Task::ValidateToken];
    assert!(validate.requests() > 0, "{report}");
}

#[tokio::test]
async fn rejected_logins_are_counted_as_failures() {
    let app = spawn_app(&[]).await;
    let cfg = config(app.base.clone(), app.api.clone(), "wrong-password");

    let report = loadtest::run(cfg, Scenario::default()).await.unwrap();

    assert_eq!(report.login_failures, 2);
    assert_eq!(report.total_requests(), 0);
    assert_eq!(report.total_failures(), 2);
}
