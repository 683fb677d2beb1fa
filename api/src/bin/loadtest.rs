use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;

use backend::bootstrap::telemetry;
use backend::loadtest::{self, LoadTestConfig, Scenario};
use backend::orchestration::duration::parse_duration;

/// Weighted synthetic traffic against a running backend.
#[derive(Debug, Parser)]
#[command(name = "loadtest")]
struct Args {
    /// Base URL of the deployment.
    #[arg(long, env = "LOADTEST_HOST", default_value = "http://localhost:5050")]
    host: String,
    #[arg(long, env = "API_V1_STR", default_value = "/api/v1")]
    api_prefix: String,
    /// Concurrent virtual users.
    #[arg(short, long, default_value_t = 10)]
    users: usize,
    #[arg(short, long, default_value = "1m", value_parser = parse_duration)]
    duration: Duration,
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    min_wait: Duration,
    #[arg(long, default_value = "3s", value_parser = parse_duration)]
    max_wait: Duration,
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    timeout: Duration,
    #[arg(long, env = "SUPERADMIN_EMAIL")]
    superadmin_email: String,
    #[arg(long, env = "SUPERADMIN_PWD", hide_env_values = true)]
    superadmin_password: String,
    /// Accept self-signed certificates.
    #[arg(long)]
    insecure: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv().ok();
    telemetry::init(telemetry::format_from_env(), "backend=info");
    let args = Args::parse();

    let cfg = LoadTestConfig {
        base_url: args.host,
        api_prefix: args.api_prefix,
        users: args.users,
        duration: args.duration,
        min_wait: args.min_wait,
        max_wait: args.max_wait,
        superadmin_email: args.superadmin_email,
        superadmin_password: args.superadmin_password,
        insecure: args.insecure,
        request_timeout: args.timeout,
    };
    let report = loadtest::run(cfg, Scenario::default()).await?;
    println!("{report}");
    Ok(if report.total_failures() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
