//! Brings a stack file up in dependency order and tears it down again.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing::{error, info};

use backend::bootstrap::telemetry;
use backend::orchestration::duration::{format_duration, parse_duration};
use backend::orchestration::launcher::ProcessLauncher;
use backend::orchestration::probe::SystemProbe;
use backend::orchestration::sequencer::{
    BringUpReport, DEFAULT_MAX_PARALLEL_LAUNCHES, Sequencer, ServiceState,
};
use backend::orchestration::topology::Topology;

#[derive(Debug, Parser)]
#[command(name = "stack", about = "Dependency-gated bring-up of a stack file")]
struct Cli {
    /// Stack file, e.g. deploy/stack.dev.toml
    #[arg(
        short,
        long,
        env = "STACK_FILE",
        default_value = "deploy/stack.dev.toml"
    )]
    file: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse and validate the stack file.
    Validate,
    /// Print the startup layers.
    Plan,
    /// Start every service once its dependencies are ready.
    Up {
        #[arg(long, default_value_t = DEFAULT_MAX_PARALLEL_LAUNCHES)]
        max_parallel: usize,
        /// Time each service gets to stop before it is killed.
        #[arg(long, default_value = "10s", value_parser = parse_duration)]
        grace: Duration,
        /// Tear down as soon as every service is ready instead of waiting for Ctrl-C.
        #[arg(long)]
        detach_after_ready: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    telemetry::init(telemetry::format_from_env(), "backend=info");
    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %format!("{err:#}"), "stack command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let topology = Topology::load(&cli.file)?;
    match cli.command {
        Command::Validate => {
            println!("{}: {} services, ok", topology.name(), topology.len());
            Ok(true)
        }
        Command::Plan => {
            for (idx, layer) in topology.startup_layers().iter().enumerate() {
                let described: Vec<String> = layer
                    .iter()
                    .map(|name| match topology.get(name) {
                        Some(spec) if !spec.depends_on.is_empty() => {
                            let deps: Vec<String> = spec
                                .depends_on
                                .iter()
                                .map(|(dep, cond)| format!("{dep}:{cond:?}"))
                                .collect();
                            format!("{name} <- [{}]", deps.join(", "))
                        }
                        _ => name.clone(),
                    })
                    .collect();
                println!("layer {idx}: {}", described.join("; "));
            }
            Ok(true)
        }
        Command::Up {
            max_parallel,
            grace,
            detach_after_ready,
        } => {
            let sequencer = Sequencer::new(
                topology,
                Arc::new(ProcessLauncher::new()),
                Arc::new(SystemProbe::new()?),
            )
            .with_max_parallel_launches(max_parallel);
            let stack = sequencer.bring_up().await;
            print_report(&stack.report);
            let ok = stack.report.is_success();
            if ok && !detach_after_ready {
                info!("stack ready, press Ctrl-C to stop");
                tokio::signal::ctrl_c().await?;
            }
            if let Err(err) = stack.report.ensure_success() {
                error!(error = %err, "bring-up failed");
            }
            let stopped = stack.teardown(grace).await;
            info!(stopped = ?stopped, "stack stopped");
            Ok(ok)
        }
    }
}

fn print_report(report: &BringUpReport) {
    for service in &report.services {
        let started = service
            .launched_at
            .map(format_duration)
            .unwrap_or_else(|| "-".to_string());
        let detail = match &service.state {
            ServiceState::Failed(reason) => format!(" ({reason})"),
            _ => String::new(),
        };
        println!(
            "{:<16} {:<10} launched {:>8}  settled {:>8}{}",
            service.name,
            service.state.label(),
            started,
            format_duration(service.settled_at),
            detail
        );
    }
    println!("total {}", format_duration(report.elapsed));
}
