//! Migration runner: the one-shot task every stack runs before the server.

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing::info;

use backend::application::use_cases::users::seed_superadmin::{SeedOutcome, SeedSuperadmin};
use backend::bootstrap::config::Config;
use backend::bootstrap::telemetry;
use backend::infrastructure::db::repositories::user_repository_sqlx::SqlxUserRepository;
use backend::infrastructure::db::{self, MigrationStatus};

#[derive(Debug, Parser)]
#[command(
    name = "migrate",
    about = "Apply, revert and inspect database migrations"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply all pending migrations, then seed the superadmin.
    Upgrade {
        /// Skip superadmin seeding.
        #[arg(long)]
        no_seed: bool,
    },
    /// Revert the latest applied revisions.
    Downgrade {
        #[arg(long, default_value_t = 1)]
        steps: usize,
    },
    /// Downgrade one revision and upgrade back to head.
    Cycle,
    /// Print applied revisions and the head revision.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    telemetry::init(telemetry::format_from_env(), telemetry::DEFAULT_FILTER);
    let cli = Cli::parse();

    let cfg = Config::from_env()?;
    let pool = db::connect_pool(&cfg.database_url, 1).await?;

    match cli.command {
        Command::Upgrade { no_seed } => {
            let status = db::migrate_up(&pool).await?;
            report(&status);
            if !no_seed {
                let repo = SqlxUserRepository::new(pool.clone());
                let seeded = SeedSuperadmin { repo: &repo }
                    .execute(&cfg.superadmin_email, &cfg.superadmin_password)
                    .await?;
                match seeded {
                    SeedOutcome::Created(id) => info!(%id, "superadmin created"),
                    SeedOutcome::Recovered => info!("superadmin already present"),
                }
            }
        }
        Command::Downgrade { steps } => report(&db::migrate_down(&pool, steps).await?),
        Command::Cycle => report(&db::migration_cycle(&pool).await?),
        Command::Status => report(&db::migration_status(&pool).await?),
    }
    pool.close().await;
    Ok(())
}

fn report(status: &MigrationStatus) {
    let fmt = |v: Option<i64>| v.map_or_else(|| "base".to_string(), |v| v.to_string());
    println!(
        "current: {}  head: {}  applied: {}{}",
        fmt(status.current()),
        fmt(status.head),
        status.applied.len(),
        if status.at_head() { "  (at head)" } else { "" }
    );
}
