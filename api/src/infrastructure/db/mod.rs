use sqlx::migrate::Migrator;
use sqlx::{Pool, Postgres};

pub type PgPool = Pool<Postgres>;

// Compile-time embedded reversible migrations under ./migrations
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const MIGRATIONS_TABLE: &str = "SELECT to_regclass('_sqlx_migrations')::text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub applied: Vec<i64>,
    pub head: Option<i64>,
}

impl MigrationStatus {
    pub fn current(&self) -> Option<i64> {
        self.applied.last().copied()
    }

    pub fn at_head(&self) -> bool {
        self.current() == self.head
    }
}

pub async fn connect_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub fn head_version() -> Option<i64> {
    MIGRATOR
        .iter()
        .filter(|m| !m.migration_type.is_down_migration())
        .map(|m| m.version)
        .max()
}

/// Version to undo down to so that `steps` applied revisions are reverted.
pub fn downgrade_target(applied: &[i64], steps: usize) -> i64 {
    let mut sorted = applied.to_vec();
    sorted.sort_unstable();
    if steps == 0 {
        return sorted.last().copied().unwrap_or(0);
    }
    if steps >= sorted.len() {
        return 0;
    }
    sorted[sorted.len() - steps - 1]
}

pub async fn applied_versions(pool: &PgPool) -> anyhow::Result<Vec<i64>> {
    let table: Option<String> = sqlx::query_scalar(MIGRATIONS_TABLE).fetch_one(pool).await?;
    if table.is_none() {
        return Ok(Vec::new());
    }
    let versions = sqlx::query_scalar::<_, i64>(
        "SELECT version FROM _sqlx_migrations WHERE success ORDER BY version",
    )
    .fetch_all(pool)
    .await?;
    Ok(versions)
}

pub async fn migration_status(pool: &PgPool) -> anyhow::Result<MigrationStatus> {
    Ok(MigrationStatus {
        applied: applied_versions(pool).await?,
        head: head_version(),
    })
}

pub async fn migrate_up(pool: &PgPool) -> anyhow::Result<MigrationStatus> {
    MIGRATOR.run(pool).await?;
    let status = migration_status(pool).await?;
    tracing::info!(current = ?status.current(), head = ?status.head, "migrations_applied");
    Ok(status)
}

pub async fn migrate_down(pool: &PgPool, steps: usize) -> anyhow::Result<MigrationStatus> {
    let applied = applied_versions(pool).await?;
    let target = downgrade_target(&applied, steps);
    MIGRATOR.undo(pool, target).await?;
    let status = migration_status(pool).await?;
    tracing::info!(target, current = ?status.current(), "migrations_reverted");
    Ok(status)
}

/// Downgrade one revision then upgrade back to head.
pub async fn migration_cycle(pool: &PgPool) -> anyhow::Result<MigrationStatus> {
    migrate_down(pool, 1).await?;
    let status = migrate_up(pool).await?;
    anyhow::ensure!(
        status.at_head(),
        "schema is at {:?} instead of head {:?} after the migration cycle",
        status.current(),
        status.head
    );
    Ok(status)
}

pub mod repositories;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_migrations_are_reversible() {
        let ups: Vec<i64> = MIGRATOR
            .iter()
            .filter(|m| !m.migration_type.is_down_migration())
            .map(|m| m.version)
            .collect();
        assert!(ups.len() >= 2);
        assert!(MIGRATOR.iter().all(|m| m.migration_type.is_reversible()));
        assert_eq!(head_version(), ups.iter().copied().max());
    }

    #[test]
    fn downgrade_target_walks_back_through_applied_versions() {
        let applied = [20250101000000, 20250102000000];
        assert_eq!(downgrade_target(&applied, 1), 20250101000000);
        assert_eq!(downgrade_target(&applied, 2), 0);
        assert_eq!(downgrade_target(&applied, 5), 0);
        assert_eq!(downgrade_target(&applied, 0), 20250102000000);
        assert_eq!(downgrade_target(&[], 1), 0);
    }

    #[test]
    fn status_knows_when_it_is_at_head() {
        let status = MigrationStatus {
            applied: vec![1, 2],
            head: Some(2),
        };
        assert!(status.at_head());
        let behind = MigrationStatus {
            applied: vec![1],
            head: Some(2),
        };
        assert!(!behind.at_head());
    }
}
