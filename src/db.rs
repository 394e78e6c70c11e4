//! Postgres pool and schema migrations.

use std::path::Path;
use std::time::Duration;

use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::error::Error;

/// Opens a pool and verifies it with one round trip.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .test_before_acquire(true)
        .connect(url)
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;
    info!(max_connections, "database connected");
    Ok(pool)
}

/// Applies every pending migration in `dir`, in version order.
///
/// Already-applied versions are recorded in `_sqlx_migrations` and skipped.
pub async fn migrate(pool: &PgPool, dir: &Path) -> Result<(), Error> {
    let migrator = Migrator::new(dir).await?;
    migrator.run(pool).await?;
    info!(dir = %dir.display(), migrations = migrator.iter().count(), "migrations applied");
    Ok(())
}
