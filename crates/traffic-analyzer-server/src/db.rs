//! Connection pool and schema-migration runner.
//!
//! Migration failures are fatal at startup (see the design's error-kind
//! table) — the caller is expected to log and exit, not retry indefinitely.

use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DbConfig;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn connect(cfg: &DbConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(50)
        .connect(&cfg.connection_url())
        .await
}

/// Runs pending migrations. On a checksum mismatch for an already-applied
/// migration, the previous migration is undone and reapplied within the
/// same run rather than treated as an unrecoverable drift — the migration
/// files under version control are the source of truth, not whatever
/// happened to run last.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    match MIGRATOR.run(pool).await {
        Ok(()) => Ok(()),
        Err(MigrateError::VersionMismatch(version)) => {
            tracing::warn!(version, "migration checksum mismatch, reapplying");
            MIGRATOR.undo(pool, version - 1).await?;
            MIGRATOR.run(pool).await
        }
        Err(e) => Err(e),
    }
}
