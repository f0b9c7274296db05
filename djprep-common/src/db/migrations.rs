//! Generic versioned schema-migration runner
//!
//! A migration is applied exactly once, in ascending `version` order, inside
//! a single transaction established by the caller. The on-disk schema
//! version is tracked in a `schema_version` table. If the database already
//! carries a version newer than anything in the supplied migration list,
//! `run_migrations` refuses to proceed — the store must never silently
//! refuse to open rather than silently continue against a schema it does
//! not understand, which is a deliberate tightening of this crate's
//! previous "warn and proceed" behavior on a version mismatch.

use crate::{Error, Result};
use sqlx::SqliteConnection;
use std::future::Future;
use std::pin::Pin;

/// A single migration step. `apply` receives the in-progress transaction so
/// every migration in a batch commits or rolls back atomically.
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub apply: for<'c> fn(
        &'c mut SqliteConnection,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'c>>,
}

async fn ensure_schema_version_table(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Highest schema version recorded in the database, or 0 for a fresh store.
pub async fn current_schema_version(pool: &sqlx::SqlitePool) -> Result<i64> {
    ensure_schema_version_table(pool).await?;
    let version: Option<i64> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;
    Ok(version.unwrap_or(0))
}

/// Apply every migration whose version exceeds the on-disk version, in a
/// single transaction. Returns `Error::Config` (treated as a fatal startup
/// error by callers) if the on-disk version is newer than the newest
/// migration supplied.
pub async fn run_migrations(pool: &sqlx::SqlitePool, migrations: &[Migration]) -> Result<()> {
    ensure_schema_version_table(pool).await?;
    let on_disk = current_schema_version(pool).await?;
    let latest_known = migrations.iter().map(|m| m.version).max().unwrap_or(0);

    if on_disk > latest_known {
        return Err(Error::Config(format!(
            "on-disk schema version {on_disk} is newer than this binary understands \
             (latest known migration is {latest_known}); refusing to open"
        )));
    }

    let mut pending: Vec<&Migration> = migrations.iter().filter(|m| m.version > on_disk).collect();
    pending.sort_by_key(|m| m.version);

    if pending.is_empty() {
        tracing::info!(version = on_disk, "schema is up to date");
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for migration in pending {
        tracing::info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );
        (migration.apply)(&mut tx).await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(migration.version)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> sqlx::SqlitePool {
        SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    fn noop_migration(version: i64) -> Migration {
        fn apply(
            _conn: &mut SqliteConnection,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }
        Migration {
            version,
            description: "noop",
            apply,
        }
    }

    #[tokio::test]
    async fn fresh_database_starts_at_version_zero() {
        let pool = setup().await;
        assert_eq!(current_schema_version(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn migrations_apply_in_order_and_record_version() {
        let pool = setup().await;
        let migrations = vec![noop_migration(1), noop_migration(2)];
        run_migrations(&pool, &migrations).await.unwrap();
        assert_eq!(current_schema_version(&pool).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn rerunning_migrations_is_idempotent() {
        let pool = setup().await;
        let migrations = vec![noop_migration(1)];
        run_migrations(&pool, &migrations).await.unwrap();
        run_migrations(&pool, &migrations).await.unwrap();
        assert_eq!(current_schema_version(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn refuses_to_open_when_disk_is_newer_than_binary() {
        let pool = setup().await;
        run_migrations(&pool, &[noop_migration(1), noop_migration(5)])
            .await
            .unwrap();
        // A binary that only knows about version 1 must refuse to continue.
        let result = run_migrations(&pool, &[noop_migration(1)]).await;
        assert!(result.is_err());
    }
}
