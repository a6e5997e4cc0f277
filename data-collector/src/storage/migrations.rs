//! Schema setup for the metrics and run-ledger tables.
//!
//! Statements are idempotent and applied in order; older deployments that
//! predate the descriptive columns are upgraded in place.

use sqlx::PgPool;
use tracing::{debug, info};

use super::traits::StoreResult;

/// `(name, statement)` pairs, applied in order.
pub const MIGRATIONS: &[(&str, &str)] = &[
    (
        "create_pulls",
        r#"
        CREATE TABLE IF NOT EXISTS pulls (
            pull_id SERIAL PRIMARY KEY,
            source_name VARCHAR(100) NOT NULL,
            pulled_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            status VARCHAR(50) NOT NULL,
            records_count BIGINT DEFAULT 0
        )
        "#,
    ),
    (
        "pulls_run_id",
        "ALTER TABLE pulls ADD COLUMN IF NOT EXISTS run_id UUID",
    ),
    (
        "create_metrics",
        r#"
        CREATE TABLE IF NOT EXISTS metrics (
            id BIGSERIAL PRIMARY KEY,
            pulled_at TIMESTAMPTZ NOT NULL,
            source VARCHAR(100) NOT NULL,
            asset VARCHAR(100) NOT NULL,
            metric_name VARCHAR(200) NOT NULL,
            value DOUBLE PRECISION
        )
        "#,
    ),
    (
        "metrics_descriptive_columns",
        r#"
        ALTER TABLE metrics
            ADD COLUMN IF NOT EXISTS entity_id INTEGER,
            ADD COLUMN IF NOT EXISTS domain VARCHAR(50),
            ADD COLUMN IF NOT EXISTS exchange VARCHAR(100),
            ADD COLUMN IF NOT EXISTS granularity VARCHAR(20)
        "#,
    ),
    (
        "metrics_drop_legacy_unique",
        "DROP INDEX IF EXISTS idx_metrics_unique",
    ),
    (
        "metrics_natural_key",
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_metrics_natural_key
        ON metrics (source, asset, metric_name, pulled_at, (COALESCE(exchange, '')))
        "#,
    ),
    (
        "metrics_source_time",
        "CREATE INDEX IF NOT EXISTS idx_metrics_source_time ON metrics (source, pulled_at DESC)",
    ),
];

/// Apply every migration against `pool`.
pub async fn run_migrations(pool: &PgPool) -> StoreResult<()> {
    info!("Running metrics store migrations...");
    for (name, statement) in MIGRATIONS {
        debug!(migration = name, "Applying");
        sqlx::query(statement).execute(pool).await?;
    }
    info!("Applied {} migrations", MIGRATIONS.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_key_index_matches_upsert_target() {
        let (_, stmt) = MIGRATIONS
            .iter()
            .find(|(name, _)| *name == "metrics_natural_key")
            .unwrap();
        assert!(stmt.contains(super::super::repository::CONFLICT_TARGET));
    }

    #[test]
    fn test_migration_names_are_unique() {
        let mut names: Vec<&str> = MIGRATIONS.iter().map(|(n, _)| *n).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), MIGRATIONS.len());
    }

    #[test]
    fn test_legacy_index_dropped_before_new_key() {
        let pos = |n: &str| MIGRATIONS.iter().position(|(name, _)| *name == n).unwrap();
        assert!(pos("metrics_drop_legacy_unique") < pos("metrics_natural_key"));
    }
}
