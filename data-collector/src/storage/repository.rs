//! PostgreSQL metric store
//!
//! Each batch is written in its own transaction with a single multi-row
//! `INSERT ... ON CONFLICT` against the natural-key index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{debug, info};

use super::migrations::run_migrations;
use super::traits::{ConflictPolicy, MetricStore, StoreError, StoreResult};
use crate::backfill::RunSummary;
use crate::config::DatabaseSettings;
use crate::schema::CanonicalRecord;
use collector_common::error::{retry_with_backoff, DatabaseError};

/// Conflict target; must match `idx_metrics_natural_key`.
pub const CONFLICT_TARGET: &str =
    "(source, asset, metric_name, pulled_at, (COALESCE(exchange, '')))";

/// Postgres binds at most 65535 parameters per statement.
const MAX_BIND_PARAMS: usize = 65_535;
const COLUMNS_PER_ROW: usize = 9;

pub struct MetricsRepository {
    pool: PgPool,
}

impl MetricsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using the database settings, retrying transient failures.
    pub async fn from_settings(settings: &DatabaseSettings) -> StoreResult<Self> {
        let options = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs));

        let pool = retry_with_backoff(
            || {
                let options = options.clone();
                async move {
                    options
                        .connect(&settings.url)
                        .await
                        .map_err(DatabaseError::from)
                }
            },
            3,
            Duration::from_millis(500),
        )
        .await?;

        info!(
            max_connections = settings.max_connections,
            "Connected to metrics database"
        );
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        run_migrations(&self.pool).await
    }

    fn insert_statement<'a>(
        records: &'a [CanonicalRecord],
        policy: ConflictPolicy,
    ) -> QueryBuilder<'a, Postgres> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO metrics (pulled_at, source, asset, entity_id, metric_name, value, domain, exchange, granularity) ",
        );
        qb.push_values(records, |mut row, r| {
            row.push_bind(r.timestamp)
                .push_bind(&r.source)
                .push_bind(&r.asset_id)
                .push_bind(r.entity_id)
                .push_bind(&r.metric_name)
                .push_bind(r.value)
                .push_bind(r.domain.as_deref())
                .push_bind(r.exchange.as_deref())
                .push_bind(r.granularity.as_str());
        });
        qb.push(" ON CONFLICT ");
        qb.push(CONFLICT_TARGET);
        match policy {
            ConflictPolicy::Preserve => {
                qb.push(" DO NOTHING");
            }
            ConflictPolicy::Refresh => {
                qb.push(
                    " DO UPDATE SET value = EXCLUDED.value, \
                     entity_id = COALESCE(EXCLUDED.entity_id, metrics.entity_id)",
                );
            }
        }
        qb
    }
}

#[async_trait]
impl MetricStore for MetricsRepository {
    async fn upsert_batch(
        &self,
        records: &[CanonicalRecord],
        policy: ConflictPolicy,
    ) -> StoreResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        if records.len() * COLUMNS_PER_ROW > MAX_BIND_PARAMS {
            return Err(StoreError::InvalidData(format!(
                "batch of {} rows exceeds the bind parameter limit",
                records.len()
            )));
        }

        let mut tx = self.pool.begin().await?;
        let affected = Self::insert_statement(records, policy)
            .build()
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        debug!(
            rows = records.len(),
            affected,
            policy = policy.as_str(),
            "Committed metrics batch"
        );
        Ok(affected)
    }

    async fn record_run(&self, summary: &RunSummary) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pulls (run_id, source_name, pulled_at, status, records_count)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(summary.run_id)
        .bind(&summary.source_name)
        .bind(summary.started_at)
        .bind(summary.status.as_str())
        .bind(summary.records_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_timestamp(&self, source: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let latest: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(pulled_at) FROM metrics WHERE source = $1")
                .bind(source)
                .fetch_one(&self.pool)
                .await?;
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Granularity;
    use chrono::TimeZone;

    fn records() -> Vec<CanonicalRecord> {
        vec![CanonicalRecord::new(
            "velo",
            "BTC",
            "FUNDING_RATE",
            0.0,
            Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap(),
            Granularity::Hourly,
        )
        .with_exchange("bybit")]
    }

    #[test]
    fn test_preserve_statement_does_nothing_on_conflict() {
        let recs = records();
        let sql = MetricsRepository::insert_statement(&recs, ConflictPolicy::Preserve)
            .sql()
            .to_string();
        assert!(sql.contains("ON CONFLICT (source, asset, metric_name, pulled_at, (COALESCE(exchange, '')))"));
        assert!(sql.ends_with("DO NOTHING"));
    }

    #[test]
    fn test_refresh_statement_updates_value() {
        let recs = records();
        let sql = MetricsRepository::insert_statement(&recs, ConflictPolicy::Refresh)
            .sql()
            .to_string();
        assert!(sql.contains("DO UPDATE SET value = EXCLUDED.value"));
        assert!(sql.contains("$9"));
        assert!(!sql.contains("$10"));
    }
}
