use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use std::time::Duration;

use flexstart_common::ProviderError;

use crate::{AdmitOutcome, DedupStore};

/// Durable idempotency store backed by the `start_instance_failures` table.
///
/// Strict semantics: one atomic statement either claims the key or refreshes
/// an expired record; a live record makes the write a no-op, which we read
/// back as `Duplicate`. Safe under concurrent invocations.
pub struct PostgresDedupStore {
    pool: Pool<Postgres>,
}

impl PostgresDedupStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DedupStore for PostgresDedupStore {
    async fn conditional_put(
        &self,
        key: &str,
        event_time: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<AdmitOutcome, ProviderError> {
        let res = sqlx::query(
            r#"
            INSERT INTO start_instance_failures (dedup_key, event_time, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (dedup_key) DO UPDATE
            SET event_time = EXCLUDED.event_time,
                expires_at = EXCLUDED.expires_at
            WHERE start_instance_failures.expires_at <= NOW()
            "#,
        )
        .bind(key)
        .bind(event_time)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(|e| ProviderError::Unavailable(format!("dedup store: {e}")))?;

        if res.rows_affected() > 0 {
            Ok(AdmitOutcome::Admitted)
        } else {
            Ok(AdmitOutcome::Duplicate)
        }
    }
}
