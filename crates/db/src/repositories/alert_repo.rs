//! Repository for the `alerts` table.

use sqlx::PgPool;
use uuid::Uuid;
use vitalflow_core::types::{DbId, Timestamp};

/// Provides persistence operations for alerts.
pub struct AlertRepo;

impl AlertRepo {
    /// Insert an alert, or resolve the existing row for a redelivered
    /// pipeline event.
    ///
    /// Idempotent on `event_id`: a redelivery never inserts a second
    /// row. Returns the row id and its `is_processed` flag, so the
    /// caller can tell whether the notification stage already completed
    /// for this event and must run again if it did not.
    pub async fn upsert(
        pool: &PgPool,
        event_id: Uuid,
        patient_id: DbId,
        alert_type: &str,
        indicator: f64,
        severity: &str,
        created_at: Timestamp,
    ) -> Result<(DbId, bool), sqlx::Error> {
        // The no-op DO UPDATE makes RETURNING yield the conflicting row;
        // DO NOTHING would return nothing on conflict.
        sqlx::query_as(
            "INSERT INTO alerts (event_id, patient_id, alert_type, indicator, severity, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (event_id) DO UPDATE SET event_id = EXCLUDED.event_id \
             RETURNING id, is_processed",
        )
        .bind(event_id)
        .bind(patient_id)
        .bind(alert_type)
        .bind(indicator)
        .bind(severity)
        .bind(created_at)
        .fetch_one(pool)
        .await
    }

    /// Record a clinician acknowledgement.
    ///
    /// Returns `true` if the alert existed and was not already
    /// acknowledged.
    pub async fn acknowledge(pool: &PgPool, id: DbId, by: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE alerts \
             SET acknowledged_at = NOW(), acknowledged_by = $2 \
             WHERE id = $1 AND acknowledged_at IS NULL",
        )
        .bind(id)
        .bind(by)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark an alert as processed by the notification stage.
    pub async fn mark_processed(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE alerts SET is_processed = true WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
