//! Repository for the `dead_letter_messages` table.

use sqlx::PgPool;
use vitalflow_core::types::DbId;

/// Provides persistence for undeliverable notifications.
pub struct DeadLetterRepo;

impl DeadLetterRepo {
    /// Record an undeliverable notification, returning the generated ID.
    pub async fn create(
        pool: &PgPool,
        topic: &str,
        receiver: &str,
        subject: &str,
        body: &str,
        priority: &str,
        error_message: &str,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO dead_letter_messages \
             (topic, receiver, subject, body, priority, error_message) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id",
        )
        .bind(topic)
        .bind(receiver)
        .bind(subject)
        .bind(body)
        .bind(priority)
        .bind(error_message)
        .fetch_one(pool)
        .await
    }

    /// Mark a dead letter as manually reprocessed.
    ///
    /// Returns `true` if the row existed and was still unprocessed.
    pub async fn mark_processed(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE dead_letter_messages \
             SET is_processed = true, processed_at = NOW() \
             WHERE id = $1 AND is_processed = false",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Number of unprocessed dead letters, for startup reporting.
    pub async fn unprocessed_count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT COUNT(*) FROM dead_letter_messages WHERE is_processed = false",
        )
        .fetch_one(pool)
        .await?;
        Ok(count.unwrap_or(0))
    }
}
