//! Repository for the `notification_templates` table.

use sqlx::PgPool;

use crate::models::template::NotificationTemplate;

/// Column list for `notification_templates` queries.
const COLUMNS: &str =
    "id, subject, type, body, required_fields, is_active, created_at, updated_at";

/// Provides template lookup for the dispatcher.
pub struct TemplateRepo;

impl TemplateRepo {
    /// Find the active template for a (subject, channel) pair.
    pub async fn find_active(
        pool: &PgPool,
        subject: &str,
        channel: &str,
    ) -> Result<Option<NotificationTemplate>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_templates \
             WHERE subject = $1 AND type = $2 AND is_active = true"
        );
        sqlx::query_as::<_, NotificationTemplate>(&query)
            .bind(subject)
            .bind(channel)
            .fetch_optional(pool)
            .await
    }
}
