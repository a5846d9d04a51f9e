//! Notification template entity model.

use serde::Serialize;
use sqlx::FromRow;
use vitalflow_core::types::{DbId, Timestamp};

/// A row from the `notification_templates` table.
///
/// Templates are unique on `(subject, type)`; `type` is the delivery
/// channel the template renders for. Body placeholders use `{name}`
/// substitution and every name in `required_fields` must be supplied
/// at render time.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationTemplate {
    pub id: DbId,
    pub subject: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub channel: String,
    pub body: String,
    pub required_fields: Vec<String>,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
