//! Notification template resolution and rendering.
//!
//! Templates are stored per (subject, channel) pair. Bodies use `{name}`
//! placeholder substitution; every name listed in the template's required
//! fields must be supplied at render time.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use vitalflow_db::repositories::TemplateRepo;

use crate::job::ChannelType;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// The job named a template that does not exist (or is inactive) for
    /// its channel. A configuration error, not a transient one.
    #[error("No active template '{name}' for channel {channel}")]
    NotFound { name: String, channel: ChannelType },

    /// A required placeholder value was not supplied.
    #[error("Missing required template field: {0}")]
    MissingField(String),

    #[error("Template lookup failed: {0}")]
    Db(#[from] sqlx::Error),
}

/// A resolved template body and its contract.
#[derive(Debug, Clone)]
pub struct Template {
    pub body: String,
    pub required_fields: Vec<String>,
}

impl Template {
    /// Render the body with `{name}` substitution.
    ///
    /// Fails on the first required field missing from `params`. Params
    /// not referenced by the body are ignored.
    pub fn render(&self, params: &HashMap<String, String>) -> Result<String, TemplateError> {
        for field in &self.required_fields {
            if !params.contains_key(field) {
                return Err(TemplateError::MissingField(field.clone()));
            }
        }
        let mut body = self.body.clone();
        for (name, value) in params {
            body = body.replace(&format!("{{{name}}}"), value);
        }
        Ok(body)
    }
}

/// Lookup seam for templates, so the dispatcher can be tested without
/// Postgres.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Resolve the active template for a (name, channel) pair.
    async fn find_active(
        &self,
        name: &str,
        channel: ChannelType,
    ) -> Result<Option<Template>, TemplateError>;
}

/// Postgres-backed template store.
pub struct PgTemplateStore {
    pool: PgPool,
}

impl PgTemplateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    async fn find_active(
        &self,
        name: &str,
        channel: ChannelType,
    ) -> Result<Option<Template>, TemplateError> {
        let row = TemplateRepo::find_active(&self.pool, name, channel.as_str()).await?;
        Ok(row.map(|t| Template {
            body: t.body,
            required_fields: t.required_fields,
        }))
    }
}

/// In-memory template store for tests.
#[derive(Default)]
pub struct MemoryTemplateStore {
    templates: HashMap<(String, ChannelType), Template>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, channel: ChannelType, template: Template) {
        self.templates.insert((name.to_string(), channel), template);
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn find_active(
        &self,
        name: &str,
        channel: ChannelType,
    ) -> Result<Option<Template>, TemplateError> {
        Ok(self.templates.get(&(name.to_string(), channel)).cloned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn render_substitutes_named_placeholders() {
        let template = Template {
            body: "Patient {patient} {metric} at {value}".to_string(),
            required_fields: vec!["patient".to_string(), "value".to_string()],
        };
        let body = template
            .render(&params(&[
                ("patient", "7"),
                ("metric", "pulse"),
                ("value", "140"),
            ]))
            .unwrap();
        assert_eq!(body, "Patient 7 pulse at 140");
    }

    #[test]
    fn render_rejects_missing_required_field() {
        let template = Template {
            body: "Patient {patient}".to_string(),
            required_fields: vec!["patient".to_string()],
        };
        assert_matches!(
            template.render(&HashMap::new()),
            Err(TemplateError::MissingField(field)) if field == "patient"
        );
    }

    #[test]
    fn unreferenced_placeholders_survive_rendering() {
        let template = Template {
            body: "Value {value}, unit {unit}".to_string(),
            required_fields: vec![],
        };
        let body = template.render(&params(&[("value", "98")])).unwrap();
        assert_eq!(body, "Value 98, unit {unit}");
    }

    #[tokio::test]
    async fn memory_store_resolves_by_name_and_channel() {
        let mut store = MemoryTemplateStore::new();
        store.insert(
            "pulse-alert",
            ChannelType::Email,
            Template {
                body: "b".to_string(),
                required_fields: vec![],
            },
        );

        assert!(store
            .find_active("pulse-alert", ChannelType::Email)
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_active("pulse-alert", ChannelType::Sms)
            .await
            .unwrap()
            .is_none());
    }
}
