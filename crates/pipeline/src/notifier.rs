//! Notification service: consumes confirmed alert events, persists them,
//! fans them out to live subscribers, and dispatches clinician
//! notifications.
//!
//! Persistence is idempotent on the event's UUID: a redelivered event
//! resolves to the row already inserted for it. The row's processed flag
//! decides what happens next. A redelivery whose earlier pass never
//! finished dispatching is notified now; one that completed is absorbed.
//! Infrastructure failures (database, dead-letter sink) propagate for
//! redelivery; delivery failures are the dispatcher's problem and always
//! reach a terminal outcome.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use vitalflow_broker::{Consumer, ConsumerRecord};
use vitalflow_core::alert::{AlertEvent, Severity};
use vitalflow_core::types::DbId;
use vitalflow_db::repositories::AlertRepo;
use vitalflow_events::{ChannelType, Dispatcher, NotificationJob, PatientHub, Priority};

// ---------------------------------------------------------------------------
// AlertStore
// ---------------------------------------------------------------------------

/// Persisted identity of an alert event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistedAlert {
    pub id: DbId,
    /// Whether the notification stage already completed for this event.
    pub is_processed: bool,
}

/// Persistence seam for confirmed alerts.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Insert the event, or resolve the row a redelivery already wrote.
    async fn persist(&self, event: &AlertEvent) -> Result<PersistedAlert, sqlx::Error>;

    /// Mark an alert as handled by the notification stage.
    async fn mark_processed(&self, id: DbId) -> Result<(), sqlx::Error>;
}

/// Postgres-backed store writing to the `alerts` table.
pub struct PgAlertStore {
    pool: PgPool,
}

impl PgAlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertStore for PgAlertStore {
    async fn persist(&self, event: &AlertEvent) -> Result<PersistedAlert, sqlx::Error> {
        let (id, is_processed) = AlertRepo::upsert(
            &self.pool,
            event.id,
            event.patient_id,
            event.metric_type.as_str(),
            event.triggering_value,
            event.severity.as_str(),
            event.created_at,
        )
        .await?;
        Ok(PersistedAlert { id, is_processed })
    }

    async fn mark_processed(&self, id: DbId) -> Result<(), sqlx::Error> {
        AlertRepo::mark_processed(&self.pool, id).await
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryAlertStore {
    events: std::sync::Mutex<Vec<AlertEvent>>,
    processed: std::sync::Mutex<Vec<DbId>>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AlertEvent> {
        self.events.lock().expect("store lock poisoned").clone()
    }

    pub fn processed(&self) -> Vec<DbId> {
        self.processed.lock().expect("store lock poisoned").clone()
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn persist(&self, event: &AlertEvent) -> Result<PersistedAlert, sqlx::Error> {
        let mut events = self.events.lock().expect("store lock poisoned");
        let id = match events.iter().position(|e| e.id == event.id) {
            Some(existing) => existing as DbId + 1,
            None => {
                events.push(event.clone());
                events.len() as DbId
            }
        };
        let is_processed = self
            .processed
            .lock()
            .expect("store lock poisoned")
            .contains(&id);
        Ok(PersistedAlert { id, is_processed })
    }

    async fn mark_processed(&self, id: DbId) -> Result<(), sqlx::Error> {
        self.processed.lock().expect("store lock poisoned").push(id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NotificationService
// ---------------------------------------------------------------------------

pub struct NotificationService {
    hub: Arc<PatientHub>,
    alerts: Arc<dyn AlertStore>,
    dispatcher: Arc<Dispatcher>,
    /// Channel clinician notifications go out on.
    channel: ChannelType,
    /// Recipient for dispatched notifications (care-team address or
    /// push audience).
    recipient: String,
    /// Optional template to render instead of the built-in body.
    template_name: Option<String>,
}

impl NotificationService {
    pub fn new(
        hub: Arc<PatientHub>,
        alerts: Arc<dyn AlertStore>,
        dispatcher: Arc<Dispatcher>,
        channel: ChannelType,
        recipient: impl Into<String>,
        template_name: Option<String>,
    ) -> Self {
        Self {
            hub,
            alerts,
            dispatcher,
            channel,
            recipient: recipient.into(),
            template_name,
        }
    }

    /// Consume the `alerts` topic until cancelled.
    pub async fn run(self: Arc<Self>, consumer: Consumer, cancel: CancellationToken) {
        let service = Arc::clone(&self);
        consumer
            .run(cancel, move |record| {
                let service = Arc::clone(&service);
                async move { service.handle(record).await }
            })
            .await;
    }

    /// Process one confirmed alert event.
    pub async fn handle(&self, record: ConsumerRecord) -> anyhow::Result<()> {
        let event: AlertEvent = match record.decode() {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    "Skipping malformed alert payload"
                );
                return Ok(());
            }
        };

        let persisted = self.alerts.persist(&event).await?;
        if persisted.is_processed {
            tracing::debug!(event_id = %event.id, "Redelivered alert event already handled");
            return Ok(());
        }

        self.hub.publish_alert(event.clone());

        let job = self.build_job(&event);
        self.dispatcher.dispatch(&job).await?;
        self.alerts.mark_processed(persisted.id).await?;
        Ok(())
    }

    fn build_job(&self, event: &AlertEvent) -> NotificationJob {
        let priority = match event.severity {
            Severity::Alert => Priority::Critical,
            Severity::Warning => Priority::High,
            Severity::Normal => Priority::Normal,
        };
        let subject = if event.is_resolution() {
            format!("{} resolved for patient {}", event.metric_type, event.patient_id)
        } else {
            format!(
                "{} {} for patient {}",
                event.metric_type, event.severity, event.patient_id
            )
        };
        let body = format!(
            "Patient {}: {} measured {} at {}",
            event.patient_id, event.metric_type, event.triggering_value, event.created_at
        );
        let template_params = HashMap::from([
            ("patient".to_string(), event.patient_id.to_string()),
            ("metric".to_string(), event.metric_type.to_string()),
            ("severity".to_string(), event.severity.to_string()),
            ("value".to_string(), event.triggering_value.to_string()),
        ]);

        NotificationJob {
            channel: self.channel,
            recipient: self.recipient.clone(),
            subject,
            body,
            priority,
            template_name: self.template_name.clone(),
            template_params,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vitalflow_core::metric::MetricType;
    use vitalflow_core::topics::ALERTS_TOPIC;
    use vitalflow_events::senders::{NotificationSender, SendError};
    use vitalflow_events::template::{MemoryTemplateStore, Template, TemplateError, TemplateStore};
    use vitalflow_events::{DispatchPolicy, MemoryDeadLetterSink, SenderRegistry};

    struct RecordingSender(std::sync::Mutex<Vec<(String, String)>>);

    #[async_trait]
    impl NotificationSender for RecordingSender {
        async fn send(&self, _: &str, subject: &str, body: &str) -> Result<(), SendError> {
            self.0
                .lock()
                .unwrap()
                .push((subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn service(
        store: Arc<MemoryAlertStore>,
    ) -> (NotificationService, Arc<RecordingSender>, Arc<MemoryDeadLetterSink>) {
        let sender = Arc::new(RecordingSender(std::sync::Mutex::new(Vec::new())));
        let mut registry = SenderRegistry::new();
        registry.register(ChannelType::Email, sender.clone());
        let sink = Arc::new(MemoryDeadLetterSink::new());
        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            Arc::new(MemoryTemplateStore::new()),
            sink.clone(),
            DispatchPolicy::default(),
            ALERTS_TOPIC,
        ));
        let service = NotificationService::new(
            Arc::new(PatientHub::new()),
            store,
            dispatcher,
            ChannelType::Email,
            "oncall@clinic.example",
            None,
        );
        (service, sender, sink)
    }

    fn record(event: &AlertEvent) -> ConsumerRecord {
        ConsumerRecord {
            topic: ALERTS_TOPIC.to_string(),
            partition: 0,
            offset: 0,
            key: event.patient_id.to_string(),
            payload: serde_json::to_vec(event).unwrap(),
        }
    }

    fn event(severity: Severity) -> AlertEvent {
        AlertEvent::new(7, MetricType::Pulse, severity, 140.0, Utc::now())
    }

    #[tokio::test]
    async fn alert_is_persisted_notified_and_marked_processed() {
        let store = Arc::new(MemoryAlertStore::new());
        let (service, sender, sink) = service(store.clone());

        service.handle(record(&event(Severity::Alert))).await.unwrap();

        assert_eq!(store.events().len(), 1);
        assert_eq!(store.processed().len(), 1);
        let sent = sender.0.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.contains("Pulse Alert for patient 7"));
        assert!(sink.letters().is_empty());
    }

    /// Template store whose first lookup fails with a transient database
    /// error, as a timed-out pool would.
    struct FlakyTemplateStore {
        inner: MemoryTemplateStore,
        failed: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl TemplateStore for FlakyTemplateStore {
        async fn find_active(
            &self,
            name: &str,
            channel: ChannelType,
        ) -> Result<Option<Template>, TemplateError> {
            if !self.failed.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return Err(TemplateError::Db(sqlx::Error::PoolTimedOut));
            }
            self.inner.find_active(name, channel).await
        }
    }

    #[tokio::test]
    async fn redelivery_after_transient_dispatch_failure_still_notifies() {
        let store = Arc::new(MemoryAlertStore::new());
        let sender = Arc::new(RecordingSender(std::sync::Mutex::new(Vec::new())));
        let mut registry = SenderRegistry::new();
        registry.register(ChannelType::Email, sender.clone());
        let mut templates = MemoryTemplateStore::new();
        templates.insert(
            "pulse-alert",
            ChannelType::Email,
            Template {
                body: "Patient {patient} needs attention".to_string(),
                required_fields: vec!["patient".to_string()],
            },
        );
        let sink = Arc::new(MemoryDeadLetterSink::new());
        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            Arc::new(FlakyTemplateStore {
                inner: templates,
                failed: std::sync::atomic::AtomicBool::new(false),
            }),
            sink.clone(),
            DispatchPolicy::default(),
            ALERTS_TOPIC,
        ));
        let service = NotificationService::new(
            Arc::new(PatientHub::new()),
            store.clone(),
            dispatcher,
            ChannelType::Email,
            "oncall@clinic.example",
            Some("pulse-alert".to_string()),
        );

        // First pass persists the row, then fails before any delivery.
        let event = event(Severity::Alert);
        let first = service.handle(record(&event)).await;
        assert!(first.is_err(), "transient lookup failure must redeliver");
        assert!(sender.0.lock().unwrap().is_empty());
        assert!(store.processed().is_empty());

        // Redelivery finds the row unprocessed and still notifies.
        service.handle(record(&event)).await.unwrap();

        assert_eq!(store.events().len(), 1);
        assert_eq!(store.processed().len(), 1);
        let sent = sender.0.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "Patient 7 needs attention");
        assert!(sink.letters().is_empty());
    }

    #[tokio::test]
    async fn redelivered_event_is_not_renotified() {
        let store = Arc::new(MemoryAlertStore::new());
        let (service, sender, _) = service(store.clone());

        let event = event(Severity::Alert);
        service.handle(record(&event)).await.unwrap();
        service.handle(record(&event)).await.unwrap();

        assert_eq!(store.events().len(), 1);
        assert_eq!(sender.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resolution_events_notify_at_normal_priority() {
        let store = Arc::new(MemoryAlertStore::new());
        let (service, sender, _) = service(store);

        service.handle(record(&event(Severity::Normal))).await.unwrap();

        let sent = sender.0.lock().unwrap().clone();
        assert!(sent[0].0.contains("resolved"));
    }

    #[tokio::test]
    async fn malformed_payload_is_skipped() {
        let store = Arc::new(MemoryAlertStore::new());
        let (service, sender, _) = service(store.clone());

        let record = ConsumerRecord {
            topic: ALERTS_TOPIC.to_string(),
            partition: 0,
            offset: 0,
            key: "7".to_string(),
            payload: b"{not json".to_vec(),
        };
        service.handle(record).await.unwrap();

        assert!(store.events().is_empty());
        assert!(sender.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn live_subscribers_receive_the_alert() {
        let store = Arc::new(MemoryAlertStore::new());
        let (mut service, _, _) = service(store);
        let hub = Arc::new(PatientHub::new());
        service.hub = hub.clone();

        let mut rx = hub.subscribe(7);
        service.handle(record(&event(Severity::Alert))).await.unwrap();

        assert!(rx.try_recv().is_ok());
    }
}
