//! Analysis service: consumes raw metric samples, runs the escalation
//! engine, and publishes confirmed alert events.
//!
//! One record at a time per partition: load the key's prior state, assess
//! the sample, publish the event if the transition was confirmed, then
//! persist the new state. The order matters: the state carries the
//! emission marker that suppresses repeats, so it must only be written
//! once the event is on the topic. A store failure after a publish
//! redelivers the sample against the old state and emits again, which
//! at-least-once delivery tolerates; the other order would silently drop
//! the alert. Malformed payloads are logged and skipped, since redelivery
//! cannot fix them.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use vitalflow_broker::{Consumer, ConsumerRecord, Producer};
use vitalflow_core::escalation::assess;
use vitalflow_core::metric::MetricSample;
use vitalflow_core::thresholds::{AnalysisSettings, ThresholdProfile};
use vitalflow_events::PatientHub;

use crate::state::{EscalationStateStore, StateKey};

pub struct AnalysisService {
    hub: Arc<PatientHub>,
    store: Arc<dyn EscalationStateStore>,
    alerts: Producer,
    profile: ThresholdProfile,
    settings: AnalysisSettings,
}

impl AnalysisService {
    pub fn new(
        hub: Arc<PatientHub>,
        store: Arc<dyn EscalationStateStore>,
        alerts: Producer,
        profile: ThresholdProfile,
        settings: AnalysisSettings,
    ) -> Self {
        Self {
            hub,
            store,
            alerts,
            profile,
            settings,
        }
    }

    /// Consume the `raw-metrics` topic until cancelled.
    pub async fn run(self: Arc<Self>, consumer: Consumer, cancel: CancellationToken) {
        let service = Arc::clone(&self);
        consumer
            .run(cancel, move |record| {
                let service = Arc::clone(&service);
                async move { service.handle(record).await }
            })
            .await;
    }

    /// Process one raw metric record.
    pub async fn handle(&self, record: ConsumerRecord) -> anyhow::Result<()> {
        let sample: MetricSample = match record.decode() {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!(
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    "Skipping malformed metric payload"
                );
                return Ok(());
            }
        };

        self.hub.publish_metric(sample.clone());

        let Some(range) = self.profile.range(sample.metric_type) else {
            tracing::warn!(
                patient_id = sample.patient_id,
                metric_type = %sample.metric_type,
                "No nominal range configured, skipping sample"
            );
            return Ok(());
        };

        let key = StateKey {
            patient_id: sample.patient_id,
            metric_type: sample.metric_type,
        };
        let prior = self.store.get(&key).await?;
        let assessment = assess(prior, &sample, range, &self.settings);

        // Publish before persisting: the new state records the emission,
        // and must not survive a produce that never happened.
        if let Some(event) = &assessment.event {
            tracing::info!(
                patient_id = event.patient_id,
                metric_type = %event.metric_type,
                severity = %event.severity,
                value = event.triggering_value,
                "Escalation transition confirmed"
            );
            self.alerts.send(&event.patient_id.to_string(), event)?;
        }

        match &assessment.state {
            Some(state) => {
                let ttl = self
                    .settings
                    .timeout_for(state.current_severity)
                    .to_std()
                    .unwrap_or_default();
                self.store.put(&key, state, ttl).await?;
            }
            None => self.store.remove(&key).await?,
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
