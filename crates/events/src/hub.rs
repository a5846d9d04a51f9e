//! Per-patient live fan-out hub backed by `tokio::sync::broadcast`.
//!
//! [`PatientHub`] is the in-process publish/subscribe seam between the
//! pipeline services and whatever live transport the host process attaches
//! (a WebSocket or SSE server would subscribe here). It is shared via
//! `Arc<PatientHub>`; each patient gets an independent broadcast channel,
//! created lazily on first subscribe.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;
use tokio::sync::broadcast;
use vitalflow_core::alert::AlertEvent;
use vitalflow_core::metric::MetricSample;
use vitalflow_core::types::DbId;

// ---------------------------------------------------------------------------
// PatientEvent
// ---------------------------------------------------------------------------

/// A live update for one patient's subscribers.
///
/// The tag mirrors the client-side handler name, so a frontend can route
/// on `method` without inspecting the payload.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "payload")]
pub enum PatientEvent {
    /// A raw metric sample was received for the patient.
    ReceiveMetric(MetricSample),
    /// A confirmed alert (or resolution) was raised for the patient.
    ReceiveAlert(AlertEvent),
}

// ---------------------------------------------------------------------------
// PatientHub
// ---------------------------------------------------------------------------

/// Buffer capacity per patient channel. Slow subscribers observe
/// `RecvError::Lagged` rather than blocking the pipeline.
const CHANNEL_CAPACITY: usize = 256;

/// In-process fan-out hub keyed by patient id.
#[derive(Default)]
pub struct PatientHub {
    channels: RwLock<HashMap<DbId, broadcast::Sender<PatientEvent>>>,
}

impl PatientHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to live updates for one patient.
    pub fn subscribe(&self, patient_id: DbId) -> broadcast::Receiver<PatientEvent> {
        let mut channels = self.channels.write().expect("hub lock poisoned");
        channels
            .entry(patient_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish a metric sample to the patient's subscribers.
    pub fn publish_metric(&self, sample: MetricSample) {
        self.publish(sample.patient_id, PatientEvent::ReceiveMetric(sample));
    }

    /// Publish an alert event to the patient's subscribers.
    pub fn publish_alert(&self, event: AlertEvent) {
        self.publish(event.patient_id, PatientEvent::ReceiveAlert(event));
    }

    /// Release a patient's channel once its subscribers are gone.
    ///
    /// Transports call this after dropping their receiver, so a patient
    /// that is never measured again does not leave a map entry behind
    /// waiting for a publish to sweep it. A channel that still has live
    /// subscribers is left untouched.
    pub fn unsubscribe(&self, patient_id: DbId) {
        let mut channels = self.channels.write().expect("hub lock poisoned");
        if let Some(tx) = channels.get(&patient_id) {
            if tx.receiver_count() == 0 {
                channels.remove(&patient_id);
            }
        }
    }

    /// Number of live subscribers for a patient.
    pub fn subscriber_count(&self, patient_id: DbId) -> usize {
        self.channels
            .read()
            .expect("hub lock poisoned")
            .get(&patient_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    fn publish(&self, patient_id: DbId, event: PatientEvent) {
        let channels = self.channels.read().expect("hub lock poisoned");
        let Some(tx) = channels.get(&patient_id) else {
            // Nobody ever subscribed to this patient; nothing to fan out.
            return;
        };
        if tx.send(event).is_err() {
            drop(channels);
            // All receivers are gone; drop the channel so the map does not
            // grow with one entry per patient ever seen.
            let mut channels = self.channels.write().expect("hub lock poisoned");
            if let Some(tx) = channels.get(&patient_id) {
                if tx.receiver_count() == 0 {
                    channels.remove(&patient_id);
                }
            }
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
    use vitalflow_core::alert::Severity;
    use vitalflow_core::metric::MetricType;

    fn sample(patient_id: DbId) -> MetricSample {
        MetricSample {
            patient_id,
            metric_type: MetricType::Pulse,
            value: 72.0,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscribers_only_see_their_patient() {
        let hub = PatientHub::new();
        let mut rx_a = hub.subscribe(1);
        let mut rx_b = hub.subscribe(2);

        hub.publish_metric(sample(1));

        let event = rx_a.recv().await.unwrap();
        assert!(matches!(event, PatientEvent::ReceiveMetric(s) if s.patient_id == 1));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn alerts_reach_every_subscriber_of_the_patient() {
        let hub = PatientHub::new();
        let mut rx_1 = hub.subscribe(1);
        let mut rx_2 = hub.subscribe(1);

        let event = AlertEvent::new(1, MetricType::Pulse, Severity::Alert, 140.0, Utc::now());
        hub.publish_alert(event);

        assert!(matches!(rx_1.recv().await.unwrap(), PatientEvent::ReceiveAlert(_)));
        assert!(matches!(rx_2.recv().await.unwrap(), PatientEvent::ReceiveAlert(_)));
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let hub = PatientHub::new();
        hub.publish_metric(sample(1));
        assert_eq!(hub.subscriber_count(1), 0);
    }

    #[test]
    fn channel_is_dropped_once_all_subscribers_leave() {
        let hub = PatientHub::new();
        let rx = hub.subscribe(1);
        drop(rx);
        hub.publish_metric(sample(1));
        assert_eq!(hub.subscriber_count(1), 0);
        assert!(hub.channels.read().unwrap().get(&1).is_none());
    }

    #[test]
    fn unsubscribe_releases_the_channel_without_a_publish() {
        let hub = PatientHub::new();
        let rx = hub.subscribe(1);
        drop(rx);

        hub.unsubscribe(1);

        assert!(hub.channels.read().unwrap().get(&1).is_none());
    }

    #[test]
    fn unsubscribe_keeps_the_channel_while_others_listen() {
        let hub = PatientHub::new();
        let rx_1 = hub.subscribe(1);
        let rx_2 = hub.subscribe(1);
        drop(rx_1);

        hub.unsubscribe(1);

        assert_eq!(hub.subscriber_count(1), 1);
        drop(rx_2);
    }

    #[test]
    fn events_serialize_with_a_method_tag() {
        let event = PatientEvent::ReceiveMetric(sample(7));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["method"], "ReceiveMetric");
        assert_eq!(json["payload"]["patientId"], 7);
    }
}
