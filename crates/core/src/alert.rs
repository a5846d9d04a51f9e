//! Severity levels and confirmed escalation events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metric::MetricType;
use crate::types::{DbId, Timestamp};

/// Ordered escalation level: Normal < Warning < Alert.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    Normal,
    Warning,
    Alert,
}

impl Severity {
    /// Canonical name, matching the wire representation and the
    /// `alerts.severity` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "Normal",
            Severity::Warning => "Warning",
            Severity::Alert => "Alert",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A confirmed severity transition for one (patient, metric type).
///
/// Published on the `alerts` topic, keyed by patient id so per-patient
/// ordering is preserved downstream. Emitted only when the escalation
/// engine confirms a transition — never per sample. A severity of
/// [`Severity::Normal`] denotes a de-escalation ("resolved") event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub id: Uuid,
    pub patient_id: DbId,
    pub metric_type: MetricType,
    pub severity: Severity,
    pub triggering_value: f64,
    pub created_at: Timestamp,
}

impl AlertEvent {
    /// Build an event for a confirmed transition.
    ///
    /// `created_at` is the triggering sample's timestamp, not wall clock,
    /// so replays produce byte-identical events.
    pub fn new(
        patient_id: DbId,
        metric_type: MetricType,
        severity: Severity,
        triggering_value: f64,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            metric_type,
            severity,
            triggering_value,
            created_at,
        }
    }

    /// `true` for de-escalation ("resolved") events.
    pub fn is_resolution(&self) -> bool {
        self.severity == Severity::Normal
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
