//! Metric sample wire types.
//!
//! A [`MetricSample`] is one timestamped physiological measurement for a
//! patient, as published on the `raw-metrics` topic (key = patient id,
//! value = compact JSON with camelCase field names).

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

/// The closed set of physiological metric types the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricType {
    Pulse,
    RespirationRate,
    Temperature,
    SystolicPressure,
    DiastolicPressure,
    Saturation,
    Weight,
    Hemoglobin,
    Cholesterol,
}

impl MetricType {
    /// Every metric type, in declaration order.
    pub const ALL: [MetricType; 9] = [
        MetricType::Pulse,
        MetricType::RespirationRate,
        MetricType::Temperature,
        MetricType::SystolicPressure,
        MetricType::DiastolicPressure,
        MetricType::Saturation,
        MetricType::Weight,
        MetricType::Hemoglobin,
        MetricType::Cholesterol,
    ];

    /// Canonical name, matching the wire representation and the
    /// `alerts.alert_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Pulse => "Pulse",
            MetricType::RespirationRate => "RespirationRate",
            MetricType::Temperature => "Temperature",
            MetricType::SystolicPressure => "SystolicPressure",
            MetricType::DiastolicPressure => "DiastolicPressure",
            MetricType::Saturation => "Saturation",
            MetricType::Weight => "Weight",
            MetricType::Hemoglobin => "Hemoglobin",
            MetricType::Cholesterol => "Cholesterol",
        }
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped physiological measurement for a patient.
///
/// Samples are immutable once emitted by a metric source. Correct
/// escalation requires that samples for a given (patient, metric type) are
/// observed in non-decreasing timestamp order, which the consumption layer
/// guarantees by keying the `raw-metrics` topic by patient id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub patient_id: DbId,
    pub metric_type: MetricType,
    pub value: f64,
    pub timestamp: Timestamp,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
