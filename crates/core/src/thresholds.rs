//! Nominal ranges, deviation math, and raw severity classification.
//!
//! Pure logic — no database or broker access. The escalation engine
//! ([`crate::escalation`]) layers the duration gate on top of the raw
//! severity computed here.

use std::collections::HashMap;

use crate::alert::Severity;
use crate::metric::MetricType;

/// Nominal (in-range) bounds for one metric type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NominalRange {
    pub min: f64,
    pub max: f64,
}

impl NominalRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `true` when the value lies inside `[min, max]`.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Per-metric nominal ranges.
#[derive(Debug, Clone)]
pub struct ThresholdProfile {
    ranges: HashMap<MetricType, NominalRange>,
}

impl ThresholdProfile {
    /// Clinically nominal adult ranges for every metric type.
    pub fn clinical_defaults() -> Self {
        let mut ranges = HashMap::new();
        ranges.insert(MetricType::Pulse, NominalRange::new(60.0, 100.0));
        ranges.insert(MetricType::RespirationRate, NominalRange::new(12.0, 20.0));
        ranges.insert(MetricType::Temperature, NominalRange::new(36.1, 37.8));
        ranges.insert(MetricType::SystolicPressure, NominalRange::new(90.0, 120.0));
        ranges.insert(MetricType::DiastolicPressure, NominalRange::new(60.0, 80.0));
        ranges.insert(MetricType::Saturation, NominalRange::new(95.0, 100.0));
        ranges.insert(MetricType::Weight, NominalRange::new(50.0, 100.0));
        ranges.insert(MetricType::Hemoglobin, NominalRange::new(12.0, 17.5));
        ranges.insert(MetricType::Cholesterol, NominalRange::new(125.0, 200.0));
        Self { ranges }
    }

    pub fn range(&self, metric: MetricType) -> Option<&NominalRange> {
        self.ranges.get(&metric)
    }

    /// Override the nominal range for one metric type.
    pub fn set_range(&mut self, metric: MetricType, range: NominalRange) {
        self.ranges.insert(metric, range);
    }
}

/// Global analysis thresholds and escalation window timeouts.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisSettings {
    /// Deviation (percent) at or above which a breach classifies as Alert.
    pub alert_threshold_percent: f64,
    /// Deviation (percent) at or above which a breach classifies as Warning.
    pub warning_threshold_percent: f64,
    /// Breaches within this percent of the bound still classify as Warning.
    pub warning_boundary_percent: f64,
    /// How long a Warning must be sustained before it is confirmed.
    pub warning_timeout_minutes: i64,
    /// How long an Alert must be sustained before it is confirmed.
    pub alert_timeout_minutes: i64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            alert_threshold_percent: 20.0,
            warning_threshold_percent: 10.0,
            warning_boundary_percent: 5.0,
            warning_timeout_minutes: 10,
            alert_timeout_minutes: 5,
        }
    }
}

impl AnalysisSettings {
    /// The escalation window applicable to the given severity.
    ///
    /// Normal has no window; it maps to zero.
    pub fn timeout_for(&self, severity: Severity) -> chrono::Duration {
        match severity {
            Severity::Normal => chrono::Duration::zero(),
            Severity::Warning => chrono::Duration::minutes(self.warning_timeout_minutes),
            Severity::Alert => chrono::Duration::minutes(self.alert_timeout_minutes),
        }
    }
}

/// Percent deviation of `value` from the nearer bound of the range.
///
/// Returns `None` inside `[min, max]`.
pub fn deviation_percent(value: f64, range: &NominalRange) -> Option<f64> {
    if range.contains(value) {
        None
    } else if value < range.min {
        Some((range.min - value) / range.min * 100.0)
    } else {
        Some((value - range.max) / range.max * 100.0)
    }
}

/// Classify the raw severity of a single value.
///
/// Normal inside the range. Out of range, Alert wins when the deviation
/// reaches `alert_threshold_percent`; otherwise the breach is a Warning —
/// either because the deviation reached `warning_threshold_percent`,
/// because it is still within `warning_boundary_percent` of the bound, or
/// because it falls in the band between the two (severity must not
/// decrease as deviation grows).
pub fn classify(value: f64, range: &NominalRange, settings: &AnalysisSettings) -> Severity {
    let Some(deviation) = deviation_percent(value, range) else {
        return Severity::Normal;
    };

    if deviation >= settings.alert_threshold_percent {
        Severity::Alert
    } else {
        // Every sub-alert breach is a Warning: past the warning threshold,
        // inside the boundary band, or in the gap between the two, since
        // severity must not decrease as deviation grows.
        Severity::Warning
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
