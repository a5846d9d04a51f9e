//! Duration-gated threshold escalation engine.
//!
//! Pure logic — no store or broker access. The caller loads the prior
//! [`EscalationState`] for the sample's (patient, metric type) key, runs
//! [`assess`], persists the resulting state, and publishes the event if one
//! was confirmed. Elapsed time is measured on sample timestamps, so the
//! caller must observe samples for a given key in non-decreasing timestamp
//! order (the broker guarantees this by keying `raw-metrics` by patient id).

use serde::{Deserialize, Serialize};

use crate::alert::{AlertEvent, Severity};
use crate::metric::MetricSample;
use crate::thresholds::{classify, AnalysisSettings, NominalRange};
use crate::types::Timestamp;

/// In-flight escalation window for one (patient, metric type) key.
///
/// Created on the first out-of-range sample, updated on every subsequent
/// sample of the key, cleared when a sample returns in range or when the
/// key goes stale past the applicable timeout (store TTL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationState {
    /// Raw severity the key currently sits at.
    pub current_severity: Severity,
    /// When the key entered `current_severity`.
    pub severity_entered_at: Timestamp,
    /// Timestamp of the newest sample applied to this key.
    pub last_sample_at: Timestamp,
    /// Highest-fidelity severity already emitted for this window.
    /// `Normal` means nothing has been emitted yet.
    pub last_emitted_severity: Severity,
}

/// Outcome of applying one sample to a key.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    /// New state for the key; `None` clears it (back to Normal).
    pub state: Option<EscalationState>,
    /// At most one confirmed transition per sample.
    pub event: Option<AlertEvent>,
}

impl Assessment {
    fn unchanged(state: Option<EscalationState>) -> Self {
        Self { state, event: None }
    }
}

/// Apply one sample to the escalation state of its (patient, metric) key.
///
/// Emission rules:
/// - An event is emitted only when a severity has been sustained for at
///   least its timeout and that severity has not already been emitted for
///   this window. Replaying an applied sample against unchanged state never
///   re-emits.
/// - Returning in range clears the state; a resolved event (severity
///   Normal) is emitted only if some severity had previously been emitted
///   for the key — an unconfirmed window resolves silently.
/// - A sample older than the newest one applied is absorbed without effect.
pub fn assess(
    prior: Option<EscalationState>,
    sample: &MetricSample,
    range: &NominalRange,
    settings: &AnalysisSettings,
) -> Assessment {
    if let Some(state) = &prior {
        if sample.timestamp < state.last_sample_at {
            return Assessment::unchanged(prior);
        }
    }

    let raw = classify(sample.value, range, settings);

    if raw == Severity::Normal {
        let event = prior.as_ref().and_then(|state| {
            (state.last_emitted_severity > Severity::Normal).then(|| {
                AlertEvent::new(
                    sample.patient_id,
                    sample.metric_type,
                    Severity::Normal,
                    sample.value,
                    sample.timestamp,
                )
            })
        });
        return Assessment { state: None, event };
    }

    let mut state = match prior {
        // Sustained at the same severity: the window keeps running.
        Some(state) if state.current_severity == raw => state,
        // Severity changed while out of range: the window restarts at the
        // new severity, but what was already emitted stays suppressed.
        Some(state) => EscalationState {
            current_severity: raw,
            severity_entered_at: sample.timestamp,
            last_sample_at: state.last_sample_at,
            last_emitted_severity: state.last_emitted_severity,
        },
        // First out-of-range sample for this key.
        None => EscalationState {
            current_severity: raw,
            severity_entered_at: sample.timestamp,
            last_sample_at: sample.timestamp,
            last_emitted_severity: Severity::Normal,
        },
    };
    state.last_sample_at = sample.timestamp;

    let elapsed = sample.timestamp - state.severity_entered_at;
    let event = if elapsed >= settings.timeout_for(raw) && state.last_emitted_severity != raw {
        state.last_emitted_severity = raw;
        Some(AlertEvent::new(
            sample.patient_id,
            sample.metric_type,
            raw,
            sample.value,
            sample.timestamp,
        ))
    } else {
        None
    };

    Assessment {
        state: Some(state),
        event,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
