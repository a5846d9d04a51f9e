//! Well-known broker topic names and partitioning defaults.
//!
//! These must match the topics the worker initializes at startup and the
//! keys the producers use. Both topics are keyed by patient id so that
//! per-patient ordering — which the escalation duration gate depends on —
//! survives partitioning.

/// Raw metric samples from bedside devices (value = `MetricSample` JSON).
pub const RAW_METRICS_TOPIC: &str = "raw-metrics";

/// Confirmed escalation events (value = `AlertEvent` JSON).
pub const ALERTS_TOPIC: &str = "alerts";

/// Default partition count for both topics.
pub const DEFAULT_PARTITIONS: usize = 4;
