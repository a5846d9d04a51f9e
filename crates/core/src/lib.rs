//! Shared data model and pure analysis logic for the vitalflow pipeline.
//!
//! Everything in this crate is I/O-free:
//!
//! - [`metric`] — metric sample wire types and the closed metric-type
//!   enumeration.
//! - [`alert`] — severity levels and the [`AlertEvent`](alert::AlertEvent)
//!   emitted on confirmed escalations.
//! - [`thresholds`] — nominal ranges, deviation math, and raw severity
//!   classification.
//! - [`escalation`] — the stateful duration-gated escalation engine,
//!   expressed as a pure transition function over
//!   [`EscalationState`](escalation::EscalationState).
//! - [`config`] — environment-driven configuration for the services.
//! - [`topics`] — well-known broker topic names.

pub mod alert;
pub mod config;
pub mod error;
pub mod escalation;
pub mod metric;
pub mod thresholds;
pub mod topics;
pub mod types;

pub use alert::{AlertEvent, Severity};
pub use config::AppConfig;
pub use error::CoreError;
pub use escalation::{assess, Assessment, EscalationState};
pub use metric::{MetricSample, MetricType};
pub use thresholds::{AnalysisSettings, NominalRange, ThresholdProfile};
