//! Stream-processing services: analysis (metrics in, alerts out) and
//! notification (alerts in, deliveries out), plus the escalation state
//! store they share.

pub mod analysis;
pub mod notifier;
pub mod state;

pub use analysis::AnalysisService;
pub use notifier::{AlertStore, MemoryAlertStore, NotificationService, PersistedAlert, PgAlertStore};
pub use state::{
    EscalationStateStore, MemoryStateStore, RedisStateStore, StateKey, StateStoreError,
};
