//! In-process message broker for the vitalflow pipeline.
//!
//! Topics are append logs partitioned by record key, so every record for a
//! given key lands on the same partition and is observed in append order —
//! the ordering guarantee the escalation duration gate depends on.
//! Consumers track a committed offset per partition and advance it only
//! after a record is handled successfully (at-least-once delivery);
//! handlers must therefore be idempotent.
//!
//! - [`Broker`] — topic registry with idempotent topic initialization.
//! - [`Producer`] — one per output topic per service; compact-JSON encodes
//!   and appends keyed records.
//! - [`Consumer`] — long-lived consume loop with commit-after-handle,
//!   redelivery on handler failure, and clean shutdown between records.

pub mod codec;
pub mod consumer;
pub mod error;
pub mod producer;
pub mod topic;

pub use codec::{decode, encode, CodecError};
pub use consumer::{Consumer, ConsumerConfig, ConsumerRecord, OffsetReset};
pub use error::BrokerError;
pub use producer::Producer;
pub use topic::Broker;

/// Idempotent, best-effort topic initialization for service startup.
///
/// An already-existing topic is success; any other creation error is
/// logged and skipped without aborting startup.
pub fn initialize_topics(broker: &Broker, topics: &[(&str, usize)]) {
    for (name, partitions) in topics {
        match broker.create_topic(name, *partitions) {
            Ok(()) => tracing::info!(topic = name, partitions, "Topic created"),
            Err(BrokerError::TopicExists(_)) => {
                tracing::debug!(topic = name, "Topic already exists")
            }
            Err(e) => tracing::error!(topic = name, error = %e, "Topic creation failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
