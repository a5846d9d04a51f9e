//! Keyed producer, one per output topic per service.

use std::sync::Arc;

use serde::Serialize;

use crate::codec;
use crate::error::BrokerError;
use crate::topic::{Broker, Topic};

/// Publishes compact-JSON records onto a single topic.
///
/// Created once at service start against an owned [`Broker`] handle.
/// Records with the same key always land on the same partition, so
/// callers that key by patient id get per-patient ordering for free.
pub struct Producer {
    topic: Arc<Topic>,
}

impl Producer {
    /// Bind a producer to an existing topic.
    pub fn for_topic(broker: &Broker, name: &str) -> Result<Self, BrokerError> {
        Ok(Self {
            topic: broker.topic(name)?,
        })
    }

    /// Encode and append one keyed record.
    pub fn send<T: Serialize>(&self, key: &str, value: &T) -> Result<(), BrokerError> {
        let payload = codec::encode(value)?;
        let (partition, offset) = self.topic.append(key, payload);
        tracing::debug!(
            topic = self.topic.name(),
            key,
            partition,
            offset,
            "Record produced"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
