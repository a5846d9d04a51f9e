//! Consumer loop with commit-after-handle semantics.

use std::str::FromStr;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::codec::{self, CodecError};
use crate::error::BrokerError;
use crate::topic::Broker;

/// Where a consumer with no committed offsets starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetReset {
    /// From the beginning of each partition log.
    Earliest,
    /// From the end offset at subscribe time (only new records).
    Latest,
}

impl FromStr for OffsetReset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "earliest" => Ok(OffsetReset::Earliest),
            "latest" => Ok(OffsetReset::Latest),
            other => Err(format!("unknown offset reset policy: {other}")),
        }
    }
}

/// Consumer group configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub group_id: String,
    pub offset_reset: OffsetReset,
    /// Pause before redelivering a record whose handler failed.
    pub redelivery_delay: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group_id: "default".to_string(),
            offset_reset: OffsetReset::Earliest,
            redelivery_delay: Duration::from_secs(1),
        }
    }
}

/// One record as seen by a consumer handler.
#[derive(Debug, Clone)]
pub struct ConsumerRecord {
    pub topic: String,
    pub partition: usize,
    pub offset: usize,
    pub key: String,
    pub payload: Vec<u8>,
}

impl ConsumerRecord {
    /// Decode the compact-JSON payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        codec::decode(&self.payload)
    }
}

/// A long-lived topic consumer.
///
/// [`Consumer::run`] drives one record at a time through the handler and
/// commits the offset only after the handler returns `Ok` — at-least-once
/// delivery. A handler error is logged with the attempt count and the same
/// record is redelivered after [`ConsumerConfig::redelivery_delay`]; the
/// loop never skips or drops a record and never terminates on a handler
/// failure. Cancellation takes effect between records, never mid-record.
pub struct Consumer {
    topic: std::sync::Arc<crate::topic::Topic>,
    config: ConsumerConfig,
    offsets: Vec<usize>,
}

impl Consumer {
    /// Subscribe to a topic, positioning offsets per the reset policy.
    pub fn subscribe(
        broker: &Broker,
        topic: &str,
        config: ConsumerConfig,
    ) -> Result<Self, BrokerError> {
        let topic = broker.topic(topic)?;
        let offsets = match config.offset_reset {
            OffsetReset::Earliest => vec![0; topic.partition_count()],
            OffsetReset::Latest => (0..topic.partition_count())
                .map(|p| topic.end_offset(p))
                .collect(),
        };
        Ok(Self {
            topic,
            config,
            offsets,
        })
    }

    /// Run the consume loop until cancelled.
    pub async fn run<F, Fut>(mut self, cancel: CancellationToken, mut handler: F)
    where
        F: FnMut(ConsumerRecord) -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<()>>,
    {
        let topic_name = self.topic.name().to_string();
        let mut changes = self.topic.watch();
        tracing::info!(
            topic = %topic_name,
            group = %self.config.group_id,
            "Consumer loop started"
        );

        'run: loop {
            // Mark the current version seen before draining, so records
            // appended mid-drain still wake the loop afterwards.
            changes.borrow_and_update();

            for partition in 0..self.offsets.len() {
                'partition: loop {
                    if cancel.is_cancelled() {
                        break 'run;
                    }
                    let offset = self.offsets[partition];
                    let Some(record) = self.topic.get(partition, offset) else {
                        break 'partition;
                    };
                    let record = ConsumerRecord {
                        topic: topic_name.clone(),
                        partition,
                        offset,
                        key: record.key,
                        payload: record.payload,
                    };

                    let mut attempt: u32 = 1;
                    loop {
                        match handler(record.clone()).await {
                            Ok(()) => {
                                // Commit only after successful handling.
                                self.offsets[partition] = offset + 1;
                                break;
                            }
                            Err(e) => {
                                tracing::warn!(
                                    topic = %topic_name,
                                    partition,
                                    offset,
                                    attempt,
                                    error = %e,
                                    "Record handling failed, redelivering"
                                );
                                attempt += 1;
                                tokio::select! {
                                    _ = cancel.cancelled() => break 'run,
                                    _ = tokio::time::sleep(self.config.redelivery_delay) => {}
                                }
                            }
                        }
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break 'run,
                changed = changes.changed() => {
                    if changed.is_err() {
                        // Topic dropped with the broker; nothing more to consume.
                        break 'run;
                    }
                }
            }
        }

        tracing::info!(
            topic = %topic_name,
            group = %self.config.group_id,
            "Consumer loop stopped"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::Producer;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn broker_with_topic(partitions: usize) -> Broker {
        let broker = Broker::new();
        broker.create_topic("t", partitions).unwrap();
        broker
    }

    #[tokio::test]
    async fn records_for_one_key_are_handled_in_order() {
        let broker = broker_with_topic(4);
        let producer = Producer::for_topic(&broker, "t").unwrap();
        for i in 0..20 {
            producer.send("patient-1", &i).unwrap();
        }

        let consumer = Consumer::subscribe(&broker, "t", ConsumerConfig::default()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        let seen_handler = Arc::clone(&seen);
        let cancel_handler = cancel.clone();
        consumer
            .run(cancel.clone(), move |record| {
                let seen = Arc::clone(&seen_handler);
                let cancel = cancel_handler.clone();
                async move {
                    let value: i32 = record.decode().unwrap();
                    let mut seen = seen.lock().unwrap();
                    seen.push(value);
                    if seen.len() == 20 {
                        cancel.cancel();
                    }
                    Ok(())
                }
            })
            .await;

        assert_eq!(*seen.lock().unwrap(), (0..20).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_record_is_redelivered_then_committed() {
        let broker = broker_with_topic(1);
        let producer = Producer::for_topic(&broker, "t").unwrap();
        producer.send("k", &"only").unwrap();

        let consumer = Consumer::subscribe(&broker, "t", ConsumerConfig::default()).unwrap();
        let attempts = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let attempts_handler = Arc::clone(&attempts);
        let cancel_handler = cancel.clone();
        consumer
            .run(cancel.clone(), move |_record| {
                let attempts = Arc::clone(&attempts_handler);
                let cancel = cancel_handler.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        anyhow::bail!("transient store outage");
                    }
                    cancel.cancel();
                    Ok(())
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3, "two redeliveries");
    }

    #[tokio::test]
    async fn latest_offset_reset_skips_the_backlog() {
        let broker = broker_with_topic(1);
        let producer = Producer::for_topic(&broker, "t").unwrap();
        producer.send("k", &"old").unwrap();

        let config = ConsumerConfig {
            offset_reset: OffsetReset::Latest,
            ..ConsumerConfig::default()
        };
        let consumer = Consumer::subscribe(&broker, "t", config).unwrap();
        producer.send("k", &"new").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let seen_handler = Arc::clone(&seen);
        let cancel_handler = cancel.clone();
        consumer
            .run(cancel.clone(), move |record| {
                let seen = Arc::clone(&seen_handler);
                let cancel = cancel_handler.clone();
                async move {
                    seen.lock().unwrap().push(record.decode::<String>().unwrap());
                    cancel.cancel();
                    Ok(())
                }
            })
            .await;

        assert_eq!(*seen.lock().unwrap(), vec!["new".to_string()]);
    }

    #[test]
    fn offset_reset_parses_case_insensitively() {
        assert_eq!(OffsetReset::from_str("Earliest"), Ok(OffsetReset::Earliest));
        assert_eq!(OffsetReset::from_str("LATEST"), Ok(OffsetReset::Latest));
        assert!(OffsetReset::from_str("newest").is_err());
    }
}
