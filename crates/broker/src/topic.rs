//! Topic registry and partitioned append logs.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::watch;

use crate::error::BrokerError;

/// One record in a partition log.
#[derive(Debug, Clone)]
pub(crate) struct Record {
    pub key: String,
    pub payload: Vec<u8>,
}

/// A named, partitioned append log.
///
/// Records are routed to `hash(key) % partitions`, so all records for a
/// key share a partition and keep their append order. Logs are retained
/// for the lifetime of the broker; consumers track their own offsets.
#[derive(Debug)]
pub struct Topic {
    name: String,
    partitions: Vec<Mutex<Vec<Record>>>,
    /// Bumped on every append so consumers can await new records without
    /// missing a wakeup (watch marks changes as seen per receiver).
    version: watch::Sender<u64>,
}

impl Topic {
    fn new(name: &str, partitions: usize) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            name: name.to_string(),
            partitions: (0..partitions).map(|_| Mutex::new(Vec::new())).collect(),
            version,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Append a keyed record, returning its (partition, offset).
    pub(crate) fn append(&self, key: &str, payload: Vec<u8>) -> (usize, usize) {
        let partition = self.partition_for(key);
        let mut log = self.partitions[partition]
            .lock()
            .expect("partition lock poisoned");
        let offset = log.len();
        log.push(Record {
            key: key.to_string(),
            payload,
        });
        drop(log);
        self.version.send_modify(|v| *v += 1);
        (partition, offset)
    }

    /// Fetch the record at `offset`, if appended yet.
    pub(crate) fn get(&self, partition: usize, offset: usize) -> Option<Record> {
        self.partitions[partition]
            .lock()
            .expect("partition lock poisoned")
            .get(offset)
            .cloned()
    }

    /// Current end offset (exclusive) of a partition.
    pub fn end_offset(&self, partition: usize) -> usize {
        self.partitions[partition]
            .lock()
            .expect("partition lock poisoned")
            .len()
    }

    /// Receiver that observes every append.
    pub(crate) fn watch(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions.len() as u64) as usize
    }
}

/// Shared topic registry.
///
/// Owned explicitly by the hosting process and handed to producers and
/// consumers via `Arc` — never an ambient global.
#[derive(Default)]
pub struct Broker {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a topic with the given partition count.
    ///
    /// Creation is not destructive: an existing topic is left untouched
    /// and reported as [`BrokerError::TopicExists`], which init treats as
    /// success (see [`crate::initialize_topics`]).
    pub fn create_topic(&self, name: &str, partitions: usize) -> Result<(), BrokerError> {
        if partitions == 0 {
            return Err(BrokerError::InvalidPartitionCount(name.to_string()));
        }
        let mut topics = self.topics.write().expect("topic registry lock poisoned");
        if topics.contains_key(name) {
            return Err(BrokerError::TopicExists(name.to_string()));
        }
        topics.insert(name.to_string(), Arc::new(Topic::new(name, partitions)));
        Ok(())
    }

    /// Look up a topic handle.
    pub fn topic(&self, name: &str) -> Result<Arc<Topic>, BrokerError> {
        self.topics
            .read()
            .expect("topic registry lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownTopic(name.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
