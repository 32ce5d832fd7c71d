//! Broker clients.
//!
//! A broker accepts opaque records on a topic, keyed by a partition key, and
//! guarantees that records sharing a partition key are consumed in the order
//! they were accepted.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use atrium_core::BrokerError;

/// Durable, partitioned message broker.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Append `payload` to `topic` under `partition_key`.
    async fn publish(&self, topic: &str, partition_key: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Short broker name for logs.
    fn name(&self) -> &'static str;
}

/// One record accepted by [`InMemoryBroker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRecord {
    pub partition_key: String,
    /// Position within the topic, starting at 0.
    pub offset: u64,
    pub payload: Vec<u8>,
}

impl BrokerRecord {
    /// Decode the payload as JSON.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

#[derive(Debug, Default)]
struct TopicLog {
    next_offset: u64,
    records: Vec<BrokerRecord>,
}

/// Append-only in-process broker.
///
/// Each topic is a single log, so order within a partition key is the
/// acceptance order. With a retention limit, the oldest records of a topic
/// are discarded once the limit is exceeded; offsets keep increasing.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    topics: Mutex<HashMap<String, TopicLog>>,
    retention: Option<usize>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_records` per topic.
    pub fn with_retention(max_records: usize) -> Self {
        Self {
            topics: Mutex::default(),
            retention: Some(max_records),
        }
    }

    /// Records of one partition, in order.
    pub fn consume(&self, topic: &str, partition_key: &str) -> Vec<BrokerRecord> {
        self.topic_records(topic)
            .into_iter()
            .filter(|r| r.partition_key == partition_key)
            .collect()
    }

    /// All retained records of a topic, in acceptance order.
    pub fn topic_records(&self, topic: &str) -> Vec<BrokerRecord> {
        self.topics
            .lock()
            .map(|topics| {
                topics
                    .get(topic)
                    .map(|log| log.records.clone())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Number of retained records in a topic.
    pub fn len(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .map(|topics| topics.get(topic).map_or(0, |log| log.records.len()))
            .unwrap_or(0)
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    async fn publish(&self, topic: &str, partition_key: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let mut topics = self.topics.lock().map_err(|_| BrokerError::Unavailable {
            broker: self.name().to_string(),
            reason: "broker lock poisoned".to_string(),
        })?;

        let log = topics.entry(topic.to_string()).or_default();
        let offset = log.next_offset;
        log.next_offset += 1;
        log.records.push(BrokerRecord {
            partition_key: partition_key.to_string(),
            offset,
            payload,
        });

        if let Some(limit) = self.retention {
            let excess = log.records.len().saturating_sub(limit);
            if excess > 0 {
                log.records.drain(..excess);
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
