//! In-process partitioned message bus.
//!
//! Topics are split into a fixed number of bounded partitions. A message is
//! routed by a stable hash of its key, so every message with the same key
//! lands on the same partition and is received in the order it was
//! produced. Each partition has exactly one consumer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::debug;

/// Bus errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("topic already exists: {0}")]
    TopicExists(String),

    #[error("topic {0} already has a subscriber")]
    AlreadySubscribed(String),

    #[error("topic {0} is closed")]
    Closed(String),

    /// An external sink rejected the message.
    #[error("failed to deliver to {topic}: {reason}")]
    Delivery { topic: String, reason: String },
}

/// A message as delivered to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub key: String,
    pub partition: usize,
    /// Position within the partition, starting at 0.
    pub offset: u64,
    pub value: Vec<u8>,
}

/// Anything that can emit keyed messages onto a topic.
#[async_trait]
pub trait MessageProducer: Send + Sync {
    async fn emit(&self, topic: &str, key: &str, value: Vec<u8>) -> Result<(), BusError>;
}

/// Stable partition for `key` among `partitions`.
pub fn partition_for(key: &str, partitions: usize) -> usize {
    let digest = Sha256::digest(key.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) % partitions.max(1) as u64) as usize
}

struct Partition {
    sender: mpsc::Sender<Message>,
    // Held across the send so offsets follow channel order.
    next_offset: tokio::sync::Mutex<u64>,
}

struct TopicState {
    name: String,
    partitions: Vec<Partition>,
    receivers: Mutex<Option<Vec<mpsc::Receiver<Message>>>>,
}

/// Receiving end of one partition.
pub struct PartitionReceiver {
    partition: usize,
    rx: mpsc::Receiver<Message>,
}

impl PartitionReceiver {
    pub fn partition(&self) -> usize {
        self.partition
    }

    /// Next message, or `None` once the topic is closed and drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

/// Partitioned in-memory topics.
pub struct InMemoryBus {
    partitions: usize,
    capacity: usize,
    topics: RwLock<HashMap<String, Arc<TopicState>>>,
}

impl InMemoryBus {
    pub fn new(partitions: usize, capacity: usize) -> Self {
        Self {
            partitions: partitions.max(1),
            capacity: capacity.max(1),
            topics: RwLock::new(HashMap::new()),
        }
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Create a topic with the bus's partition count.
    pub fn create_topic(&self, name: &str) -> Result<(), BusError> {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        if topics.contains_key(name) {
            return Err(BusError::TopicExists(name.to_string()));
        }
        let mut partitions = Vec::with_capacity(self.partitions);
        let mut receivers = Vec::with_capacity(self.partitions);
        for _ in 0..self.partitions {
            let (sender, rx) = mpsc::channel(self.capacity);
            partitions.push(Partition {
                sender,
                next_offset: tokio::sync::Mutex::new(0),
            });
            receivers.push(rx);
        }
        topics.insert(
            name.to_string(),
            Arc::new(TopicState {
                name: name.to_string(),
                partitions,
                receivers: Mutex::new(Some(receivers)),
            }),
        );
        debug!(topic = name, partitions = self.partitions, "Topic created");
        Ok(())
    }

    fn topic(&self, name: &str) -> Result<Arc<TopicState>, BusError> {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| BusError::UnknownTopic(name.to_string()))
    }

    /// Take the receivers of every partition of `topic`. Only one subscriber
    /// per topic is allowed.
    pub fn subscribe(&self, topic: &str) -> Result<Vec<PartitionReceiver>, BusError> {
        let state = self.topic(topic)?;
        let receivers = state
            .receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| BusError::AlreadySubscribed(topic.to_string()))?;
        Ok(receivers
            .into_iter()
            .enumerate()
            .map(|(partition, rx)| PartitionReceiver { partition, rx })
            .collect())
    }

    /// Route a message to its partition, waiting for capacity.
    pub async fn produce(
        &self,
        topic: &str,
        key: &str,
        value: Vec<u8>,
    ) -> Result<(usize, u64), BusError> {
        let state = self.topic(topic)?;
        let partition = partition_for(key, state.partitions.len());
        let slot = &state.partitions[partition];

        let mut next_offset = slot.next_offset.lock().await;
        let offset = *next_offset;
        let message = Message {
            topic: state.name.clone(),
            key: key.to_string(),
            partition,
            offset,
            value,
        };
        slot.sender
            .send(message)
            .await
            .map_err(|_| BusError::Closed(topic.to_string()))?;
        *next_offset += 1;
        Ok((partition, offset))
    }

    /// Stop accepting messages on `topic`; consumers drain what is buffered
    /// and then see end of stream.
    pub fn close(&self, topic: &str) -> Result<(), BusError> {
        self.topics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(topic)
            .map(|_| ())
            .ok_or_else(|| BusError::UnknownTopic(topic.to_string()))
    }
}

#[async_trait]
impl MessageProducer for InMemoryBus {
    async fn emit(&self, topic: &str, key: &str, value: Vec<u8>) -> Result<(), BusError> {
        self.produce(topic, key, value).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitioning_is_stable_and_bounded() {
        for key in ["b1", "b2", "resource-42", ""] {
            let p = partition_for(key, 4);
            assert!(p < 4);
            assert_eq!(p, partition_for(key, 4));
        }
        assert_eq!(partition_for("anything", 1), 0);
        assert_eq!(partition_for("anything", 0), 0);
    }

    #[tokio::test]
    async fn same_key_preserves_order() {
        let bus = InMemoryBus::new(4, 16);
        bus.create_topic("t").unwrap();
        let mut receivers = bus.subscribe("t").unwrap();
        for i in 0..5u8 {
            bus.produce("t", "build-1", vec![i]).await.unwrap();
        }
        bus.close("t").unwrap();

        let expected = partition_for("build-1", 4);
        let rx = &mut receivers[expected];
        let mut seen = Vec::new();
        while let Some(msg) = rx.recv().await {
            assert_eq!(msg.partition, expected);
            assert_eq!(msg.offset, seen.len() as u64);
            seen.push(msg.value[0]);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn unknown_topic_is_rejected() {
        let bus = InMemoryBus::new(2, 4);
        let err = bus.produce("missing", "k", Vec::new()).await.unwrap_err();
        assert_eq!(err, BusError::UnknownTopic("missing".into()));
        assert!(matches!(bus.subscribe("missing"), Err(BusError::UnknownTopic(_))));
        assert!(bus.close("missing").is_err());
    }

    #[tokio::test]
    async fn second_subscriber_is_rejected() {
        let bus = InMemoryBus::new(2, 4);
        bus.create_topic("t").unwrap();
        let receivers = bus.subscribe("t").unwrap();
        assert_eq!(receivers.len(), 2);
        assert!(matches!(
            bus.subscribe("t"),
            Err(BusError::AlreadySubscribed(_))
        ));
        assert!(matches!(bus.create_topic("t"), Err(BusError::TopicExists(_))));
    }

    #[tokio::test]
    async fn dropped_consumer_closes_partition() {
        let bus = InMemoryBus::new(1, 4);
        bus.create_topic("t").unwrap();
        drop(bus.subscribe("t").unwrap());
        let err = bus.emit("t", "k", b"x".to_vec()).await.unwrap_err();
        assert_eq!(err, BusError::Closed("t".into()));
    }
}
