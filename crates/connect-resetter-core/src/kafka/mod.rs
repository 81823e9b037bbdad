//! Kafka protocol client implementation.

mod client;
pub mod consumer_groups;
mod fetch;
mod metadata;
mod produce;
mod router;
mod tls;

use bytes::Bytes;

pub use client::KafkaClient;
pub use consumer_groups::{
    CommittedOffset, Coordinator, GroupDescription, GroupMember, GroupState, PartitionDeletion,
};
pub use fetch::FetchResponse;
pub use metadata::{BrokerMetadata, ClusterMetadata, PartitionMetadata, TopicMetadata};
pub use produce::ProduceResponse;
pub use router::BrokerRouter;

/// A single record read from, or written to, a topic partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRecord {
    /// Offset in the partition (ignored when producing)
    pub offset: i64,
    /// Record timestamp (epoch milliseconds)
    pub timestamp: i64,
    /// Record key
    pub key: Option<Bytes>,
    /// Record value; `None` is a tombstone
    pub value: Option<Bytes>,
}

impl TopicRecord {
    /// A tombstone for `key`, timestamped now.
    pub fn tombstone(key: Bytes) -> Self {
        Self {
            offset: 0,
            timestamp: chrono::Utc::now().timestamp_millis(),
            key: Some(key),
            value: None,
        }
    }

    /// Whether this record deletes its key.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// Broker error codes the client reacts to.
pub(crate) mod error_codes {
    pub const NONE: i16 = 0;
    pub const NOT_LEADER_OR_FOLLOWER: i16 = 6;
    pub const COORDINATOR_LOAD_IN_PROGRESS: i16 = 14;
    pub const COORDINATOR_NOT_AVAILABLE: i16 = 15;
    pub const NOT_COORDINATOR: i16 = 16;
    pub const UNKNOWN_TOPIC_OR_PARTITION: i16 = 3;
    pub const NON_EMPTY_GROUP: i16 = 68;
    pub const GROUP_ID_NOT_FOUND: i16 = 69;
    pub const GROUP_SUBSCRIBED_TO_TOPIC: i16 = 86;
}
