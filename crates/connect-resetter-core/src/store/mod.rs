//! Offset store abstraction.
//!
//! The resetters never talk to brokers directly. They go through
//! [`OffsetStore`], which exposes exactly the cluster capabilities a reset
//! needs:
//!
//! - **Kafka**: [`KafkaOffsetStore`], the wire-protocol backend
//! - **Memory**: [`MemoryOffsetStore`], an in-process model of groups and
//!   partitioned logs (for testing and rehearsals)

mod kafka;
mod memory;

pub use kafka::KafkaOffsetStore;
pub use memory::MemoryOffsetStore;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use crate::kafka::{GroupDescription, GroupMember, GroupState, TopicRecord};
use crate::Result;

/// A topic partition, written `topic:partition` on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.topic, self.partition)
    }
}

impl FromStr for TopicPartition {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        // Topic names cannot contain ':', so the last one separates the partition
        let (topic, partition) = s.rsplit_once(':').ok_or_else(|| {
            crate::Error::Config(format!("Invalid partition '{}', expected topic:partition", s))
        })?;

        if topic.is_empty() {
            return Err(crate::Error::Config(format!(
                "Invalid partition '{}', topic is empty",
                s
            )));
        }

        let partition: i32 = partition
            .parse()
            .ok()
            .filter(|p| *p >= 0)
            .ok_or_else(|| {
                crate::Error::Config(format!(
                    "Invalid partition '{}', partition must be a non-negative integer",
                    s
                ))
            })?;

        Ok(TopicPartition::new(topic, partition))
    }
}

/// Records returned by one read, with the position to continue from.
#[derive(Debug, Clone, Default)]
pub struct RecordChunk {
    pub records: Vec<TopicRecord>,
    /// Offset of the next read. Always past every record in `records`, and
    /// past any control records that were dropped.
    pub next_offset: i64,
    /// High watermark of the partition when the read was served. Nothing
    /// below it is left to read when `records` is empty and `next_offset`
    /// did not move.
    pub high_watermark: i64,
}

/// Cluster capabilities used by the sink and source resetters.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    /// Describe a consumer group. A group that does not exist is reported
    /// as `Dead` with no members.
    async fn describe_group(&self, group_id: &str) -> Result<GroupDescription>;

    /// Committed offsets of a consumer group, empty when none exist.
    async fn committed_offsets(&self, group_id: &str) -> Result<Vec<(TopicPartition, i64)>>;

    /// Delete committed offsets, returning the partitions that were deleted.
    ///
    /// Partitions without a committed offset, or a missing group, are a no-op.
    async fn delete_committed_offsets(
        &self,
        group_id: &str,
        partitions: &[TopicPartition],
    ) -> Result<Vec<TopicPartition>>;

    /// Delete a consumer group. Returns `false` when it did not exist.
    async fn delete_group(&self, group_id: &str) -> Result<bool>;

    /// Partition ids of a topic (`TopicNotFound` when it does not exist).
    async fn partition_ids(&self, topic: &str) -> Result<Vec<i32>>;

    /// `(earliest, latest)` offsets of a partition.
    async fn offset_bounds(&self, topic: &str, partition: i32) -> Result<(i64, i64)>;

    /// Read records starting at `offset`.
    async fn read(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
        max_bytes: i32,
    ) -> Result<RecordChunk>;

    /// Write one tombstone per key and wait for acknowledgement.
    async fn write_tombstones(&self, topic: &str, partition: i32, keys: Vec<Bytes>)
        -> Result<usize>;
}
