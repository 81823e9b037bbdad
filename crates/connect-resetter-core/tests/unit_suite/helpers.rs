//! Test helper utilities.
//!
//! Builders for offsets-topic contents and sink consumer groups, and a store
//! wrapper that injects broker faults.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kafka_connect_resetter_core::kafka::GroupDescription;
use kafka_connect_resetter_core::{
    ConnectorIdentity, ConnectorKind, Error, MemoryOffsetStore, OffsetStore, RecordChunk, Result,
    SourceResetOptions, TopicPartition,
};

/// Default offsets topic name used by Kafka Connect.
pub const OFFSET_TOPIC: &str = "connect-offsets";

/// Offsets-topic key for a connector and file partition, as the JSON converter writes it.
pub fn offset_key(connector: &str, file: &str) -> Bytes {
    Bytes::from(json!([connector, { "filename": file }]).to_string())
}

/// Offsets-topic value holding a position.
pub fn offset_value(position: i64) -> Bytes {
    Bytes::from(json!({ "position": position }).to_string())
}

/// Append `key -> value` to the offsets topic.
pub fn commit_source_offset(
    store: &MemoryOffsetStore,
    partition: i32,
    connector: &str,
    file: &str,
    position: i64,
) {
    store
        .append(
            OFFSET_TOPIC,
            partition,
            Some(offset_key(connector, file)),
            Some(offset_value(position)),
        )
        .expect("Failed to append offset record");
}

/// Offsets topic shared by connectors `a` (2 keys), `b` (3 keys) and `c`
/// (1 key), spread over 3 partitions with repeated commits.
pub fn shared_offsets_store() -> Arc<MemoryOffsetStore> {
    let store = Arc::new(MemoryOffsetStore::new());
    store.create_topic(OFFSET_TOPIC, 3);

    commit_source_offset(&store, 0, "a", "a-1", 10);
    commit_source_offset(&store, 0, "b", "b-1", 5);
    commit_source_offset(&store, 1, "a", "a-2", 7);
    commit_source_offset(&store, 0, "b", "b-1", 6);
    commit_source_offset(&store, 1, "b", "b-2", 1);
    commit_source_offset(&store, 2, "c", "c-1", 99);
    commit_source_offset(&store, 2, "b", "b-3", 3);
    commit_source_offset(&store, 1, "b", "b-2", 2);
    commit_source_offset(&store, 0, "a", "a-1", 11);

    store
}

/// A sink connector's consumer group with offsets on `topic` partitions `0..partitions`.
pub fn sink_group_store(connector: &str, topic: &str, partitions: i32) -> Arc<MemoryOffsetStore> {
    let store = Arc::new(MemoryOffsetStore::new());
    for partition in 0..partitions {
        store.commit_offset(
            &format!("connect-{}", connector),
            TopicPartition::new(topic, partition),
            100 + partition as i64,
        );
    }
    store
}

pub fn sink(name: &str) -> ConnectorIdentity {
    ConnectorIdentity::new(name, ConnectorKind::Sink).expect("valid connector name")
}

pub fn source(name: &str) -> ConnectorIdentity {
    ConnectorIdentity::new(name, ConnectorKind::Source).expect("valid connector name")
}

pub fn source_options() -> SourceResetOptions {
    SourceResetOptions::new(OFFSET_TOPIC)
}

// ============================================================================
// Fault Injection
// ============================================================================

/// How long a stalled read waits, like a fetch long-poll.
const STALLED_READ_WAIT: Duration = Duration::from_millis(10);

/// Offset store over a [`MemoryOffsetStore`] that misbehaves on request.
pub struct FaultyStore {
    inner: Arc<MemoryOffsetStore>,
    stalled_partition: Option<i32>,
    failing_partition: Option<i32>,
    late_commit: Mutex<Option<(i32, String, String)>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryOffsetStore>) -> Self {
        Self {
            inner,
            stalled_partition: None,
            failing_partition: None,
            late_commit: Mutex::new(None),
        }
    }

    /// Reads of `partition` return nothing and report a high watermark that
    /// has not moved past the read offset.
    pub fn stall_reads(mut self, partition: i32) -> Self {
        self.stalled_partition = Some(partition);
        self
    }

    /// Every produce to `partition` fails.
    pub fn fail_produce(mut self, partition: i32) -> Self {
        self.failing_partition = Some(partition);
        self
    }

    /// On the first read, commit one more offset for `connector` to
    /// `partition`, after the snapshot bounds have been taken.
    pub fn commit_late(self, partition: i32, connector: &str, file: &str) -> Self {
        *self.late_commit.lock().unwrap() =
            Some((partition, connector.to_string(), file.to_string()));
        self
    }
}

#[async_trait]
impl OffsetStore for FaultyStore {
    async fn describe_group(&self, group_id: &str) -> Result<GroupDescription> {
        self.inner.describe_group(group_id).await
    }

    async fn committed_offsets(&self, group_id: &str) -> Result<Vec<(TopicPartition, i64)>> {
        self.inner.committed_offsets(group_id).await
    }

    async fn delete_committed_offsets(
        &self,
        group_id: &str,
        partitions: &[TopicPartition],
    ) -> Result<Vec<TopicPartition>> {
        self.inner.delete_committed_offsets(group_id, partitions).await
    }

    async fn delete_group(&self, group_id: &str) -> Result<bool> {
        self.inner.delete_group(group_id).await
    }

    async fn partition_ids(&self, topic: &str) -> Result<Vec<i32>> {
        self.inner.partition_ids(topic).await
    }

    async fn offset_bounds(&self, topic: &str, partition: i32) -> Result<(i64, i64)> {
        self.inner.offset_bounds(topic, partition).await
    }

    async fn read(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
        max_bytes: i32,
    ) -> Result<RecordChunk> {
        let late = self.late_commit.lock().unwrap().take();
        if let Some((late_partition, connector, file)) = late {
            commit_source_offset(&self.inner, late_partition, &connector, &file, 1);
        }

        if self.stalled_partition == Some(partition) {
            tokio::time::sleep(STALLED_READ_WAIT).await;
            return Ok(RecordChunk {
                records: Vec::new(),
                next_offset: offset,
                high_watermark: offset,
            });
        }

        self.inner.read(topic, partition, offset, max_bytes).await
    }

    async fn write_tombstones(
        &self,
        topic: &str,
        partition: i32,
        keys: Vec<Bytes>,
    ) -> Result<usize> {
        if self.failing_partition == Some(partition) {
            return Err(Error::Produce {
                topic: topic.to_string(),
                partition,
                message: "NOT_ENOUGH_REPLICAS".to_string(),
            });
        }
        self.inner.write_tombstones(topic, partition, keys).await
    }
}
