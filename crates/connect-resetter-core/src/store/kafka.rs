//! Offset store backed by a Kafka cluster.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::{GroupDescription, GroupState, OffsetStore, RecordChunk, TopicPartition};
use crate::config::KafkaConfig;
use crate::kafka::{error_codes, BrokerRouter, TopicRecord};
use crate::{Error, Result};

/// Kafka wire-protocol offset store
pub struct KafkaOffsetStore {
    router: BrokerRouter,
}

impl KafkaOffsetStore {
    /// Wrap an already connected router.
    pub fn new(router: BrokerRouter) -> Self {
        Self { router }
    }

    /// Validate the configuration and connect to the cluster.
    pub async fn connect(config: KafkaConfig) -> Result<Self> {
        config.validate()?;
        let router = BrokerRouter::new(config).await?;
        Ok(Self::new(router))
    }

    /// The underlying router.
    pub fn router(&self) -> &BrokerRouter {
        &self.router
    }
}

/// Error for a group the broker refuses to modify because it has members.
fn group_active(group_id: &str) -> Error {
    Error::GroupActive {
        group_id: group_id.to_string(),
        state: "NonEmpty".to_string(),
        members: 0,
    }
}

#[async_trait]
impl OffsetStore for KafkaOffsetStore {
    async fn describe_group(&self, group_id: &str) -> Result<GroupDescription> {
        match self.router.describe_group(group_id).await {
            Err(e) if e.broker_code() == Some(error_codes::GROUP_ID_NOT_FOUND) => {
                Ok(GroupDescription {
                    group_id: group_id.to_string(),
                    state: GroupState::Dead,
                    protocol_type: String::new(),
                    members: Vec::new(),
                })
            }
            result => result,
        }
    }

    async fn committed_offsets(&self, group_id: &str) -> Result<Vec<(TopicPartition, i64)>> {
        match self.router.fetch_offsets(group_id).await {
            Ok(offsets) => Ok(offsets
                .into_iter()
                .map(|o| (TopicPartition::new(o.topic, o.partition), o.offset))
                .collect()),
            Err(e) if e.broker_code() == Some(error_codes::GROUP_ID_NOT_FOUND) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn delete_committed_offsets(
        &self,
        group_id: &str,
        partitions: &[TopicPartition],
    ) -> Result<Vec<TopicPartition>> {
        let requested: Vec<(String, i32)> = partitions
            .iter()
            .map(|tp| (tp.topic.clone(), tp.partition))
            .collect();

        let results = match self.router.delete_offsets(group_id, &requested).await {
            Ok(results) => results,
            Err(e) => {
                return match e.broker_code() {
                    Some(error_codes::GROUP_ID_NOT_FOUND) => {
                        debug!("Group {} does not exist, nothing to delete", group_id);
                        Ok(Vec::new())
                    }
                    Some(error_codes::NON_EMPTY_GROUP) => Err(group_active(group_id)),
                    _ => Err(e),
                };
            }
        };

        let mut deleted = Vec::with_capacity(results.len());
        for result in results {
            match result.error_code {
                error_codes::NONE => deleted.push(TopicPartition::new(result.topic, result.partition)),
                error_codes::UNKNOWN_TOPIC_OR_PARTITION => {
                    debug!(
                        "No committed offset for {}:{} in group {}",
                        result.topic, result.partition, group_id
                    );
                }
                error_codes::GROUP_SUBSCRIBED_TO_TOPIC => return Err(group_active(group_id)),
                code => {
                    return Err(crate::error::KafkaError::BrokerError {
                        code,
                        message: format!(
                            "OffsetDelete failed for {}:{} in group {}",
                            result.topic, result.partition, group_id
                        ),
                    }
                    .into())
                }
            }
        }

        Ok(deleted)
    }

    async fn delete_group(&self, group_id: &str) -> Result<bool> {
        match self.router.delete_group(group_id).await? {
            error_codes::NONE => Ok(true),
            error_codes::GROUP_ID_NOT_FOUND => Ok(false),
            error_codes::NON_EMPTY_GROUP => Err(group_active(group_id)),
            code => Err(crate::error::KafkaError::BrokerError {
                code,
                message: format!("DeleteGroups failed for group {}", group_id),
            }
            .into()),
        }
    }

    async fn partition_ids(&self, topic: &str) -> Result<Vec<i32>> {
        self.router.partitions(topic).await
    }

    async fn offset_bounds(&self, topic: &str, partition: i32) -> Result<(i64, i64)> {
        self.router.get_offsets(topic, partition).await
    }

    async fn read(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
        max_bytes: i32,
    ) -> Result<RecordChunk> {
        let response = self.router.fetch(topic, partition, offset, max_bytes).await?;
        Ok(RecordChunk {
            records: response.records,
            next_offset: response.next_offset,
            high_watermark: response.high_watermark,
        })
    }

    async fn write_tombstones(
        &self,
        topic: &str,
        partition: i32,
        keys: Vec<Bytes>,
    ) -> Result<usize> {
        let records: Vec<TopicRecord> = keys.into_iter().map(TopicRecord::tombstone).collect();

        let response = self
            .router
            .produce(topic, partition, records)
            .await
            .map_err(|e| Error::Produce {
                topic: topic.to_string(),
                partition,
                message: e.to_string(),
            })?;

        debug!(
            "Wrote {} tombstones to {}:{} at base offset {}",
            response.record_count, topic, partition, response.base_offset
        );
        Ok(response.record_count)
    }
}
