//! Consumer group operations for offset management.
//!
//! This module implements the group-coordinator side of the protocol:
//! - FindCoordinator: Locate the broker that owns a group
//! - DescribeGroups: Get consumer group state and members
//! - OffsetFetch: Get committed offsets for a group
//! - OffsetCommit: Commit offsets outside of any group generation
//! - OffsetDelete: Remove committed offsets for selected partitions
//! - DeleteGroups: Remove a group and all of its offsets
//!
//! Every call except FindCoordinator must be sent to the group's coordinator.

use kafka_protocol::messages::{
    ApiKey, DeleteGroupsRequest, DeleteGroupsResponse, DescribeGroupsRequest,
    DescribeGroupsResponse, FindCoordinatorRequest, FindCoordinatorResponse, GroupId,
    OffsetCommitRequest, OffsetCommitResponse, OffsetDeleteRequest, OffsetDeleteResponse,
    OffsetFetchRequest, OffsetFetchResponse, TopicName,
};
use kafka_protocol::protocol::StrBytes;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

use super::error_codes;
use super::KafkaClient;
use crate::error::KafkaError;
use crate::Result;

/// FindCoordinator key type for consumer groups.
const GROUP_KEY_TYPE: i8 = 0;

/// Broker acting as coordinator for a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinator {
    pub node_id: i32,
    pub host: String,
    pub port: i32,
}

impl Coordinator {
    /// `host:port` address of the coordinator.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Lifecycle state of a consumer group as reported by its coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupState {
    Empty,
    Stable,
    PreparingRebalance,
    CompletingRebalance,
    Dead,
    Unknown(String),
}

impl GroupState {
    /// Whether members are joined or joining, so offsets must not be touched.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            GroupState::Stable | GroupState::PreparingRebalance | GroupState::CompletingRebalance
        )
    }
}

impl From<&str> for GroupState {
    fn from(s: &str) -> Self {
        match s {
            "Empty" => GroupState::Empty,
            "Stable" => GroupState::Stable,
            "PreparingRebalance" => GroupState::PreparingRebalance,
            // Brokers before 2.4 call this AwaitingSync
            "CompletingRebalance" | "AwaitingSync" => GroupState::CompletingRebalance,
            "Dead" => GroupState::Dead,
            other => GroupState::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupState::Empty => write!(f, "Empty"),
            GroupState::Stable => write!(f, "Stable"),
            GroupState::PreparingRebalance => write!(f, "PreparingRebalance"),
            GroupState::CompletingRebalance => write!(f, "CompletingRebalance"),
            GroupState::Dead => write!(f, "Dead"),
            GroupState::Unknown(s) => write!(f, "{}", s),
        }
    }
}

/// Consumer group description
#[derive(Debug, Clone)]
pub struct GroupDescription {
    /// Consumer group ID
    pub group_id: String,
    /// Group state
    pub state: GroupState,
    /// Protocol type (e.g., "consumer")
    pub protocol_type: String,
    /// Group members
    pub members: Vec<GroupMember>,
}

impl GroupDescription {
    /// Whether the group still has members or is mid-rebalance.
    pub fn is_active(&self) -> bool {
        !self.members.is_empty() || self.state.is_active()
    }
}

/// Consumer group member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    pub member_id: String,
    pub client_id: String,
    pub client_host: String,
}

/// Committed offset for a partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedOffset {
    /// Topic name
    pub topic: String,
    /// Partition ID
    pub partition: i32,
    /// Committed offset
    pub offset: i64,
    /// Commit metadata
    pub metadata: Option<String>,
}

/// Outcome of deleting one partition's committed offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDeletion {
    pub topic: String,
    pub partition: i32,
    /// Error code (0 = deleted)
    pub error_code: i16,
}

/// Find the coordinator for a consumer group. Any broker can answer.
pub async fn find_coordinator(client: &KafkaClient, group_id: &str) -> Result<Coordinator> {
    let request = FindCoordinatorRequest::default()
        .with_key(StrBytes::from_string(group_id.to_string()))
        .with_key_type(GROUP_KEY_TYPE);

    let response: FindCoordinatorResponse = client
        .send_request(ApiKey::FindCoordinator, request)
        .await?;

    if response.error_code != error_codes::NONE {
        return Err(KafkaError::BrokerError {
            code: response.error_code,
            message: format!(
                "FindCoordinator failed for group {}: {}",
                group_id,
                response
                    .error_message
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("error code {}", response.error_code))
            ),
        }
        .into());
    }

    let coordinator = Coordinator {
        node_id: response.node_id.0,
        host: response.host.to_string(),
        port: response.port,
    };

    debug!(
        "Coordinator for group {} is broker {} at {}",
        group_id,
        coordinator.node_id,
        coordinator.address()
    );
    Ok(coordinator)
}

/// Describe a single consumer group
pub async fn describe_group(client: &KafkaClient, group_id: &str) -> Result<GroupDescription> {
    let request = DescribeGroupsRequest::default()
        .with_groups(vec![GroupId(StrBytes::from_string(group_id.to_string()))]);

    let response: DescribeGroupsResponse =
        client.send_request(ApiKey::DescribeGroups, request).await?;

    let group = response
        .groups
        .into_iter()
        .find(|g| g.group_id.as_str() == group_id)
        .ok_or_else(|| {
            KafkaError::Protocol(format!("Group {} missing from DescribeGroups response", group_id))
        })?;

    if group.error_code != error_codes::NONE {
        return Err(KafkaError::BrokerError {
            code: group.error_code,
            message: format!("DescribeGroups failed for group {}", group_id),
        }
        .into());
    }

    let members = group
        .members
        .into_iter()
        .map(|m| GroupMember {
            member_id: m.member_id.to_string(),
            client_id: m.client_id.to_string(),
            client_host: m.client_host.to_string(),
        })
        .collect();

    Ok(GroupDescription {
        group_id: group_id.to_string(),
        state: GroupState::from(group.group_state.as_str()),
        protocol_type: group.protocol_type.to_string(),
        members,
    })
}

/// Fetch committed offsets for a consumer group.
///
/// Partitions without a committed offset are omitted.
pub async fn fetch_offsets(
    client: &KafkaClient,
    group_id: &str,
    topics: Option<&[String]>,
) -> Result<Vec<CommittedOffset>> {
    let requested_topics = topics.map(|topic_list| {
        topic_list
            .iter()
            .map(|t| {
                kafka_protocol::messages::offset_fetch_request::OffsetFetchRequestTopic::default()
                    .with_name(TopicName(StrBytes::from_string(t.clone())))
                    .with_partition_indexes(vec![]) // Empty = all partitions
            })
            .collect::<Vec<_>>()
    });

    let request = OffsetFetchRequest::default()
        .with_group_id(GroupId(StrBytes::from_string(group_id.to_string())))
        .with_topics(requested_topics);

    let response: OffsetFetchResponse = client.send_request(ApiKey::OffsetFetch, request).await?;

    if response.error_code != error_codes::NONE {
        return Err(KafkaError::BrokerError {
            code: response.error_code,
            message: format!("OffsetFetch failed for group {}", group_id),
        }
        .into());
    }

    let mut offsets = Vec::new();
    for topic in response.topics {
        for partition in topic.partitions {
            match partition.error_code {
                error_codes::NONE => {}
                error_codes::UNKNOWN_TOPIC_OR_PARTITION => continue,
                code => {
                    return Err(KafkaError::BrokerError {
                        code,
                        message: format!(
                            "OffsetFetch failed for {}:{} in group {}",
                            topic.name.as_str(),
                            partition.partition_index,
                            group_id
                        ),
                    }
                    .into())
                }
            }

            // -1 means nothing committed
            if partition.committed_offset < 0 {
                continue;
            }

            offsets.push(CommittedOffset {
                topic: topic.name.to_string(),
                partition: partition.partition_index,
                offset: partition.committed_offset,
                metadata: partition
                    .metadata
                    .as_ref()
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string()),
            });
        }
    }

    debug!(
        "Fetched {} committed offsets for group {}",
        offsets.len(),
        group_id
    );
    Ok(offsets)
}

/// Commit offsets for a group without joining it (generation -1), the way
/// standalone consumers and admin tools do.
///
/// Returns `(topic, partition, error_code)` for every partition.
pub async fn commit_offsets(
    client: &KafkaClient,
    group_id: &str,
    offsets: &[(String, i32, i64)],
) -> Result<Vec<(String, i32, i16)>> {
    let mut by_topic: BTreeMap<&str, Vec<(i32, i64)>> = BTreeMap::new();
    for (topic, partition, offset) in offsets {
        by_topic
            .entry(topic.as_str())
            .or_default()
            .push((*partition, *offset));
    }

    let topics: Vec<_> = by_topic
        .into_iter()
        .map(|(topic, partitions)| {
            let partition_data: Vec<_> = partitions
                .into_iter()
                .map(|(partition, offset)| {
                    kafka_protocol::messages::offset_commit_request::OffsetCommitRequestPartition::default()
                        .with_partition_index(partition)
                        .with_committed_offset(offset)
                })
                .collect();

            kafka_protocol::messages::offset_commit_request::OffsetCommitRequestTopic::default()
                .with_name(TopicName(StrBytes::from_string(topic.to_string())))
                .with_partitions(partition_data)
        })
        .collect();

    let request = OffsetCommitRequest::default()
        .with_group_id(GroupId(StrBytes::from_string(group_id.to_string())))
        .with_topics(topics);

    let response: OffsetCommitResponse =
        client.send_request(ApiKey::OffsetCommit, request).await?;

    let mut results = Vec::new();
    for topic in response.topics {
        for partition in topic.partitions {
            if partition.error_code != error_codes::NONE {
                warn!(
                    "Failed to commit offset for {}:{} in group {} - error code {}",
                    topic.name.as_str(),
                    partition.partition_index,
                    group_id,
                    partition.error_code
                );
            }
            results.push((
                topic.name.to_string(),
                partition.partition_index,
                partition.error_code,
            ));
        }
    }

    debug!("Committed {} offsets for group {}", results.len(), group_id);
    Ok(results)
}

/// Delete committed offsets for the given partitions of a group.
///
/// A group-level error is returned as `KafkaError::BrokerError`. Partition
/// level errors are reported per partition so callers can decide.
pub async fn delete_offsets(
    client: &KafkaClient,
    group_id: &str,
    partitions: &[(String, i32)],
) -> Result<Vec<PartitionDeletion>> {
    if partitions.is_empty() {
        return Ok(Vec::new());
    }

    let mut by_topic: BTreeMap<&str, Vec<i32>> = BTreeMap::new();
    for (topic, partition) in partitions {
        by_topic.entry(topic.as_str()).or_default().push(*partition);
    }

    let topics: Vec<_> = by_topic
        .into_iter()
        .map(|(topic, partitions)| {
            let partition_data: Vec<_> = partitions
                .into_iter()
                .map(|p| {
                    kafka_protocol::messages::offset_delete_request::OffsetDeleteRequestPartition::default()
                        .with_partition_index(p)
                })
                .collect();

            kafka_protocol::messages::offset_delete_request::OffsetDeleteRequestTopic::default()
                .with_name(TopicName(StrBytes::from_string(topic.to_string())))
                .with_partitions(partition_data)
        })
        .collect();

    let request = OffsetDeleteRequest::default()
        .with_group_id(GroupId(StrBytes::from_string(group_id.to_string())))
        .with_topics(topics);

    let response: OffsetDeleteResponse =
        client.send_request(ApiKey::OffsetDelete, request).await?;

    if response.error_code != error_codes::NONE {
        return Err(KafkaError::BrokerError {
            code: response.error_code,
            message: format!("OffsetDelete failed for group {}", group_id),
        }
        .into());
    }

    let mut results = Vec::new();
    for topic in response.topics {
        for partition in topic.partitions {
            if partition.error_code != error_codes::NONE {
                warn!(
                    "Failed to delete offset for {}:{} in group {} - error code {}",
                    topic.name.as_str(),
                    partition.partition_index,
                    group_id,
                    partition.error_code
                );
            }
            results.push(PartitionDeletion {
                topic: topic.name.to_string(),
                partition: partition.partition_index,
                error_code: partition.error_code,
            });
        }
    }

    debug!("Deleted {} offsets for group {}", results.len(), group_id);
    Ok(results)
}

/// Delete consumer groups, returning `(group_id, error_code)` per group.
pub async fn delete_groups(client: &KafkaClient, group_ids: &[String]) -> Result<Vec<(String, i16)>> {
    let groups: Vec<GroupId> = group_ids
        .iter()
        .map(|id| GroupId(StrBytes::from_string(id.clone())))
        .collect();

    let request = DeleteGroupsRequest::default().with_groups_names(groups);

    let response: DeleteGroupsResponse =
        client.send_request(ApiKey::DeleteGroups, request).await?;

    Ok(response
        .results
        .into_iter()
        .map(|r| (r.group_id.to_string(), r.error_code))
        .collect())
}
