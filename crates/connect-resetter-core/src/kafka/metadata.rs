//! Kafka Metadata API implementation.

use kafka_protocol::messages::{ApiKey, MetadataRequest, MetadataResponse, TopicName};
use kafka_protocol::protocol::StrBytes;
use tracing::debug;

use super::KafkaClient;
use crate::Result;

/// Broker metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMetadata {
    pub node_id: i32,
    pub host: String,
    pub port: i32,
}

impl BrokerMetadata {
    /// `host:port` address of the broker.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Topic metadata
#[derive(Debug, Clone)]
pub struct TopicMetadata {
    pub name: String,
    pub is_internal: bool,
    pub partitions: Vec<PartitionMetadata>,
}

/// Partition metadata
#[derive(Debug, Clone)]
pub struct PartitionMetadata {
    pub partition_id: i32,
    pub leader_id: i32,
}

/// Brokers and topics returned by one Metadata request
#[derive(Debug, Clone, Default)]
pub struct ClusterMetadata {
    pub brokers: Vec<BrokerMetadata>,
    pub topics: Vec<TopicMetadata>,
}

/// Fetch cluster metadata from the broker
pub async fn fetch_metadata(
    client: &KafkaClient,
    topics: Option<&[String]>,
) -> Result<ClusterMetadata> {
    let request = match topics {
        Some(topic_names) => {
            let topic_list: Vec<_> = topic_names
                .iter()
                .map(|name| {
                    kafka_protocol::messages::metadata_request::MetadataRequestTopic::default()
                        .with_name(Some(TopicName(StrBytes::from_string(name.clone()))))
                })
                .collect();
            MetadataRequest::default()
                .with_topics(Some(topic_list))
                .with_allow_auto_topic_creation(false)
        }
        None => MetadataRequest::default()
            .with_topics(None)
            .with_allow_auto_topic_creation(false),
    };

    let response: MetadataResponse = client.send_request(ApiKey::Metadata, request).await?;

    let brokers: Vec<BrokerMetadata> = response
        .brokers
        .iter()
        .map(|broker| BrokerMetadata {
            node_id: broker.node_id.0,
            host: broker.host.to_string(),
            port: broker.port,
        })
        .collect();

    let topics: Vec<TopicMetadata> = response
        .topics
        .iter()
        .filter_map(|topic| {
            if topic.error_code != 0 {
                debug!(
                    "Topic {} has error code {}",
                    topic.name.as_ref().map(|n| n.as_str()).unwrap_or("unknown"),
                    topic.error_code
                );
                return None;
            }

            let name = topic.name.as_ref()?.to_string();

            let mut partitions: Vec<PartitionMetadata> = topic
                .partitions
                .iter()
                .map(|p| PartitionMetadata {
                    partition_id: p.partition_index,
                    leader_id: p.leader_id.0,
                })
                .collect();
            partitions.sort_by_key(|p| p.partition_id);

            Some(TopicMetadata {
                name,
                is_internal: topic.is_internal,
                partitions,
            })
        })
        .collect();

    debug!(
        "Discovered {} brokers and {} topics",
        brokers.len(),
        topics.len()
    );

    Ok(ClusterMetadata { brokers, topics })
}
