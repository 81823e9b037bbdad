//! Request routing for multi-broker Kafka clusters.
//!
//! Partition requests (fetch, list offsets, produce) must reach the
//! partition leader and group requests must reach the group coordinator.
//! The router keeps a leader map, a coordinator map and one pooled
//! connection per broker. When a broker answers that it is no longer the
//! leader or coordinator, the owning entry is refreshed and the request is
//! retried once.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::KafkaConfig;
use crate::error::KafkaError;
use crate::Result;

use super::consumer_groups::{CommittedOffset, GroupDescription, PartitionDeletion};
use super::error_codes;
use super::metadata::{BrokerMetadata, ClusterMetadata};
use super::{FetchResponse, KafkaClient, ProduceResponse, TopicRecord};

/// Pause before retrying a coordinator that is still loading offsets.
const COORDINATOR_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Routes Kafka requests to partition leaders and group coordinators.
pub struct BrokerRouter {
    /// Kafka configuration (for creating new connections)
    config: KafkaConfig,

    /// Map of broker_id -> BrokerMetadata (host:port info)
    brokers: RwLock<HashMap<i32, BrokerMetadata>>,

    /// Map of (topic, partition) -> leader broker_id
    partition_leaders: RwLock<HashMap<(String, i32), i32>>,

    /// Map of group_id -> coordinator broker_id
    coordinators: RwLock<HashMap<String, i32>>,

    /// Connection pool: broker_id -> KafkaClient
    connections: RwLock<HashMap<i32, Arc<KafkaClient>>>,

    /// Bootstrap client for metadata and coordinator lookups
    bootstrap_client: Arc<KafkaClient>,
}

impl BrokerRouter {
    /// Connect to the bootstrap servers and load the broker list.
    pub async fn new(config: KafkaConfig) -> Result<Self> {
        let bootstrap_client = Arc::new(KafkaClient::new(config.clone()));
        bootstrap_client.connect().await?;

        let router = Self {
            config,
            brokers: RwLock::new(HashMap::new()),
            partition_leaders: RwLock::new(HashMap::new()),
            coordinators: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            bootstrap_client,
        };

        // Brokers only; topic leaders are loaded on first use
        router.refresh_metadata(Some(&[])).await?;

        Ok(router)
    }

    /// Refresh broker addresses and the leaders of `topics` (all topics on `None`).
    pub async fn refresh_metadata(&self, topics: Option<&[String]>) -> Result<ClusterMetadata> {
        debug!("Refreshing cluster metadata for {:?}", topics);

        let metadata = self.bootstrap_client.fetch_metadata(topics).await?;

        {
            let mut brokers = self.brokers.write().await;
            for broker in &metadata.brokers {
                if let Some(previous) = brokers.insert(broker.node_id, broker.clone()) {
                    if previous.address() != broker.address() {
                        // Stale pooled connection points at the old address
                        self.connections.write().await.remove(&broker.node_id);
                    }
                }
            }
        }

        {
            let mut leaders = self.partition_leaders.write().await;
            for topic in &metadata.topics {
                for partition in &topic.partitions {
                    leaders.insert(
                        (topic.name.clone(), partition.partition_id),
                        partition.leader_id,
                    );
                }
            }

            debug!(
                "Refreshed metadata: {} brokers, {} partition leaders",
                self.brokers.read().await.len(),
                leaders.len()
            );
        }

        Ok(metadata)
    }

    /// Partition ids of a topic, in ascending order.
    pub async fn partitions(&self, topic: &str) -> Result<Vec<i32>> {
        let metadata = self.refresh_metadata(Some(&[topic.to_string()])).await?;
        metadata
            .topics
            .into_iter()
            .find(|t| t.name == topic)
            .map(|t| t.partitions.iter().map(|p| p.partition_id).collect())
            .ok_or_else(|| crate::Error::TopicNotFound(topic.to_string()))
    }

    /// Get the leader broker ID for a partition.
    pub async fn get_leader(&self, topic: &str, partition: i32) -> Result<i32> {
        let key = (topic.to_string(), partition);
        if let Some(leader) = self.partition_leaders.read().await.get(&key).copied() {
            return Ok(leader);
        }

        self.refresh_metadata(Some(&[topic.to_string()])).await?;
        self.partition_leaders
            .read()
            .await
            .get(&key)
            .copied()
            .ok_or_else(|| {
                KafkaError::PartitionNotAvailable {
                    topic: topic.to_string(),
                    partition,
                }
                .into()
            })
    }

    /// Get or create a connection to a specific broker.
    async fn get_broker_connection(&self, broker_id: i32) -> Result<Arc<KafkaClient>> {
        {
            let connections = self.connections.read().await;
            if let Some(client) = connections.get(&broker_id) {
                // A timed out or broken request leaves the client disconnected
                if client.connected_address().await.is_some() {
                    return Ok(Arc::clone(client));
                }
            }
        }

        let broker_addr = {
            let brokers = self.brokers.read().await;
            brokers
                .get(&broker_id)
                .map(BrokerMetadata::address)
                .ok_or_else(|| KafkaError::Protocol(format!("Unknown broker ID: {}", broker_id)))?
        };

        debug!(
            "Creating new connection to broker {} at {}",
            broker_id, broker_addr
        );

        let mut broker_config = self.config.clone();
        broker_config.bootstrap_servers = vec![broker_addr];

        let client = Arc::new(KafkaClient::new(broker_config));
        client.connect().await?;

        self.connections
            .write()
            .await
            .insert(broker_id, Arc::clone(&client));

        Ok(client)
    }

    /// Get a client connected to the partition's leader broker.
    pub async fn leader_client(&self, topic: &str, partition: i32) -> Result<Arc<KafkaClient>> {
        let leader_id = self.get_leader(topic, partition).await?;
        self.get_broker_connection(leader_id).await
    }

    /// Get a client connected to the group's coordinator.
    pub async fn coordinator_client(&self, group_id: &str) -> Result<Arc<KafkaClient>> {
        let cached = self.coordinators.read().await.get(group_id).copied();
        let node_id = match cached {
            Some(node_id) => node_id,
            None => {
                let coordinator = self.bootstrap_client.find_coordinator(group_id).await?;
                self.brokers.write().await.insert(
                    coordinator.node_id,
                    BrokerMetadata {
                        node_id: coordinator.node_id,
                        host: coordinator.host.clone(),
                        port: coordinator.port,
                    },
                );
                self.coordinators
                    .write()
                    .await
                    .insert(group_id.to_string(), coordinator.node_id);
                coordinator.node_id
            }
        };

        self.get_broker_connection(node_id).await
    }

    /// Run `op` against the partition leader, retrying once on leadership change.
    async fn on_leader<T, F, Fut>(&self, topic: &str, partition: i32, op: F) -> Result<T>
    where
        F: Fn(Arc<KafkaClient>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let client = self.leader_client(topic, partition).await?;
        match op(client).await {
            Err(e) if is_not_leader_error(&e) => {
                warn!(
                    "NOT_LEADER_OR_FOLLOWER for {}:{}, refreshing metadata",
                    topic, partition
                );
                self.partition_leaders
                    .write()
                    .await
                    .remove(&(topic.to_string(), partition));
                let client = self.leader_client(topic, partition).await?;
                op(client).await
            }
            result => result,
        }
    }

    /// Run `op` against the group coordinator, retrying once if it moved.
    async fn on_coordinator<T, F, Fut>(&self, group_id: &str, op: F) -> Result<T>
    where
        F: Fn(Arc<KafkaClient>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let client = self.coordinator_client(group_id).await?;
        match op(client).await {
            Err(e) if is_coordinator_error(&e) => {
                warn!(
                    "Coordinator for group {} unavailable ({}), looking it up again",
                    group_id, e
                );
                if e.broker_code() == Some(error_codes::COORDINATOR_LOAD_IN_PROGRESS) {
                    tokio::time::sleep(COORDINATOR_RETRY_BACKOFF).await;
                }
                self.coordinators.write().await.remove(group_id);
                let client = self.coordinator_client(group_id).await?;
                op(client).await
            }
            result => result,
        }
    }

    /// Fetch records from a partition leader.
    pub async fn fetch(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
        max_bytes: i32,
    ) -> Result<FetchResponse> {
        self.on_leader(topic, partition, |client| async move {
            client.fetch(topic, partition, offset, max_bytes).await
        })
        .await
    }

    /// Get the earliest and latest offsets for a partition.
    pub async fn get_offsets(&self, topic: &str, partition: i32) -> Result<(i64, i64)> {
        self.on_leader(topic, partition, |client| async move {
            client.get_offsets(topic, partition).await
        })
        .await
    }

    /// Produce records to a partition leader.
    pub async fn produce(
        &self,
        topic: &str,
        partition: i32,
        records: Vec<TopicRecord>,
    ) -> Result<ProduceResponse> {
        self.on_leader(topic, partition, |client| {
            let records = records.clone();
            async move { client.produce(topic, partition, records).await }
        })
        .await
    }

    /// Describe a consumer group via its coordinator.
    pub async fn describe_group(&self, group_id: &str) -> Result<GroupDescription> {
        self.on_coordinator(group_id, |client| async move {
            client.describe_group(group_id).await
        })
        .await
    }

    /// Committed offsets of a consumer group.
    pub async fn fetch_offsets(&self, group_id: &str) -> Result<Vec<CommittedOffset>> {
        self.on_coordinator(group_id, |client| async move {
            client.fetch_offsets(group_id, None).await
        })
        .await
    }

    /// Delete committed offsets of a consumer group.
    pub async fn delete_offsets(
        &self,
        group_id: &str,
        partitions: &[(String, i32)],
    ) -> Result<Vec<PartitionDeletion>> {
        self.on_coordinator(group_id, |client| async move {
            client.delete_offsets(group_id, partitions).await
        })
        .await
    }

    /// Commit offsets for a group without joining it.
    pub async fn commit_offsets(
        &self,
        group_id: &str,
        offsets: &[(String, i32, i64)],
    ) -> Result<Vec<(String, i32, i16)>> {
        self.on_coordinator(group_id, |client| async move {
            client.commit_offsets(group_id, offsets).await
        })
        .await
    }

    /// Delete a consumer group, returning the broker's error code for it.
    pub async fn delete_group(&self, group_id: &str) -> Result<i16> {
        let code = self
            .on_coordinator(group_id, |client| async move {
                let results = client.delete_groups(&[group_id.to_string()]).await?;
                let code = results
                    .into_iter()
                    .find(|(id, _)| id == group_id)
                    .map(|(_, code)| code)
                    .ok_or_else(|| {
                        KafkaError::Protocol(format!(
                            "Group {} missing from DeleteGroups response",
                            group_id
                        ))
                    })?;
                if is_coordinator_code(code) {
                    return Err(KafkaError::BrokerError {
                        code,
                        message: format!("DeleteGroups failed for group {}", group_id),
                    }
                    .into());
                }
                Ok(code)
            })
            .await?;

        if code == error_codes::NONE {
            info!("Deleted consumer group {}", group_id);
        }
        Ok(code)
    }
}

fn is_coordinator_code(code: i16) -> bool {
    matches!(
        code,
        error_codes::COORDINATOR_LOAD_IN_PROGRESS
            | error_codes::COORDINATOR_NOT_AVAILABLE
            | error_codes::NOT_COORDINATOR
    )
}

/// Check if an error means the broker no longer leads the partition.
fn is_not_leader_error(error: &crate::Error) -> bool {
    error.broker_code() == Some(error_codes::NOT_LEADER_OR_FOLLOWER)
}

/// Check if an error means the group coordinator moved or is not ready.
fn is_coordinator_error(error: &crate::Error) -> bool {
    error.broker_code().is_some_and(is_coordinator_code)
}
