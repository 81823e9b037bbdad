//! Common test infrastructure for integration tests.
//!
//! Provides Kafka container management, store creation and helpers for
//! seeding topics and consumer groups.

#![allow(dead_code)]

use bytes::Bytes;
use serde_json::json;
use std::time::{Duration, Instant};
use testcontainers::core::{CmdWaitFor, ExecCommand};
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::kafka::Kafka;
use tokio::time::sleep;

use kafka_connect_resetter_core::kafka::TopicRecord;
use kafka_connect_resetter_core::{KafkaConfig, KafkaOffsetStore};

// ============================================================================
// Kafka Test Cluster
// ============================================================================

/// Wrapper around a Kafka testcontainer with helper methods.
pub struct KafkaTestCluster {
    pub container: ContainerAsync<Kafka>,
    pub bootstrap_servers: String,
}

impl KafkaTestCluster {
    /// Start a new Kafka container for testing.
    pub async fn start() -> anyhow::Result<Self> {
        let kafka = Kafka::default()
            .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "false")
            .with_env_var("KAFKA_NUM_PARTITIONS", "3");

        let container = kafka.start().await?;

        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(9093).await?;
        let bootstrap_servers = format!("{}:{}", host, port);

        Ok(KafkaTestCluster {
            container,
            bootstrap_servers,
        })
    }

    /// Configuration pointing at this cluster.
    pub fn kafka_config(&self) -> KafkaConfig {
        let mut config = KafkaConfig::new(vec![self.bootstrap_servers.clone()]);
        config.connection.client_id = Some("kafka-connect-resetter-it".to_string());
        config
    }

    /// Create a topic with the broker's own tooling.
    pub async fn create_topic(
        &self,
        topic: &str,
        partitions: i32,
        compacted: bool,
    ) -> anyhow::Result<()> {
        let mut cmd = vec![
            "kafka-topics".to_string(),
            "--bootstrap-server".to_string(),
            "localhost:9092".to_string(),
            "--create".to_string(),
            "--topic".to_string(),
            topic.to_string(),
            "--partitions".to_string(),
            partitions.to_string(),
            "--replication-factor".to_string(),
            "1".to_string(),
        ];
        if compacted {
            cmd.push("--config".to_string());
            cmd.push("cleanup.policy=compact".to_string());
        }

        self.container
            .exec(ExecCommand::new(cmd).with_cmd_ready_condition(CmdWaitFor::exit_code(0)))
            .await?;
        Ok(())
    }

    /// Connect an offset store, waiting for the broker to come up.
    pub async fn connect_store(&self, timeout: Duration) -> anyhow::Result<KafkaOffsetStore> {
        let start = Instant::now();

        loop {
            match KafkaOffsetStore::connect(self.kafka_config()).await {
                Ok(store) => return Ok(store),
                Err(e) if start.elapsed() > timeout => {
                    anyhow::bail!("Kafka did not become ready within {:?}: {}", timeout, e)
                }
                Err(_) => sleep(Duration::from_secs(1)).await,
            }
        }
    }
}

// ============================================================================
// Seeding
// ============================================================================

/// Produce records, retrying while a new topic gets its leaders.
pub async fn produce_with_retry(
    store: &KafkaOffsetStore,
    topic: &str,
    partition: i32,
    records: Vec<TopicRecord>,
) -> anyhow::Result<()> {
    let mut attempts = 0;
    loop {
        match store.router().produce(topic, partition, records.clone()).await {
            Ok(_) => return Ok(()),
            Err(e) if attempts >= 20 => return Err(e.into()),
            Err(_) => {
                attempts += 1;
                sleep(Duration::from_millis(500)).await;
            }
        }
    }
}

/// A keyed record with a value.
pub fn record(key: Bytes, value: Bytes) -> TopicRecord {
    TopicRecord {
        offset: 0,
        timestamp: chrono::Utc::now().timestamp_millis(),
        key: Some(key),
        value: Some(value),
    }
}

/// Offsets-topic key as the JSON converter writes it.
pub fn offset_key(connector: &str, file: &str) -> Bytes {
    Bytes::from(json!([connector, { "filename": file }]).to_string())
}

/// Offsets-topic value holding a position.
pub fn offset_value(position: i64) -> Bytes {
    Bytes::from(json!({ "position": position }).to_string())
}

/// Create `topic` with data in every partition and commit `offset` for each
/// partition on behalf of `group_id`.
pub async fn seed_consumer_group(
    cluster: &KafkaTestCluster,
    store: &KafkaOffsetStore,
    group_id: &str,
    topic: &str,
    partitions: i32,
    offset: i64,
) -> anyhow::Result<()> {
    cluster.create_topic(topic, partitions, false).await?;
    for partition in 0..partitions {
        let records = (0..offset)
            .map(|i| {
                record(
                    Bytes::from(format!("key-{}", i)),
                    Bytes::from(format!("value-{}", i)),
                )
            })
            .collect();
        produce_with_retry(store, topic, partition, records).await?;
    }

    let offsets: Vec<(String, i32, i64)> = (0..partitions)
        .map(|p| (topic.to_string(), p, offset))
        .collect();
    let results = store.router().commit_offsets(group_id, &offsets).await?;
    if let Some((t, p, code)) = results.iter().find(|(_, _, code)| *code != 0) {
        anyhow::bail!("Commit for {}:{} failed with error code {}", t, p, code);
    }
    Ok(())
}

/// Unique name so tests sharing a broker don't collide.
pub fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, chrono::Utc::now().timestamp_micros())
}
