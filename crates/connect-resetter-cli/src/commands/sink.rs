//! `sink` command: reset a sink connector's consumer group.

use anyhow::Result;
use clap::Args;
use kafka_connect_resetter_core::{
    ConnectorIdentity, ConnectorKind, KafkaOffsetStore, ResetOptions, Resetter, SinkResetOptions,
    TopicPartition,
};
use std::sync::Arc;
use tracing::info;

use super::shared::{print_outcome, ConnectionArgs, OutputFormat};

#[derive(Debug, Args)]
pub struct SinkArgs {
    /// Name of the sink connector
    pub connector: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Only reset this partition (repeatable)
    #[arg(long = "partition", value_name = "TOPIC:PARTITION")]
    pub partitions: Vec<String>,

    /// Delete the whole consumer group instead of its offsets
    #[arg(long, conflicts_with = "partitions")]
    pub delete_consumer_group: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

impl SinkArgs {
    fn options(&self) -> Result<SinkResetOptions> {
        let scope = if self.partitions.is_empty() {
            None
        } else {
            let parsed = self
                .partitions
                .iter()
                .map(|p| p.parse::<TopicPartition>())
                .collect::<kafka_connect_resetter_core::Result<Vec<_>>>()?;
            Some(parsed)
        };

        Ok(SinkResetOptions {
            scope,
            delete_consumer_group: self.delete_consumer_group,
        })
    }
}

pub async fn run(args: SinkArgs) -> Result<()> {
    let identity = ConnectorIdentity::new(args.connector.as_str(), ConnectorKind::Sink)?;
    let options = ResetOptions {
        sink: args.options()?,
        source: None,
    };
    let config = args.connection.kafka_config(identity.name())?;

    info!(
        "Connecting to {} to reset {}",
        config.bootstrap_servers.join(","),
        identity
    );
    let store = Arc::new(KafkaOffsetStore::connect(config).await?);

    let outcome = Resetter::new(store).reset(&identity, &options).await?;
    print_outcome(&outcome, OutputFormat::from(args.format.as_str()))
}
