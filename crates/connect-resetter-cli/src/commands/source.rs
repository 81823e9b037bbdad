//! `source` command: tombstone a source connector's offsets.

use anyhow::Result;
use clap::Args;
use kafka_connect_resetter_core::{
    ConnectorIdentity, ConnectorKind, KafkaOffsetStore, ResetOptions, Resetter,
    SourceResetOptions,
};
use std::sync::Arc;
use tracing::info;

use super::shared::{print_outcome, ConnectionArgs, OutputFormat};

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Name of the source connector
    pub connector: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Topic holding source offsets (the worker's offset.storage.topic)
    #[arg(long)]
    pub offset_topic: String,

    /// Deadline for reading the offsets topic, in seconds
    #[arg(long, default_value = "60")]
    pub scan_timeout: u64,

    /// Maximum bytes per fetch request
    #[arg(long, default_value = "1048576")]
    pub fetch_max_bytes: i32,

    /// Report the offsets that would be reset without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

impl SourceArgs {
    fn options(&self) -> SourceResetOptions {
        SourceResetOptions {
            offset_topic: self.offset_topic.clone(),
            scan_timeout_secs: self.scan_timeout,
            fetch_max_bytes: self.fetch_max_bytes,
            dry_run: self.dry_run,
        }
    }
}

pub async fn run(args: SourceArgs) -> Result<()> {
    let identity = ConnectorIdentity::new(args.connector.as_str(), ConnectorKind::Source)?;
    let source = args.options();
    source.validate()?;
    let options = ResetOptions {
        sink: Default::default(),
        source: Some(source),
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
