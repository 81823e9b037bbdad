//! Connector offset reset.
//!
//! [`Resetter`] picks the strategy from the connector kind:
//! - **Sink**: [`SinkResetter`] removes the consumer group's committed offsets
//! - **Source**: [`SourceResetter`] tombstones the connector's keys in the
//!   offsets topic

pub mod collector;
pub mod key;
mod sink;
mod source;

pub use collector::PartitionCollector;
pub use key::{extract_connector_name, JsonKeyDecoder, OffsetKey, OffsetKeyDecoder};
pub use sink::{SinkResetReport, SinkResetter};
pub use source::{SourceResetReport, SourceResetter};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::ResetOptions;
use crate::connector::{ConnectorIdentity, ConnectorKind};
use crate::store::OffsetStore;
use crate::{Error, Result};

/// Result of one reset, by connector kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResetOutcome {
    Sink(SinkResetReport),
    Source(SourceResetReport),
}

impl ResetOutcome {
    /// Partitions reset (sink) or tombstones written (source).
    pub fn affected(&self) -> usize {
        match self {
            ResetOutcome::Sink(report) => report.partitions_reset,
            ResetOutcome::Source(report) => report.tombstones,
        }
    }
}

/// Dispatches a reset to the sink or source strategy.
pub struct Resetter {
    sink: SinkResetter,
    source: SourceResetter,
}

impl Resetter {
    pub fn new(store: Arc<dyn OffsetStore>) -> Self {
        Self {
            sink: SinkResetter::new(Arc::clone(&store)),
            source: SourceResetter::new(store),
        }
    }

    /// Use a different decoder for offsets-topic keys.
    pub fn with_key_decoder(
        store: Arc<dyn OffsetStore>,
        decoder: Arc<dyn OffsetKeyDecoder>,
    ) -> Self {
        Self {
            sink: SinkResetter::new(Arc::clone(&store)),
            source: SourceResetter::with_decoder(store, decoder),
        }
    }

    /// Reset the offsets of `identity`.
    pub async fn reset(
        &self,
        identity: &ConnectorIdentity,
        options: &ResetOptions,
    ) -> Result<ResetOutcome> {
        info!("Starting reset of {}", identity);

        match identity.kind() {
            ConnectorKind::Sink => {
                let report = self.sink.reset(identity, &options.sink).await?;
                Ok(ResetOutcome::Sink(report))
            }
            ConnectorKind::Source => {
                let source_options = options.source.as_ref().ok_or_else(|| {
                    Error::Config(format!(
                        "Resetting source connector {} requires an offsets topic",
                        identity.name()
                    ))
                })?;
                let report = self.source.reset(identity, source_options).await?;
                Ok(ResetOutcome::Source(report))
            }
        }
    }
}
