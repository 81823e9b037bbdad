//! Source connector reset: tombstone the connector's keys in the offsets topic.
//!
//! The offsets topic is shared by every source connector of a Connect
//! cluster, so the reset works in two phases:
//!
//! 1. Capture the end offset of every partition (the snapshot bound) and
//!    read each partition from its start up to that bound, collecting the
//!    keys owned by the target connector. The whole phase runs under one
//!    deadline; when it expires nothing is written.
//! 2. Produce one tombstone per collected key to the partition it was read
//!    from, waiting for every acknowledgement.
//!
//! Records written after the snapshot bound are not looked at.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::collector::PartitionCollector;
use super::key::{JsonKeyDecoder, OffsetKeyDecoder};
use crate::config::SourceResetOptions;
use crate::connector::ConnectorIdentity;
use crate::store::OffsetStore;
use crate::{Error, Result};

/// Outcome of a source reset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceResetReport {
    /// Connector name
    pub connector: String,
    /// Offsets topic that was scanned
    pub offset_topic: String,
    /// Number of offsets-topic partitions read
    pub partitions_scanned: usize,
    /// Records read below the snapshot bound
    pub records_scanned: u64,
    /// Records skipped because their key could not be decoded
    pub records_skipped: u64,
    /// Tombstones written (or that would be written on a dry run)
    pub tombstones: usize,
    /// Whether tombstones were withheld
    pub dry_run: bool,
}

/// Read position of one partition during the scan.
#[derive(Debug, Clone, Copy)]
struct PartitionCursor {
    partition: i32,
    position: i64,
    bound: i64,
}

impl PartitionCursor {
    fn caught_up(&self) -> bool {
        self.position >= self.bound
    }
}

/// Tombstones a source connector's entries in the offsets topic.
pub struct SourceResetter {
    store: Arc<dyn OffsetStore>,
    decoder: Arc<dyn OffsetKeyDecoder>,
}

impl SourceResetter {
    /// Resetter for keys written by the JSON converter.
    pub fn new(store: Arc<dyn OffsetStore>) -> Self {
        Self::with_decoder(store, Arc::new(JsonKeyDecoder))
    }

    pub fn with_decoder(store: Arc<dyn OffsetStore>, decoder: Arc<dyn OffsetKeyDecoder>) -> Self {
        Self { store, decoder }
    }

    /// Reset the connector, returning the report. `tombstones` is the
    /// number of entries removed.
    pub async fn reset(
        &self,
        identity: &ConnectorIdentity,
        options: &SourceResetOptions,
    ) -> Result<SourceResetReport> {
        options.validate()?;
        let topic = options.offset_topic.as_str();

        let partitions = self.store.partition_ids(topic).await?;
        info!(
            "Resetting {} using offsets topic {} ({} partitions)",
            identity,
            topic,
            partitions.len()
        );

        let mut cursors = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let (earliest, latest) = self.store.offset_bounds(topic, partition).await?;
            debug!(
                "Snapshot bound for {}:{} is {} (log start {})",
                topic, partition, latest, earliest
            );
            cursors.push(PartitionCursor {
                partition,
                position: earliest,
                bound: latest,
            });
        }

        let mut collector = PartitionCollector::new(identity.name(), Arc::clone(&self.decoder));
        let timeout = options.scan_timeout();
        let scan = self.scan(topic, options.fetch_max_bytes, &mut cursors, &mut collector);

        let scanned = tokio::time::timeout(timeout, scan).await;
        match scanned {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::ScanTimeout {
                    topic: topic.to_string(),
                    timeout,
                    pending: cursors.iter().filter(|c| !c.caught_up()).count(),
                });
            }
        }

        let mut report = SourceResetReport {
            connector: identity.name().to_string(),
            offset_topic: topic.to_string(),
            partitions_scanned: cursors.len(),
            records_scanned: collector.scanned(),
            records_skipped: collector.skipped(),
            tombstones: 0,
            dry_run: options.dry_run,
        };

        let matched = collector.matched_keys();
        info!(
            "Found {} offset entries for connector {} in {} records",
            matched,
            identity.name(),
            report.records_scanned
        );

        if matched == 0 {
            return Ok(report);
        }

        if options.dry_run {
            for (partition, keys) in collector.into_partitions() {
                for key in keys {
                    info!(
                        "Dry run: would reset {} in partition {}",
                        String::from_utf8_lossy(&key),
                        partition
                    );
                }
            }
            report.tombstones = matched;
            return Ok(report);
        }

        for (partition, keys) in collector.into_partitions() {
            for key in &keys {
                info!(
                    "Resetting {} in partition {}",
                    String::from_utf8_lossy(key),
                    partition
                );
            }
            report.tombstones += self.store.write_tombstones(topic, partition, keys).await?;
        }

        info!(
            "Finished resetting {}: {} tombstones written",
            identity, report.tombstones
        );
        Ok(report)
    }

    /// Read every partition from its cursor up to its snapshot bound.
    async fn scan(
        &self,
        topic: &str,
        max_bytes: i32,
        cursors: &mut [PartitionCursor],
        collector: &mut PartitionCollector,
    ) -> Result<()> {
        for cursor in cursors.iter_mut() {
            while !cursor.caught_up() {
                let chunk = self
                    .store
                    .read(topic, cursor.partition, cursor.position, max_bytes)
                    .await?;

                for record in chunk.records.iter().filter(|r| r.offset < cursor.bound) {
                    collector.handle(cursor.partition, record);
                }

                if chunk.next_offset > cursor.position {
                    cursor.position = chunk.next_offset;
                } else if chunk.high_watermark >= cursor.bound {
                    // The rest of the range below the bound was compacted away
                    debug!(
                        "No records left in {}:{} between {} and {}",
                        topic, cursor.partition, cursor.position, cursor.bound
                    );
                    cursor.position = cursor.bound;
                } else {
                    // Replication has not reached the bound yet; the store's read waits
                    tokio::task::yield_now().await;
                }
            }

            debug!(
                "Partition {}:{} scanned up to {}",
                topic, cursor.partition, cursor.bound
            );
        }

        Ok(())
    }
}
