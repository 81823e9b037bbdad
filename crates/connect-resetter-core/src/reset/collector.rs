//! Collection of a connector's keys from the offsets topic.

use bytes::Bytes;
use indexmap::IndexSet;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{trace, warn};

use super::key::OffsetKeyDecoder;
use crate::error::DecodeError;
use crate::kafka::TopicRecord;

/// Accumulates, per partition, the distinct keys owned by one connector.
///
/// The log is replayed in order, so a key whose latest record is a tombstone
/// is dropped again: it holds no offset any more.
pub struct PartitionCollector {
    connector: String,
    decoder: Arc<dyn OffsetKeyDecoder>,
    keys: BTreeMap<i32, IndexSet<Bytes>>,
    scanned: u64,
    skipped: u64,
}

impl PartitionCollector {
    pub fn new(connector: impl Into<String>, decoder: Arc<dyn OffsetKeyDecoder>) -> Self {
        Self {
            connector: connector.into(),
            decoder,
            keys: BTreeMap::new(),
            scanned: 0,
            skipped: 0,
        }
    }

    /// Feed one record read from `partition`.
    pub fn handle(&mut self, partition: i32, record: &TopicRecord) {
        self.scanned += 1;

        let decoded = record
            .key
            .as_ref()
            .ok_or(DecodeError::MissingKey)
            .and_then(|key| self.decoder.decode(key).map(|k| (key, k)));

        let (raw_key, key) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                self.skipped += 1;
                warn!(
                    "Skipping offset record at partition {} offset {}: {}",
                    partition, record.offset, e
                );
                return;
            }
        };

        trace!(
            "Offset record for connector {} at {}@{}",
            key.connector,
            partition,
            record.offset
        );

        if key.connector != self.connector {
            return;
        }

        let keys = self.keys.entry(partition).or_default();
        if record.is_tombstone() {
            keys.shift_remove(raw_key);
        } else {
            keys.insert(raw_key.clone());
        }
    }

    /// Number of distinct `(partition, key)` pairs owned by the connector.
    pub fn matched_keys(&self) -> usize {
        self.keys.values().map(IndexSet::len).sum()
    }

    /// Records seen, including skipped ones.
    pub fn scanned(&self) -> u64 {
        self.scanned
    }

    /// Records that could not be decoded.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Matched keys grouped by partition, in first-seen order. Partitions
    /// without matches are left out.
    pub fn into_partitions(self) -> BTreeMap<i32, Vec<Bytes>> {
        self.keys
            .into_iter()
            .filter(|(_, keys)| !keys.is_empty())
            .map(|(partition, keys)| (partition, keys.into_iter().collect()))
            .collect()
    }
}
